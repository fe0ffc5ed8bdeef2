//! Monotonically improving shared value.
//!
//! One authoritative [`SharedState`] lives in the Space and one lagging copy
//! lives in every Computer. Both only accept a candidate that is strictly
//! newer than what they hold, so a holder never regresses.
//!
//! Values are scoped to a generation: every root the Space accepts opens a
//! new one, and a value only prunes tasks of the generation it was found
//! in. A newer generation replaces the held value outright; an older one is
//! ignored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A value broadcast cluster-wide, ordered by a strict "newer than" relation.
pub trait Shared: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// True when `self` should replace `other`. Must be irreflexive.
    fn is_newer_than(&self, other: &Self) -> bool;
}

/// Jobs without a pruning bound share nothing; no value is ever newer.
impl Shared for () {
    fn is_newer_than(&self, _other: &Self) -> bool {
        false
    }
}

/// Upper bound on a minimisation problem: lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinCost(pub f64);

impl MinCost {
    /// The bound before anything is known. `f64::MAX` rather than infinity so
    /// it survives JSON.
    pub const UNBOUNDED: MinCost = MinCost(f64::MAX);

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl Shared for MinCost {
    fn is_newer_than(&self, other: &Self) -> bool {
        self.0 < other.0
    }
}

#[derive(Debug)]
struct Held<S> {
    generation: u64,
    value: Option<S>,
}

/// Thread-safe holder of the current shared value and its generation.
#[derive(Debug)]
pub struct SharedState<S: Shared> {
    held: RwLock<Held<S>>,
}

impl<S: Shared> Default for SharedState<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Shared> SharedState<S> {
    pub fn new() -> Self {
        Self {
            held: RwLock::new(Held {
                generation: 0,
                value: None,
            }),
        }
    }

    pub fn with_value(value: S) -> Self {
        Self {
            held: RwLock::new(Held {
                generation: 0,
                value: Some(value),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Held<S>> {
        self.held.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Held<S>> {
        self.held.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Value of the newest generation seen.
    pub fn get(&self) -> Option<S> {
        self.read().value.clone()
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Generation and value, read together.
    pub fn snapshot(&self) -> (u64, Option<S>) {
        let held = self.read();
        (held.generation, held.value.clone())
    }

    /// The value, but only while `generation` is the one held.
    pub fn get_at(&self, generation: u64) -> Option<S> {
        let held = self.read();
        if held.generation == generation {
            held.value.clone()
        } else {
            None
        }
    }

    /// Install `candidate` in the held generation if nothing is held yet or
    /// it is strictly newer. Returns whether it was installed.
    pub fn propose(&self, candidate: S) -> bool {
        let mut held = self.write();
        let generation = held.generation;
        Self::offer(&mut held, generation, candidate)
    }

    /// Like [`SharedState::propose`] for a value found in `generation`.
    /// A later generation replaces whatever is held; an earlier one is
    /// rejected.
    pub fn propose_at(&self, generation: u64, candidate: S) -> bool {
        Self::offer(&mut self.write(), generation, candidate)
    }

    /// Open `generation` with `value`, dropping the previous generation's
    /// value. Ignored unless `generation` is later than the one held.
    pub fn reset(&self, generation: u64, value: Option<S>) -> bool {
        let mut held = self.write();
        if generation <= held.generation {
            return false;
        }
        *held = Held { generation, value };
        true
    }

    fn offer(held: &mut Held<S>, generation: u64, candidate: S) -> bool {
        let accept = match generation.cmp(&held.generation) {
            Ordering::Less => false,
            Ordering::Greater => true,
            Ordering::Equal => match held.value.as_ref() {
                None => true,
                Some(current) => candidate.is_newer_than(current),
            },
        };
        if accept {
            *held = Held {
                generation,
                value: Some(candidate),
            };
        }
        accept
    }
}

type Upstream<S> = Arc<dyn Fn(u64, S) + Send + Sync>;

/// What collaborator code sees while running: the local shared value and a
/// way to announce an improvement.
///
/// Passed into `is_atomic`, `split` and `execute` instead of letting tasks
/// reach for the process that runs them. A context is bound to one
/// generation and sees nothing from any other.
pub struct Context<S: Shared> {
    shared: Arc<SharedState<S>>,
    upstream: Option<Upstream<S>>,
    generation: u64,
}

impl<S: Shared> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            upstream: self.upstream.clone(),
            generation: self.generation,
        }
    }
}

impl<S: Shared> fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("generation", &self.generation)
            .field("shared", &self.shared())
            .field("upstream", &self.upstream.is_some())
            .finish()
    }
}

impl<S: Shared> Context<S> {
    /// Bound to the generation `shared` holds right now.
    pub fn new(shared: Arc<SharedState<S>>, upstream: Option<Upstream<S>>) -> Self {
        let generation = shared.generation();
        Self {
            shared,
            upstream,
            generation,
        }
    }

    /// A context with a private cell and nowhere to propagate to.
    pub fn detached() -> Self {
        Self::new(Arc::new(SharedState::new()), None)
    }

    /// The same cell and upstream, bound to `generation`.
    pub fn for_generation(&self, generation: u64) -> Self {
        Self {
            generation,
            ..self.clone()
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn shared(&self) -> Option<S> {
        self.shared.get_at(self.generation)
    }

    /// Offer a locally discovered value. Forwarded upstream only when it
    /// improved the local cache.
    pub fn propose(&self, candidate: S) -> bool {
        if !self.shared.propose_at(self.generation, candidate.clone()) {
            return false;
        }
        if let Some(upstream) = &self.upstream {
            upstream(self.generation, candidate);
        }
        true
    }
}
