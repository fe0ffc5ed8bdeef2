//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Starting an in-process cluster (one Space, N local Computers)
//! - Collaborators that record what the runtime did with them

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forkspace::config::Settings;
use forkspace::core::shared::{Context, MinCost};
use forkspace::core::task::{Task, TaskNode, TaskResult};
use forkspace::system::{LocalWorker, Space};
use forkspace::util::with_timeout;
use forkspace::{Error, Result};

/// Upper bound on any single job in the suite.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(60);

pub fn settings(exploit_multicore: bool, absorb_joins: bool) -> Settings {
    Settings {
        exploit_multicore,
        absorb_joins,
    }
}

/// A Space with local Computers attached.
pub struct Cluster<T: Task> {
    pub space: Arc<Space<T>>,
    pub workers: Vec<LocalWorker<T>>,
    settings: Settings,
}

impl<T: Task> Cluster<T> {
    /// Start a Space and `workers` Computers. Must run inside a runtime.
    pub fn start(workers: usize, settings: Settings) -> Self {
        let space = Space::new(settings);
        let mut cluster = Self {
            space,
            workers: Vec::new(),
            settings,
        };
        for _ in 0..workers {
            cluster.add_worker();
        }
        cluster
    }

    pub fn add_worker(&mut self) {
        let worker = LocalWorker::attach(&self.space, self.settings).expect("Failed to attach worker");
        self.workers.push(worker);
    }

    /// Kill the worker at `index` as if its process crashed.
    pub fn kill(&mut self, index: usize) {
        self.workers.remove(index).kill();
    }

    /// Submit `root` and wait for its final result.
    pub async fn solve(&self, root: TaskNode<T>) -> TaskResult<T::Output> {
        self.space.submit(root).expect("Failed to submit root");
        with_timeout(JOB_TIMEOUT, self.space.take())
            .await
            .expect("Job did not finish")
    }

    pub async fn shutdown(self) {
        self.space.stop();
        for worker in self.workers {
            with_timeout(Duration::from_secs(10), worker.join())
                .await
                .expect("Worker did not exit");
        }
    }
}

// ========== Recording Collaborators ==========

/// Join executions per run: one entry per Gather execution, holding the
/// number of inputs it saw.
fn join_log() -> &'static Mutex<HashMap<String, Vec<usize>>> {
    static LOG: OnceLock<Mutex<HashMap<String, Vec<usize>>>> = OnceLock::new();
    LOG.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Leaf executions per run, re-executions included.
fn leaf_log() -> &'static Mutex<HashMap<String, usize>> {
    static LOG: OnceLock<Mutex<HashMap<String, usize>>> = OnceLock::new();
    LOG.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn new_run() -> String {
    Uuid::new_v4().to_string()
}

pub fn join_executions(run: &str) -> Vec<usize> {
    join_log().lock().unwrap().get(run).cloned().unwrap_or_default()
}

pub fn leaf_executions(run: &str) -> usize {
    leaf_log().lock().unwrap().get(run).copied().unwrap_or(0)
}

/// A complete tree of `width`-way splits, `depth` levels deep. Every leaf
/// is worth 1, so the answer is `width^depth`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Tree {
    Node {
        run: String,
        depth: u32,
        width: u32,
        leaf_delay_ms: u64,
    },
    Gather {
        run: String,
        width: u32,
    },
}

impl Tree {
    pub fn root(run: &str, depth: u32, width: u32, leaf_delay_ms: u64) -> Self {
        Tree::Node {
            run: run.to_string(),
            depth,
            width,
            leaf_delay_ms,
        }
    }

    /// Joins in a complete tree: one per internal node.
    pub fn internal_nodes(depth: u32, width: u32) -> usize {
        (0..depth).map(|level| width.pow(level) as usize).sum()
    }
}

impl Task for Tree {
    type Output = u64;
    type Shared = ();

    fn is_atomic(&self, _ctx: &Context<()>) -> bool {
        matches!(self, Tree::Node { depth: 0, .. } | Tree::Gather { .. })
    }

    fn split(&self, _ctx: &Context<()>) -> Result<Vec<Self>> {
        match self {
            Tree::Node {
                run,
                depth,
                width,
                leaf_delay_ms,
            } => Ok((0..*width)
                .map(|_| Tree::Node {
                    run: run.clone(),
                    depth: depth - 1,
                    width: *width,
                    leaf_delay_ms: *leaf_delay_ms,
                })
                .collect()),
            Tree::Gather { .. } => Err(Error::task("gather does not split")),
        }
    }

    fn create_successor(&self) -> Self {
        match self {
            Tree::Node { run, width, .. } | Tree::Gather { run, width } => Tree::Gather {
                run: run.clone(),
                width: *width,
            },
        }
    }

    fn execute(&self, _ctx: &Context<()>, inputs: &[u64]) -> Result<u64> {
        match self {
            Tree::Node {
                run, leaf_delay_ms, ..
            } => {
                std::thread::sleep(Duration::from_millis(*leaf_delay_ms));
                *leaf_log().lock().unwrap().entry(run.clone()).or_insert(0) += 1;
                Ok(1)
            }
            Tree::Gather { run, .. } => {
                join_log()
                    .lock()
                    .unwrap()
                    .entry(run.clone())
                    .or_default()
                    .push(inputs.len());
                Ok(inputs.iter().sum())
            }
        }
    }
}

/// `leaves` candidates with costs that are a permutation of 1..=leaves.
/// Each leaf proposes its cost; the Join keeps the minimum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Descent {
    Root { leaves: u32 },
    Leaf { index: u32, leaves: u32 },
    Min,
}

impl Descent {
    pub fn cost(index: u32, leaves: u32) -> f64 {
        // 7919 is prime, so this permutes 0..leaves for any leaves not a multiple of it
        f64::from((index * 7919) % leaves + 1)
    }
}

impl Task for Descent {
    type Output = f64;
    type Shared = MinCost;

    fn is_atomic(&self, _ctx: &Context<MinCost>) -> bool {
        !matches!(self, Descent::Root { .. })
    }

    fn split(&self, _ctx: &Context<MinCost>) -> Result<Vec<Self>> {
        match self {
            Descent::Root { leaves } => Ok((0..*leaves)
                .map(|index| Descent::Leaf {
                    index,
                    leaves: *leaves,
                })
                .collect()),
            _ => Err(Error::task("only the root splits")),
        }
    }

    fn create_successor(&self) -> Self {
        Descent::Min
    }

    fn execute(&self, ctx: &Context<MinCost>, inputs: &[f64]) -> Result<f64> {
        match self {
            Descent::Leaf { index, leaves } => {
                std::thread::sleep(Duration::from_millis(2));
                let cost = Descent::cost(*index, *leaves);
                ctx.propose(MinCost(cost));
                Ok(cost)
            }
            Descent::Min => Ok(inputs.iter().copied().fold(f64::MAX, f64::min)),
            Descent::Root { .. } => Err(Error::task("root never executes")),
        }
    }
}
