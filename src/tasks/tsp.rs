//! Euclidean travelling salesman by branch and bound.
//!
//! A node is a partial tour starting at city 0. Down to [`BASE_LEVEL`] the
//! search splits one city at a time, dropping children whose lower bound
//! already exceeds the shared upper bound. Below that, each node walks its
//! whole subtree depth-first with an explicit stack, pruning against the
//! shared bound as it tightens and proposing every better complete tour.

use serde::{Deserialize, Serialize};

use crate::core::shared::{Context, MinCost};
use crate::core::task::Task;
use crate::error::{Error, Result};

/// Depth (cities fixed after the start) at which nodes stop splitting.
pub const BASE_LEVEL: usize = 2;

/// Slack for comparing float sums taken in different orders.
///
/// Pruning only discards a node whose bound exceeds the limit by more than
/// this, so a tour that ties the current bound is still found and returned.
const EPSILON: f64 = 1e-9;

pub type City = [f64; 2];

pub fn distance(a: &City, b: &City) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// A closed tour: visits `order` then returns to `order[0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    pub order: Vec<usize>,
    pub cost: f64,
}

/// Cost of `path` followed by the edge back to city 0.
pub fn tour_cost(cities: &[City], path: &[usize]) -> f64 {
    path_cost(cities, path) + path.last().map_or(0.0, |&last| distance(&cities[last], &cities[0]))
}

fn path_cost(cities: &[City], path: &[usize]) -> f64 {
    path.windows(2)
        .map(|pair| distance(&cities[pair[0]], &cities[pair[1]]))
        .sum()
}

fn remaining(cities: &[City], path: &[usize]) -> Vec<usize> {
    (1..cities.len()).filter(|c| !path.contains(c)).collect()
}

/// Admissible lower bound on any tour extending `path`.
///
/// Fixed cost of the path, plus the cheapest edge out of its last city, plus
/// for every unvisited city the cheapest edge leaving it towards another
/// unvisited city or home.
pub fn lower_bound(cities: &[City], path: &[usize]) -> f64 {
    let rest = remaining(cities, path);
    let Some(&last) = path.last() else {
        return 0.0;
    };
    if rest.is_empty() {
        return tour_cost(cities, path);
    }

    let leave_last = rest
        .iter()
        .map(|&r| distance(&cities[last], &cities[r]))
        .fold(f64::MAX, f64::min);
    let leave_rest: f64 = rest
        .iter()
        .map(|&r| {
            rest.iter()
                .copied()
                .chain(std::iter::once(0))
                .filter(|&x| x != r)
                .map(|x| distance(&cities[r], &cities[x]))
                .fold(f64::MAX, f64::min)
        })
        .sum();
    path_cost(cities, path) + leave_last + leave_rest
}

/// Nearest-neighbour tour from city 0.
pub fn greedy(cities: &[City]) -> Tour {
    if cities.is_empty() {
        return Tour {
            order: Vec::new(),
            cost: 0.0,
        };
    }
    let mut order = vec![0];
    let mut rest: Vec<usize> = (1..cities.len()).collect();
    while !rest.is_empty() {
        let last = order[order.len() - 1];
        let (pos, _) = rest.iter().enumerate().fold((0, f64::MAX), |best, (i, &c)| {
            let d = distance(&cities[last], &cities[c]);
            if d < best.1 {
                (i, d)
            } else {
                best
            }
        });
        order.push(rest.remove(pos));
    }
    let cost = tour_cost(cities, &order);
    Tour { order, cost }
}

fn current_limit(ctx: &Context<MinCost>) -> f64 {
    ctx.shared().map_or(f64::MAX, |bound| bound.get())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Tsp {
    /// Every tour that starts with `path`.
    Search { cities: Vec<City>, path: Vec<usize> },
    /// Keep the cheapest tour among the inputs.
    Best,
}

impl Tsp {
    pub fn root(cities: Vec<City>) -> Self {
        Tsp::Search {
            cities,
            path: vec![0],
        }
    }

    /// Walk the subtree under `path` with an explicit stack.
    fn search(cities: &[City], path: &[usize], ctx: &Context<MinCost>) -> Option<Tour> {
        let mut best: Option<Tour> = None;
        let mut stack = vec![path.to_vec()];

        while let Some(partial) = stack.pop() {
            let limit = current_limit(ctx);
            let rest = remaining(cities, &partial);
            if rest.is_empty() {
                let cost = tour_cost(cities, &partial);
                let improves = best.as_ref().map_or(true, |b| cost < b.cost);
                if cost <= limit + EPSILON && improves {
                    ctx.propose(MinCost(cost));
                    best = Some(Tour { order: partial, cost });
                }
                continue;
            }
            if lower_bound(cities, &partial) > limit + EPSILON {
                continue;
            }
            // Reversed so the lowest-numbered city is explored first
            for &next in rest.iter().rev() {
                let mut child = partial.clone();
                child.push(next);
                stack.push(child);
            }
        }
        best
    }
}

impl Task for Tsp {
    type Output = Option<Tour>;
    type Shared = MinCost;

    fn is_atomic(&self, _ctx: &Context<MinCost>) -> bool {
        match self {
            Tsp::Search { cities, path } => {
                path.len() > BASE_LEVEL || remaining(cities, path).len() <= 1
            }
            Tsp::Best => true,
        }
    }

    fn split(&self, ctx: &Context<MinCost>) -> Result<Vec<Self>> {
        let Tsp::Search { cities, path } = self else {
            return Err(Error::task("best does not split"));
        };
        let limit = current_limit(ctx);
        Ok(remaining(cities, path)
            .into_iter()
            .map(|next| {
                let mut child = path.clone();
                child.push(next);
                child
            })
            .filter(|child| lower_bound(cities, child) <= limit + EPSILON)
            .map(|child| Tsp::Search {
                cities: cities.clone(),
                path: child,
            })
            .collect())
    }

    fn create_successor(&self) -> Self {
        Tsp::Best
    }

    fn execute(&self, ctx: &Context<MinCost>, inputs: &[Option<Tour>]) -> Result<Option<Tour>> {
        match self {
            Tsp::Search { cities, path } => {
                if path.first() != Some(&0) || path.iter().any(|&c| c >= cities.len()) {
                    return Err(Error::task(format!("invalid partial tour {:?}", path)));
                }
                Ok(Self::search(cities, path, ctx))
            }
            Tsp::Best => Ok(inputs
                .iter()
                .flatten()
                .fold(None::<&Tour>, |best, tour| match best {
                    Some(b) if b.cost <= tour.cost => Some(b),
                    _ => Some(tour),
                })
                .cloned()),
        }
    }
}
