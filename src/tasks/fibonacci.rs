//! Recursive Fibonacci: the smallest divide-and-conquer workload.

use serde::{Deserialize, Serialize};

use crate::core::shared::Context;
use crate::core::task::Task;
use crate::error::{Error, Result};

/// Largest `n` whose Fibonacci number fits in a `u64`.
pub const MAX_N: u32 = 93;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Fibonacci {
    Compute { n: u32 },
    Sum,
}

impl Task for Fibonacci {
    type Output = u64;
    type Shared = ();

    fn is_atomic(&self, _ctx: &Context<()>) -> bool {
        match self {
            Fibonacci::Compute { n } => *n < 2,
            Fibonacci::Sum => true,
        }
    }

    fn split(&self, _ctx: &Context<()>) -> Result<Vec<Self>> {
        match self {
            Fibonacci::Compute { n } if *n >= 2 => Ok(vec![
                Fibonacci::Compute { n: n - 1 },
                Fibonacci::Compute { n: n - 2 },
            ]),
            other => Err(Error::task(format!("{:?} does not split", other))),
        }
    }

    fn create_successor(&self) -> Self {
        Fibonacci::Sum
    }

    fn execute(&self, _ctx: &Context<()>, inputs: &[u64]) -> Result<u64> {
        match self {
            Fibonacci::Compute { n } => iterative(*n),
            Fibonacci::Sum => inputs
                .iter()
                .try_fold(0u64, |acc, v| acc.checked_add(*v))
                .ok_or_else(|| Error::task("fibonacci sum overflows u64")),
        }
    }
}

/// Closed loop used for leaves and as the reference answer.
pub fn iterative(n: u32) -> Result<u64> {
    if n > MAX_N {
        return Err(Error::Validation(format!("fibonacci({}) overflows u64", n)));
    }
    if n == 0 {
        return Ok(0);
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 1..n {
        let next = a + b;
        a = b;
        b = next;
    }
    Ok(b)
}
