//! Problem domains that run on the Space, and the jobs that drive them.

pub mod fibonacci;
pub mod job;
pub mod mandelbrot;
pub mod tsp;

pub use fibonacci::Fibonacci;
pub use job::{FibonacciJob, Job, JobOutput, JobTask, MandelbrotJob, TspJob};
pub use mandelbrot::{Mandelbrot, Region};
pub use tsp::{City, Tour, Tsp};

use crate::core::shared::Context;
use crate::core::task::Task;
use crate::error::Result;

/// Evaluate `task` on the calling thread by applying its own contract
/// recursively. Reference answer for distributed runs.
pub fn run_sequential<T: Task>(task: &T, ctx: &Context<T::Shared>) -> Result<T::Output> {
    if task.is_atomic(ctx) {
        return task.execute(ctx, &[]);
    }
    let inputs = task
        .split(ctx)?
        .iter()
        .map(|child| run_sequential(child, ctx))
        .collect::<Result<Vec<_>>>()?;
    task.create_successor().execute(ctx, &inputs)
}
