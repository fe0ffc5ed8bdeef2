//! Jobs: what a client submits and how it turns the final result into an
//! answer.
//!
//! The binary serves every domain through one task type, [`JobTask`], so a
//! single Space and a single pool of Computers can run any of them.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::shared::{Context, MinCost};
use crate::core::task::{Task, TaskNode, TaskResult};
use crate::error::{Error, Result};
use crate::net::client::Client;
use crate::tasks::fibonacci::{self, Fibonacci};
use crate::tasks::mandelbrot::{Mandelbrot, Region, Rows};
use crate::tasks::tsp::{self, City, Tour, Tsp};
use crate::flog;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTask {
    Fibonacci(Fibonacci),
    Mandelbrot(Mandelbrot),
    Tsp(Tsp),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutput {
    Number(u64),
    Rows(Rows),
    Tour(Option<Tour>),
}

fn numbers(inputs: &[JobOutput]) -> Result<Vec<u64>> {
    inputs
        .iter()
        .map(|input| match input {
            JobOutput::Number(n) => Ok(*n),
            other => Err(mismatch("number", other)),
        })
        .collect()
}

fn bands(inputs: &[JobOutput]) -> Result<Vec<Rows>> {
    inputs
        .iter()
        .map(|input| match input {
            JobOutput::Rows(rows) => Ok(rows.clone()),
            other => Err(mismatch("rows", other)),
        })
        .collect()
}

fn tours(inputs: &[JobOutput]) -> Result<Vec<Option<Tour>>> {
    inputs
        .iter()
        .map(|input| match input {
            JobOutput::Tour(tour) => Ok(tour.clone()),
            other => Err(mismatch("tour", other)),
        })
        .collect()
}

fn mismatch(expected: &str, got: &JobOutput) -> Error {
    let got = match got {
        JobOutput::Number(_) => "number",
        JobOutput::Rows(_) => "rows",
        JobOutput::Tour(_) => "tour",
    };
    Error::InvalidOperation(format!("expected {} input, got {}", expected, got))
}

impl Task for JobTask {
    type Output = JobOutput;
    type Shared = MinCost;

    fn is_atomic(&self, ctx: &Context<MinCost>) -> bool {
        match self {
            JobTask::Fibonacci(task) => task.is_atomic(&Context::detached()),
            JobTask::Mandelbrot(task) => task.is_atomic(&Context::detached()),
            JobTask::Tsp(task) => task.is_atomic(ctx),
        }
    }

    fn split(&self, ctx: &Context<MinCost>) -> Result<Vec<Self>> {
        Ok(match self {
            JobTask::Fibonacci(task) => task
                .split(&Context::detached())?
                .into_iter()
                .map(JobTask::Fibonacci)
                .collect(),
            JobTask::Mandelbrot(task) => task
                .split(&Context::detached())?
                .into_iter()
                .map(JobTask::Mandelbrot)
                .collect(),
            JobTask::Tsp(task) => task.split(ctx)?.into_iter().map(JobTask::Tsp).collect(),
        })
    }

    fn create_successor(&self) -> Self {
        match self {
            JobTask::Fibonacci(task) => JobTask::Fibonacci(task.create_successor()),
            JobTask::Mandelbrot(task) => JobTask::Mandelbrot(task.create_successor()),
            JobTask::Tsp(task) => JobTask::Tsp(task.create_successor()),
        }
    }

    fn execute(&self, ctx: &Context<MinCost>, inputs: &[JobOutput]) -> Result<JobOutput> {
        match self {
            JobTask::Fibonacci(task) => task
                .execute(&Context::detached(), &numbers(inputs)?)
                .map(JobOutput::Number),
            JobTask::Mandelbrot(task) => task
                .execute(&Context::detached(), &bands(inputs)?)
                .map(JobOutput::Rows),
            JobTask::Tsp(task) => task.execute(ctx, &tours(inputs)?).map(JobOutput::Tour),
        }
    }
}

/// A problem submitted by a client.
pub trait Job {
    type Answer;

    /// The root task payload.
    fn task(&self) -> JobTask;

    /// Shared value installed cluster-wide together with the root.
    fn initial_shared(&self) -> Option<MinCost> {
        None
    }

    /// Turn the final result into the job's answer.
    fn collect(&self, result: TaskResult<JobOutput>) -> Result<Self::Answer>;

    fn root(&self) -> TaskNode<JobTask> {
        let root = TaskNode::root(self.task());
        match self.initial_shared() {
            Some(shared) => root.with_shared(shared),
            None => root,
        }
    }
}

/// Submit `job` through `client`, wait for its result and collect it.
pub async fn run<J: Job>(client: &mut Client<JobTask>, job: &J) -> Result<J::Answer> {
    let started = Instant::now();
    let task_id = client.submit(job.task(), job.initial_shared()).await?;
    flog!("Submitted job as task {}", task_id.short());
    let result = client.take().await?;
    flog!(
        "Job finished in {:?} wall time, {:?} compute time",
        started.elapsed(),
        result.total_elapsed
    );
    job.collect(result)
}

// ========== Fibonacci ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FibonacciJob {
    n: u32,
}

impl FibonacciJob {
    pub fn new(n: u32) -> Result<Self> {
        if n > fibonacci::MAX_N {
            return Err(Error::Validation(format!(
                "n must be at most {}, got {}",
                fibonacci::MAX_N,
                n
            )));
        }
        Ok(Self { n })
    }
}

impl Job for FibonacciJob {
    type Answer = u64;

    fn task(&self) -> JobTask {
        JobTask::Fibonacci(Fibonacci::Compute { n: self.n })
    }

    fn collect(&self, result: TaskResult<JobOutput>) -> Result<u64> {
        match result.into_value() {
            JobOutput::Number(n) => Ok(n),
            other => Err(mismatch("number", &other)),
        }
    }
}

// ========== Mandelbrot ==========

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MandelbrotJob {
    region: Region,
}

impl MandelbrotJob {
    pub fn new(region: Region) -> Result<Self> {
        region.validate()?;
        Ok(Self { region })
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Arrange rows as an image: `image[row][size - 1 - col]`.
    pub fn to_image(&self, rows: &Rows) -> Result<Vec<Vec<u32>>> {
        let size = self.region.size as usize;
        let mut image = vec![vec![0u32; size]; size];
        for (&row, counts) in rows {
            let line = image.get_mut(row as usize).ok_or_else(|| {
                Error::InvalidOperation(format!("row {} outside a {}-pixel region", row, size))
            })?;
            if counts.len() != size {
                return Err(Error::InvalidOperation(format!(
                    "row {} has {} columns, expected {}",
                    row,
                    counts.len(),
                    size
                )));
            }
            for (col, &count) in counts.iter().enumerate() {
                line[size - 1 - col] = count;
            }
        }
        Ok(image)
    }
}

impl Job for MandelbrotJob {
    type Answer = Vec<Vec<u32>>;

    fn task(&self) -> JobTask {
        JobTask::Mandelbrot(Mandelbrot::whole(self.region))
    }

    fn collect(&self, result: TaskResult<JobOutput>) -> Result<Vec<Vec<u32>>> {
        match result.into_value() {
            JobOutput::Rows(rows) if rows.len() == self.region.size as usize => self.to_image(&rows),
            JobOutput::Rows(rows) => Err(Error::InvalidOperation(format!(
                "expected {} rows, got {}",
                self.region.size,
                rows.len()
            ))),
            other => Err(mismatch("rows", &other)),
        }
    }
}

// ========== TSP ==========

#[derive(Debug, Clone, PartialEq)]
pub struct TspJob {
    cities: Vec<City>,
    greedy: Tour,
}

impl TspJob {
    pub fn new(cities: Vec<City>) -> Result<Self> {
        if cities.is_empty() {
            return Err(Error::Validation("at least one city is required".to_string()));
        }
        if cities.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::Validation("city coordinates must be finite".to_string()));
        }
        let greedy = tsp::greedy(&cities);
        Ok(Self { cities, greedy })
    }

    /// The nearest-neighbour tour seeding the search.
    pub fn greedy(&self) -> &Tour {
        &self.greedy
    }
}

impl Job for TspJob {
    type Answer = Tour;

    fn task(&self) -> JobTask {
        JobTask::Tsp(Tsp::root(self.cities.clone()))
    }

    fn initial_shared(&self) -> Option<MinCost> {
        Some(MinCost(self.greedy.cost))
    }

    /// The search only returns tours at least as good as the seed; when it
    /// returns none the seed itself is optimal.
    fn collect(&self, result: TaskResult<JobOutput>) -> Result<Tour> {
        match result.into_value() {
            JobOutput::Tour(Some(tour)) if tour.cost <= self.greedy.cost => Ok(tour),
            JobOutput::Tour(_) => Ok(self.greedy.clone()),
            other => Err(mismatch("tour", &other)),
        }
    }
}
