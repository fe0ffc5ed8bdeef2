//! Fixed-size thread pool a Computer hands tasks to once its workers are
//! started.
//!
//! Tasks arrive over an unbounded `crossbeam-channel`; every thread pulls
//! from the same receiver, runs the task and reports straight to the uplink.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use tokio::sync::mpsc;

use crate::core::shared::Context;
use crate::core::task::{Task, TaskNode};
use crate::error::{Error, Result};
use crate::system::computer::{process, report};
use crate::system::protocol::{ToSpace, WorkerId};
use crate::{flog_debug, flog_warn};

pub struct Pool<T: Task> {
    jobs: Sender<TaskNode<T>>,
    threads: Vec<JoinHandle<()>>,
}

impl<T: Task> Pool<T> {
    /// Start `size` threads (at least one) sharing `ctx`.
    pub fn start(
        worker_id: WorkerId,
        size: usize,
        ctx: Context<T::Shared>,
        uplink: mpsc::UnboundedSender<ToSpace<T>>,
    ) -> Result<Self> {
        let (jobs, queue) = unbounded::<TaskNode<T>>();
        let mut threads = Vec::with_capacity(size.max(1));

        for n in 0..size.max(1) {
            let queue = queue.clone();
            let ctx = ctx.clone();
            let uplink = uplink.clone();
            let handle = thread::Builder::new()
                .name(format!("forkspace-worker-{}-{}", worker_id, n))
                .spawn(move || {
                    for task in queue.iter() {
                        let id = task.id;
                        report(worker_id, id, process(task, &ctx), &uplink);
                    }
                })?;
            threads.push(handle);
        }
        flog_debug!("Worker {} started a pool of {} thread(s)", worker_id, threads.len());

        Ok(Self { jobs, threads })
    }

    pub fn size(&self) -> usize {
        self.threads.len()
    }

    pub fn submit(&self, task: TaskNode<T>) -> Result<()> {
        self.jobs
            .send(task)
            .map_err(|_| Error::InvalidOperation("worker pool is shut down".to_string()))
    }

    /// Close the queue and wait for the threads to drain it. Blocks.
    pub fn shutdown(self) {
        let Self { jobs, threads } = self;
        drop(jobs);
        let size = threads.len();
        for handle in threads {
            if handle.join().is_err() {
                flog_warn!("A worker pool thread panicked before shutdown");
            }
        }
        flog_debug!("Worker pool of {} thread(s) joined", size);
    }
}
