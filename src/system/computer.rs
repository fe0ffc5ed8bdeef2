//! The Computer: worker runtime that executes what the Space dispatches.
//!
//! A Computer starts in synchronous mode, running one task at a time on the
//! blocking pool. `StartWorkers` switches it to a local [`Pool`] sized by
//! the configured parallelism so that dispatch latency overlaps compute.
//! It keeps a lagging copy of the shared value and pushes local
//! improvements upstream. Shared values are applied as soon as they
//! arrive, even while a synchronous task is still running.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::config::Settings;
use crate::core::shared::{Context, SharedState};
use crate::core::task::{Decomposition, Task, TaskId, TaskNode};
use crate::error::{Error, Result};
use crate::system::pool::Pool;
use crate::system::protocol::{ToSpace, ToWorker, WorkerId};
use crate::{flog, flog_debug, flog_error, flog_trace, flog_warn, util};

/// Run one dispatched task: execute it when it is a Join or atomic,
/// otherwise decompose it.
///
/// Collaborator panics are caught and returned as errors.
pub fn process<T: Task>(mut task: TaskNode<T>, ctx: &Context<T::Shared>) -> Result<ToSpace<T>> {
    let id = task.id;
    let ctx = &ctx.for_generation(task.generation);
    let outcome = util::guarded(|| {
        let start = Instant::now();
        if task.is_join() || task.payload.is_atomic(ctx) {
            let inputs = task.filled_inputs()?;
            let value = task.payload.execute(ctx, &inputs)?;
            task.result = Some(value);
            task.elapsed = start.elapsed();
            Ok(ToSpace::StoreResult { task })
        } else {
            let children = task.payload.split(ctx)?;
            let successor = task.payload.create_successor();
            let decomposition = Decomposition::wire(&task, children, successor, start.elapsed());
            Ok(ToSpace::StoreTasks { decomposition })
        }
    });
    outcome.map_err(|e| match e {
        Error::Collaborator(reason) | Error::TaskJoin(reason) => Error::Task { id, reason },
        other => other,
    })
}

/// Send an outcome upstream, or log why there is nothing to send.
///
/// A failed task is never reported; its Join stays unresolved.
pub fn report<T: Task>(
    worker_id: WorkerId,
    id: TaskId,
    outcome: Result<ToSpace<T>>,
    uplink: &mpsc::UnboundedSender<ToSpace<T>>,
) {
    match outcome {
        Ok(message) => {
            flog_trace!("Worker {} reports {} for {}", worker_id, message.name(), id.short());
            if uplink.send(message).is_err() {
                flog_warn!("Worker {} lost its uplink, report for {} dropped", worker_id, id.short());
            }
        }
        Err(e) => flog_error!("Worker {}: {}", worker_id, e),
    }
}

pub struct Computer<T: Task> {
    worker_id: WorkerId,
    settings: Settings,
    shared: Arc<SharedState<T::Shared>>,
    uplink: mpsc::UnboundedSender<ToSpace<T>>,
    pool: Option<Pool<T>>,
}

impl<T: Task> Computer<T> {
    pub fn new(settings: Settings, uplink: mpsc::UnboundedSender<ToSpace<T>>) -> Self {
        Self {
            worker_id: WorkerId::SPACE,
            settings,
            shared: Arc::new(SharedState::new()),
            uplink,
            pool: None,
        }
    }

    /// Zero until the Space has answered with `Registered`.
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn shared(&self) -> Option<T::Shared> {
        self.shared.get()
    }

    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Context handed to collaborator code. Improvements found locally are
    /// forwarded to the Space.
    pub fn context(&self) -> Context<T::Shared> {
        let uplink = self.uplink.clone();
        let worker_id = self.worker_id;
        Context::new(
            Arc::clone(&self.shared),
            Some(Arc::new(move |generation: u64, value: T::Shared| {
                if uplink.send(ToSpace::SetShared { value, generation }).is_err() {
                    flog_debug!("Worker {} uplink closed, shared value not forwarded", worker_id);
                }
            })),
        )
    }

    /// Consume messages until `Exit` or the Space closes the link.
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<ToWorker<T>>) -> Result<()> {
        // Messages that arrived while a synchronous task was running.
        let mut backlog = VecDeque::new();
        loop {
            let message = match backlog.pop_front() {
                Some(message) => message,
                None => match inbox.recv().await {
                    Some(message) => message,
                    None => break,
                },
            };
            flog_trace!("Worker {} received {}", self.worker_id, message.name());
            match message {
                ToWorker::Registered { worker_id } => {
                    self.worker_id = worker_id;
                    flog!("Registered with the space as worker {}", worker_id);
                }
                ToWorker::Execute { task } if self.pool.is_none() => {
                    self.execute_listening(task, &mut inbox, &mut backlog).await?
                }
                ToWorker::Execute { task } => self.execute(task).await?,
                ToWorker::SetShared {
                    value,
                    generation,
                    can_propagate,
                } => self.set_shared(value, generation, can_propagate),
                ToWorker::StartWorkers => self.start_workers()?,
                ToWorker::Exit => {
                    flog!("Worker {} told to exit", self.worker_id);
                    break;
                }
            }
        }
        if let Some(pool) = self.pool.take() {
            util::blocking(move || {
                pool.shutdown();
                Ok(())
            })
            .await?;
        }
        flog_debug!("Worker {} stopped", self.worker_id);
        Ok(())
    }

    /// Run one task synchronously while applying shared values that arrive
    /// in the meantime. Every other message is held in `backlog`.
    async fn execute_listening(
        &self,
        task: TaskNode<T>,
        inbox: &mut mpsc::UnboundedReceiver<ToWorker<T>>,
        backlog: &mut VecDeque<ToWorker<T>>,
    ) -> Result<()> {
        let id = task.id;
        let ctx = self.context();
        let running = util::blocking(move || Ok(process(task, &ctx)));
        tokio::pin!(running);

        let mut open = true;
        let outcome = loop {
            tokio::select! {
                outcome = &mut running => break outcome?,
                message = inbox.recv(), if open => match message {
                    Some(ToWorker::SetShared { value, generation, can_propagate }) => {
                        self.set_shared(value, generation, can_propagate)
                    }
                    Some(other) => backlog.push_back(other),
                    None => open = false,
                },
            }
        };
        report(self.worker_id, id, outcome, &self.uplink);
        Ok(())
    }

    /// Run one task. In synchronous mode this waits for the outcome; in
    /// pool mode it only queues the task.
    pub async fn execute(&self, task: TaskNode<T>) -> Result<()> {
        if let Some(pool) = &self.pool {
            return pool.submit(task);
        }
        let id = task.id;
        let ctx = self.context();
        let outcome = util::blocking(move || Ok(process(task, &ctx))).await?;
        report(self.worker_id, id, outcome, &self.uplink);
        Ok(())
    }

    /// Install a newer value for `generation` in the local cache. It travels
    /// back up only when the sender allows it.
    pub fn set_shared(&self, value: T::Shared, generation: u64, can_propagate: bool) {
        if !self.shared.propose_at(generation, value.clone()) {
            return;
        }
        flog_debug!("Worker {} shared value now {:?} (generation {})", self.worker_id, value, generation);
        if can_propagate && self.uplink.send(ToSpace::SetShared { value, generation }).is_err() {
            flog_warn!("Worker {} could not propagate shared value", self.worker_id);
        }
    }

    /// Switch to pool mode. A second request is ignored.
    pub fn start_workers(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        let size = self.settings.parallelism();
        self.pool = Some(Pool::start(self.worker_id, size, self.context(), self.uplink.clone())?);
        flog!("Worker {} running {} thread(s)", self.worker_id, size);
        Ok(())
    }
}
