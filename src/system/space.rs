//! The Space: central coordinator of the fork-join computation.
//!
//! The Space owns the ready queue, the table of Joins still waiting for
//! inputs, the outbox of final results and the authoritative shared value.
//! Every registered Computer gets its own dispatch loop that hands it the
//! most recently enqueued ready task. Reports flow back through a
//! [`SpaceHandle`] and are merged under one lock so that slot writes and
//! join-counter decrements stay atomic with respect to each other.
//!
//! Each submitted root opens a generation. Bookkeeping and the shared value
//! are kept per generation and dropped once the root's answer is published.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::core::shared::{Context, SharedState};
use crate::core::task::{Decomposition, Task, TaskId, TaskNode, TaskResult};
use crate::error::{Error, Result};
use crate::system::protocol::{ToSpace, ToWorker, WorkerId};
use crate::{flog, flog_debug, flog_error, flog_trace, flog_warn, util};

/// Ready queue, waiting table and exactly-once accounting.
///
/// Always mutated under one lock so the join invariants hold across
/// interleaved reports.
struct Store<T: Task> {
    /// Front is the most recently enqueued task.
    ready: VecDeque<TaskNode<T>>,
    /// Joins with a non-zero counter.
    waiting: HashMap<TaskId, TaskNode<T>>,
    /// Joins that left the waiting table, per generation; reports aimed at
    /// them are stale.
    retired: HashMap<u64, HashSet<TaskId>>,
    /// Tasks whose result or decomposition has been merged, per generation.
    reported: HashMap<u64, HashSet<TaskId>>,
    /// Generations whose answer has been published. Anything still
    /// arriving for them is dropped.
    finished: HashSet<u64>,
    tasks_reported: u64,
    total_task_time: Duration,
}

impl<T: Task> Store<T> {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            waiting: HashMap::new(),
            retired: HashMap::new(),
            reported: HashMap::new(),
            finished: HashSet::new(),
            tasks_reported: 0,
            total_task_time: Duration::ZERO,
        }
    }

    fn is_reported(&self, generation: u64, id: &TaskId) -> bool {
        self.finished.contains(&generation)
            || self.reported.get(&generation).is_some_and(|ids| ids.contains(id))
    }

    fn is_retired(&self, generation: u64, id: &TaskId) -> bool {
        self.retired.get(&generation).is_some_and(|ids| ids.contains(id))
    }

    fn account(&mut self, generation: u64, id: TaskId, elapsed: Duration) {
        self.reported.entry(generation).or_default().insert(id);
        self.tasks_reported += 1;
        self.total_task_time += elapsed;
    }

    /// Mark a report as seen without merging it.
    fn discard(&mut self, generation: u64, id: TaskId) {
        self.reported.entry(generation).or_default().insert(id);
    }

    /// A Join whose counter reached zero becomes ready exactly once.
    fn release(&mut self, join: TaskNode<T>) {
        self.retired.entry(join.generation).or_default().insert(join.id);
        self.ready.push_front(join);
    }

    /// Forget a generation whose answer is out. Returns how many queued or
    /// waiting nodes of it were dropped.
    fn finish(&mut self, generation: u64) -> usize {
        self.finished.insert(generation);
        self.retired.remove(&generation);
        self.reported.remove(&generation);
        let before = self.ready.len() + self.waiting.len();
        self.ready.retain(|task| task.generation != generation);
        self.waiting.retain(|_, join| join.generation != generation);
        before - self.ready.len() - self.waiting.len()
    }

    /// Task ids held for exactly-once accounting across all generations.
    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.retired.values().chain(self.reported.values()).map(HashSet::len).sum()
    }
}

/// Coordinator-side view of one registered Computer.
struct WorkerEntry<T: Task> {
    link: mpsc::UnboundedSender<ToWorker<T>>,
    /// Dispatched tasks that have not reported yet.
    outstanding: HashMap<TaskId, TaskNode<T>>,
    /// One permit per task the worker may hold at once.
    window: Arc<Semaphore>,
    cancel: CancellationToken,
}

/// Snapshot of the Space's counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpaceStats {
    /// Results and decompositions merged so far.
    pub tasks_reported: u64,
    /// Compute time summed over every merged report.
    pub total_task_time: Duration,
    pub ready: usize,
    pub waiting: usize,
    pub workers: usize,
}

impl SpaceStats {
    pub fn average_task_time(&self) -> Duration {
        if self.tasks_reported == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.total_task_time.as_secs_f64() / self.tasks_reported as f64)
    }
}

/// The coordinator.
///
/// Always used behind an `Arc`: dispatch loops, rebroadcasts and absorbed
/// Joins run as spawned tasks that keep the Space alive.
///
/// # Example
///
/// ```ignore
/// use forkspace::config::Settings;
/// use forkspace::core::task::TaskNode;
/// use forkspace::system::space::Space;
///
/// let space = Space::new(Settings::default());
/// space.submit(TaskNode::root(task))?;
/// let result = space.take().await?;
/// ```
pub struct Space<T: Task> {
    settings: Settings,
    store: Mutex<Store<T>>,
    /// Signalled whenever the ready queue gains a task.
    ready_signal: Notify,
    /// Signalled whenever a Join is installed in the waiting table.
    install_signal: Notify,
    outbox_tx: mpsc::UnboundedSender<TaskResult<T::Output>>,
    outbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TaskResult<T::Output>>>,
    shared: Arc<SharedState<T::Shared>>,
    workers: Mutex<HashMap<WorkerId, WorkerEntry<T>>>,
    next_worker_id: AtomicU64,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl<T: Task> Space<T> {
    pub fn new(settings: Settings) -> Arc<Self> {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            settings,
            store: Mutex::new(Store::new()),
            ready_signal: Notify::new(),
            install_signal: Notify::new(),
            outbox_tx,
            outbox_rx: tokio::sync::Mutex::new(outbox_rx),
            shared: Arc::new(SharedState::new()),
            workers: Mutex::new(HashMap::new()),
            next_worker_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// The authoritative shared value.
    pub fn shared(&self) -> Option<T::Shared> {
        self.shared.get()
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once [`Space::stop`] has been called.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await
    }

    pub fn worker_count(&self) -> usize {
        self.lock_workers().len()
    }

    pub fn stats(&self) -> SpaceStats {
        let (tasks_reported, total_task_time, ready, waiting) = {
            let store = self.lock_store();
            (
                store.tasks_reported,
                store.total_task_time,
                store.ready.len(),
                store.waiting.len(),
            )
        };
        SpaceStats {
            tasks_reported,
            total_task_time,
            ready,
            waiting,
            workers: self.worker_count(),
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, Store<T>> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_workers(&self) -> MutexGuard<'_, HashMap<WorkerId, WorkerEntry<T>>> {
        self.workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========== Client Surface ==========

    /// Enqueue a task at the front of the ready queue.
    ///
    /// The task opens a new generation, which replaces the shared value of
    /// any earlier job. A root carrying an initial shared value installs it
    /// and broadcasts it to every registered worker.
    pub fn submit(self: &Arc<Self>, mut task: TaskNode<T>) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::Interrupted);
        }
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        task.generation = generation;
        if self.shared.reset(generation, task.init_shared.clone()) {
            if let Some(initial) = task.init_shared.clone() {
                flog_debug!("Initial shared value installed: {:?}", initial);
                self.broadcast(initial, generation, WorkerId::SPACE);
            }
        }
        flog!(
            "Submitted task {} (level {}, generation {})",
            task.id.short(),
            task.level,
            generation
        );
        self.lock_store().ready.push_front(task);
        self.ready_signal.notify_waiters();
        Ok(())
    }

    /// Block until a final result is published.
    ///
    /// Returns `Error::Interrupted` once the Space is stopped.
    pub async fn take(&self) -> Result<TaskResult<T::Output>> {
        let mut outbox = tokio::select! {
            guard = self.outbox_rx.lock() => guard,
            _ = self.shutdown.cancelled() => return Err(Error::Interrupted),
        };
        tokio::select! {
            result = outbox.recv() => result.ok_or(Error::Interrupted),
            _ = self.shutdown.cancelled() => Err(Error::Interrupted),
        }
    }

    /// Tell every worker to exit and wake all waiters.
    pub fn stop(&self) {
        if self.is_stopped() {
            return;
        }
        let workers: Vec<(WorkerId, WorkerEntry<T>)> = self.lock_workers().drain().collect();
        flog!("Stopping space, telling {} worker(s) to exit", workers.len());
        for (id, entry) in workers {
            if entry.link.send(ToWorker::Exit).is_err() {
                flog_debug!("Worker {} already gone at stop", id);
            }
            entry.window.close();
            entry.cancel.cancel();
        }
        self.shutdown.cancel();
        self.ready_signal.notify_waiters();
        self.install_signal.notify_waiters();
    }

    // ========== Worker Registry ==========

    /// Register a worker reachable through `link`.
    ///
    /// Sends `Registered`, then `StartWorkers` when joins are absorbed, then
    /// the current shared value if one is held, and starts the worker's
    /// dispatch loop.
    ///
    /// # Arguments
    ///
    /// * `link` - Outbound channel to the worker
    /// * `parallelism` - Threads the worker runs once its pool is started
    pub fn register_worker(
        self: &Arc<Self>,
        link: mpsc::UnboundedSender<ToWorker<T>>,
        parallelism: usize,
    ) -> Result<SpaceHandle<T>> {
        if self.is_stopped() {
            return Err(Error::Interrupted);
        }
        let worker_id = WorkerId(self.next_worker_id.fetch_add(1, Ordering::SeqCst));
        let window_size = if self.settings.absorb_joins {
            parallelism.max(1) + 1
        } else {
            1
        };

        link.send(ToWorker::Registered { worker_id })
            .map_err(|_| Error::transport(format!("worker {} closed before registration", worker_id)))?;
        if self.settings.absorb_joins {
            link.send(ToWorker::StartWorkers)
                .map_err(|_| Error::transport(format!("worker {} closed before start", worker_id)))?;
        }
        if let (generation, Some(value)) = self.shared.snapshot() {
            link.send(ToWorker::SetShared {
                value,
                generation,
                can_propagate: false,
            })
            .map_err(|_| Error::transport(format!("worker {} closed before start", worker_id)))?;
        }

        let window = Arc::new(Semaphore::new(window_size));
        let cancel = self.shutdown.child_token();
        self.lock_workers().insert(
            worker_id,
            WorkerEntry {
                link,
                outstanding: HashMap::new(),
                window: Arc::clone(&window),
                cancel: cancel.clone(),
            },
        );
        flog!(
            "Worker {} registered (parallelism={}, window={})",
            worker_id,
            parallelism,
            window_size
        );

        tokio::spawn(Arc::clone(self).dispatch_loop(worker_id, window, cancel.clone()));

        Ok(SpaceHandle {
            space: Arc::clone(self),
            worker_id,
            cancel,
        })
    }

    /// Deregister a worker and put everything it held back at the front of
    /// the ready queue. Returns false if it was not registered.
    pub fn evict(&self, worker_id: WorkerId) -> bool {
        let Some(entry) = self.lock_workers().remove(&worker_id) else {
            return false;
        };
        entry.window.close();
        entry.cancel.cancel();
        let orphans: Vec<TaskNode<T>> = entry.outstanding.into_values().collect();
        flog_warn!(
            "Evicted worker {}, requeueing {} outstanding task(s)",
            worker_id,
            orphans.len()
        );
        self.requeue(orphans);
        true
    }

    fn requeue(&self, tasks: Vec<TaskNode<T>>) {
        if tasks.is_empty() {
            return;
        }
        {
            let mut store = self.lock_store();
            for task in tasks {
                if store.is_reported(task.generation, &task.id) {
                    continue;
                }
                store.ready.push_front(task);
            }
        }
        self.ready_signal.notify_waiters();
    }

    /// Return a dispatch permit once a worker reports on `task_id`.
    fn settle(&self, worker_id: WorkerId, task_id: &TaskId) {
        let mut workers = self.lock_workers();
        if let Some(entry) = workers.get_mut(&worker_id) {
            if entry.outstanding.remove(task_id).is_some() {
                entry.window.add_permits(1);
            }
        }
    }

    // ========== Dispatch ==========

    async fn next_ready(&self) -> TaskNode<T> {
        loop {
            let notified = self.ready_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let popped = self.lock_store().ready.pop_front();
            if let Some(task) = popped {
                return task;
            }
            notified.await;
        }
    }

    async fn dispatch_loop(self: Arc<Self>, worker_id: WorkerId, window: Arc<Semaphore>, cancel: CancellationToken) {
        flog_debug!("Dispatch loop for worker {} started", worker_id);
        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&window).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let task = tokio::select! {
                _ = cancel.cancelled() => break,
                task = self.next_ready() => task,
            };

            if self.settings.absorb_joins && task.is_join() && task.payload.execute_on_space() {
                drop(permit);
                tokio::spawn(Arc::clone(&self).absorb(task));
                continue;
            }

            // Returned by `settle` when the worker reports.
            permit.forget();
            if !self.dispatch_to(worker_id, task) {
                break;
            }
        }
        flog_debug!("Dispatch loop for worker {} ended", worker_id);
    }

    /// Hand `task` to a worker. On failure the worker is evicted and the
    /// task requeued.
    fn dispatch_to(&self, worker_id: WorkerId, task: TaskNode<T>) -> bool {
        let orphan = {
            let mut workers = self.lock_workers();
            match workers.get_mut(&worker_id) {
                None => Some(task),
                Some(entry) => {
                    flog_trace!("Dispatching {} {} to worker {}", task.kind, task.id.short(), worker_id);
                    let id = task.id;
                    entry.outstanding.insert(id, task.clone());
                    if entry.link.send(ToWorker::Execute { task }).is_ok() {
                        return true;
                    }
                    None
                }
            }
        };
        match orphan {
            Some(task) => self.requeue(vec![task]),
            None => {
                flog_warn!("Worker {} unreachable during dispatch", worker_id);
                self.evict(worker_id);
            }
        }
        false
    }

    /// Execute a ready Join here instead of sending it over the network.
    async fn absorb(self: Arc<Self>, mut join: TaskNode<T>) {
        let id = join.id;
        let ctx = self.context().for_generation(join.generation);
        let executed = util::blocking(move || {
            let start = Instant::now();
            let inputs = join.filled_inputs()?;
            let value = join.payload.execute(&ctx, &inputs)?;
            join.result = Some(value);
            join.elapsed = start.elapsed();
            Ok(join)
        })
        .await;

        match executed {
            Ok(join) => {
                flog_trace!("Absorbed join {} in {:?}", id.short(), join.elapsed);
                if let Err(e) = self.on_result_produced(join).await {
                    flog_error!("Absorbed join {} could not be merged: {}", id.short(), e);
                }
            }
            Err(e) => flog_error!("Join {} failed on the space: {}", id.short(), e),
        }
    }

    fn context(self: &Arc<Self>) -> Context<T::Shared> {
        let space = Arc::clone(self);
        Context::new(
            Arc::clone(&self.shared),
            Some(Arc::new(move |generation: u64, value: T::Shared| {
                space.broadcast(value, generation, WorkerId::SPACE)
            })),
        )
    }

    // ========== Merging Reports ==========

    /// Merge a decomposition: install the new Join, re-point the parent's
    /// slot in its own successor at the Join, and enqueue the children.
    pub async fn on_children_produced(&self, decomposition: Decomposition<T>) -> Result<()> {
        let parent = decomposition.parent;
        self.until_installed(decomposition, |d| self.try_store_tasks(d))
            .await
            .map_err(|e| {
                flog_debug!("Decomposition of {} not merged: {}", parent.short(), e);
                e
            })
    }

    fn try_store_tasks(&self, d: Decomposition<T>) -> Result<Option<Decomposition<T>>> {
        let mut store = self.lock_store();
        let generation = d.join.generation;
        if store.is_reported(generation, &d.parent) {
            flog_debug!("Duplicate decomposition of {} dropped", d.parent.short());
            return Ok(None);
        }
        if d.join.join_counter != d.children.len() || d.join.inputs.len() != d.children.len() {
            return Err(Error::InvalidOperation(format!(
                "join {} waits on {} input(s) but {} children were produced",
                d.join.id,
                d.join.join_counter,
                d.children.len()
            )));
        }

        if let Some(successor) = d.parent_successor {
            let arg_index = d.parent_arg_index.ok_or_else(|| {
                Error::InvalidOperation(format!("task {} has a successor but no argument index", d.parent))
            })?;
            if store.is_retired(generation, &successor) {
                flog_debug!("Decomposition of {} aims at retired join {}", d.parent.short(), successor.short());
                store.discard(generation, d.parent);
                return Ok(None);
            }
            let Some(join) = store.waiting.get_mut(&successor) else {
                return Ok(Some(d));
            };
            if !join.repoint(arg_index, &d.parent, d.join.id)? {
                flog_debug!("Slot {} of {} no longer waits on {}", arg_index, successor.short(), d.parent.short());
                store.discard(generation, d.parent);
                return Ok(None);
            }
        }

        store.account(generation, d.parent, d.elapsed);
        let mut join = d.join;
        join.subtree_elapsed += d.elapsed;
        let child_count = d.children.len();
        if join.join_counter == 0 {
            store.release(join);
        } else {
            store.waiting.insert(join.id, join);
        }
        for child in d.children {
            store.ready.push_front(child);
        }
        drop(store);

        flog_trace!("Decomposed {} into {} children", d.parent.short(), child_count);
        self.install_signal.notify_waiters();
        self.ready_signal.notify_waiters();
        Ok(None)
    }

    /// Merge a result: fill the successor's slot and release it when its
    /// counter reaches zero, or publish the final answer for level 0.
    pub async fn on_result_produced(&self, task: TaskNode<T>) -> Result<()> {
        self.until_installed(task, |t| self.try_store_result(t)).await
    }

    fn try_store_result(&self, task: TaskNode<T>) -> Result<Option<TaskNode<T>>> {
        let mut store = self.lock_store();
        let generation = task.generation;
        if store.is_reported(generation, &task.id) {
            flog_debug!("Duplicate result of {} dropped", task.id.short());
            return Ok(None);
        }
        let value = task
            .result
            .clone()
            .ok_or_else(|| Error::InvalidOperation(format!("task {} reported without a result", task.id)))?;

        let Some(successor) = task.successor else {
            if task.level > 0 {
                return Err(Error::InvalidOperation(format!(
                    "task {} at level {} has no successor",
                    task.id, task.level
                )));
            }
            store.account(generation, task.id, task.elapsed);
            let dropped = store.finish(generation);
            drop(store);
            if dropped > 0 {
                flog_debug!("Generation {} finished, {} leftover node(s) dropped", generation, dropped);
            }
            self.publish(TaskResult::new(value, task.id, task.elapsed + task.subtree_elapsed));
            return Ok(None);
        };

        let arg_index = task.arg_index.ok_or_else(|| {
            Error::InvalidOperation(format!("task {} has a successor but no argument index", task.id))
        })?;
        if store.is_retired(generation, &successor) {
            flog_debug!("Result of {} aims at retired join {}", task.id.short(), successor.short());
            store.discard(generation, task.id);
            return Ok(None);
        }
        let Some(join) = store.waiting.get_mut(&successor) else {
            return Ok(Some(task));
        };
        if !join.fill(arg_index, &task.id, value)? {
            flog_debug!("Slot {} of {} no longer waits on {}", arg_index, successor.short(), task.id.short());
            store.discard(generation, task.id);
            return Ok(None);
        }
        join.subtree_elapsed += task.elapsed + task.subtree_elapsed;
        let ready = join.join_counter == 0;
        store.account(generation, task.id, task.elapsed);

        if ready {
            if let Some(join) = store.waiting.remove(&successor) {
                store.release(join);
                drop(store);
                flog_trace!("Join {} is ready", successor.short());
                self.ready_signal.notify_waiters();
            }
        }
        Ok(None)
    }

    /// Retry `attempt` until it no longer reports a missing successor.
    ///
    /// `attempt` hands the report back when the successor it targets is
    /// not installed yet; the retry waits for the next installation instead
    /// of spinning.
    async fn until_installed<R>(
        &self,
        mut report: R,
        mut attempt: impl FnMut(R) -> Result<Option<R>>,
    ) -> Result<()> {
        loop {
            let notified = self.install_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match attempt(report)? {
                None => return Ok(()),
                Some(pending) => report = pending,
            }
            flog_debug!("Successor not installed yet, waiting");
            tokio::select! {
                _ = &mut notified => {}
                _ = self.shutdown.cancelled() => return Err(Error::Interrupted),
            }
        }
    }

    fn publish(&self, result: TaskResult<T::Output>) {
        let stats = self.stats();
        flog!(
            "Final result {} ready: {} task(s), total {:?}, average {:?}",
            result.task_id.short(),
            stats.tasks_reported,
            stats.total_task_time,
            stats.average_task_time()
        );
        if self.outbox_tx.send(result).is_err() {
            flog_error!("Outbox closed, final result lost");
        }
    }

    // ========== Shared Value ==========

    /// Install `value`, found in `generation`, if strictly newer and push it
    /// to every worker except `origin` without blocking the caller. Values
    /// from a generation older than the current one are ignored. Returns
    /// whether it was installed.
    pub fn on_shared_update(self: &Arc<Self>, value: T::Shared, generation: u64, origin: WorkerId) -> bool {
        if !self.shared.propose_at(generation, value.clone()) {
            flog_trace!("Shared value from {} is not newer", origin);
            return false;
        }
        flog_debug!("Shared value improved by {}: {:?}", origin, value);
        self.broadcast(value, generation, origin);
        true
    }

    fn broadcast(self: &Arc<Self>, value: T::Shared, generation: u64, except: WorkerId) {
        let space = Arc::clone(self);
        tokio::spawn(async move {
            let links: Vec<(WorkerId, mpsc::UnboundedSender<ToWorker<T>>)> = space
                .lock_workers()
                .iter()
                .filter(|(id, _)| **id != except)
                .map(|(id, entry)| (*id, entry.link.clone()))
                .collect();
            for (id, link) in links {
                let message = ToWorker::SetShared {
                    value: value.clone(),
                    generation,
                    can_propagate: false,
                };
                if link.send(message).is_err() {
                    flog_warn!("Worker {} unreachable during broadcast", id);
                    space.evict(id);
                }
            }
        });
    }
}

/// Callback surface a registered worker reports through.
#[derive(Clone)]
pub struct SpaceHandle<T: Task> {
    space: Arc<Space<T>>,
    worker_id: WorkerId,
    cancel: CancellationToken,
}

impl<T: Task> SpaceHandle<T> {
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn space(&self) -> &Arc<Space<T>> {
        &self.space
    }

    /// Cancelled when this worker is evicted or the Space stops.
    pub fn evicted(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn store_result(&self, task: TaskNode<T>) -> Result<()> {
        self.space.settle(self.worker_id, &task.id);
        self.space.on_result_produced(task).await
    }

    pub async fn store_tasks(&self, decomposition: Decomposition<T>) -> Result<()> {
        self.space.settle(self.worker_id, &decomposition.parent);
        self.space.on_children_produced(decomposition).await
    }

    pub fn set_shared(&self, value: T::Shared, generation: u64) -> bool {
        self.space.on_shared_update(value, generation, self.worker_id)
    }

    /// Route one inbound message.
    pub async fn deliver(&self, message: ToSpace<T>) -> Result<()> {
        flog_trace!("Worker {} sent {}", self.worker_id, message.name());
        match message {
            ToSpace::StoreResult { task } => self.store_result(task).await,
            ToSpace::StoreTasks { decomposition } => self.store_tasks(decomposition).await,
            ToSpace::SetShared { value, generation } => {
                self.set_shared(value, generation);
                Ok(())
            }
        }
    }

    /// The worker's connection is gone.
    pub fn disconnect(&self) -> bool {
        self.space.evict(self.worker_id)
    }
}
