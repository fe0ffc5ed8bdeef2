//! In-process Computers attached straight to a Space over channels.
//!
//! Used for single-host runs and tests. [`LocalWorker::kill`] simulates a
//! crashed worker: its tasks stop and the Space requeues what it held.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::core::task::Task;
use crate::error::{Error, Result};
use crate::system::computer::Computer;
use crate::system::protocol::{ToSpace, WorkerId};
use crate::system::space::{Space, SpaceHandle};
use crate::{flog_error, flog_warn};

/// A Computer running on this runtime, registered with a local Space.
pub struct LocalWorker<T: Task> {
    handle: SpaceHandle<T>,
    computer: JoinHandle<Result<()>>,
    pump: JoinHandle<()>,
}

impl<T: Task> LocalWorker<T> {
    /// Register a new Computer with `space` and start it.
    pub fn attach(space: &Arc<Space<T>>, settings: Settings) -> Result<Self> {
        let (down_tx, down_rx) = mpsc::unbounded_channel();
        let (up_tx, up_rx) = mpsc::unbounded_channel();

        let handle = space.register_worker(down_tx, settings.parallelism())?;
        let computer = tokio::spawn(Computer::new(settings, up_tx).run(down_rx));
        let pump = tokio::spawn(pump(handle.clone(), up_rx));

        Ok(Self {
            handle,
            computer,
            pump,
        })
    }

    pub fn worker_id(&self) -> WorkerId {
        self.handle.worker_id()
    }

    /// Abort the worker without letting it report anything further, then
    /// deregister it.
    pub fn kill(self) {
        flog_warn!("Killing worker {}", self.worker_id());
        self.pump.abort();
        self.computer.abort();
        self.handle.disconnect();
    }

    /// Wait for the Computer to finish, normally after the Space stopped.
    pub async fn join(self) -> Result<()> {
        let outcome = self
            .computer
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))?;
        self.pump.abort();
        outcome
    }
}

/// Forward everything the Computer reports to the Space.
pub(crate) async fn pump<T: Task>(handle: SpaceHandle<T>, mut reports: mpsc::UnboundedReceiver<ToSpace<T>>) {
    let evicted = handle.evicted();
    loop {
        let message = tokio::select! {
            _ = evicted.cancelled() => break,
            message = reports.recv() => message,
        };
        let Some(message) = message else {
            handle.disconnect();
            break;
        };
        match handle.deliver(message).await {
            Ok(()) => {}
            Err(Error::Interrupted) => break,
            Err(e) => flog_error!("Report from worker {} rejected: {}", handle.worker_id(), e),
        }
    }
}
