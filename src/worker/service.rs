//! Hosting the transfer worker on a background thread
//!
//! [`RsyncService`] owns the worker thread for the lifetime of the host.
//! Producers get a cloneable [`TransferQueue`] and never block: the queue
//! is unbounded and the worker trims it when it falls behind.

use super::thread::{StateHandle, TransferRequest, TransferWorker, WorkerMessage, WorkerState, WorkerSummary};
use crate::config::TransferConfig;
use crate::error::{Result, RsyncTransferError};
use crate::logging::TransferLog;
use crate::process::{CommandRunner, TransferExecutor};
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Name given to the worker thread
pub const WORKER_THREAD_NAME: &str = "rsync-worker";

/// Default time [`RsyncService::stop`] waits for the worker
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(20);

/// Producer side of the worker queue
#[derive(Debug, Clone)]
pub struct TransferQueue {
    sender: Sender<WorkerMessage>,
}

impl TransferQueue {
    /// Ask the worker to transfer `path`
    ///
    /// Never blocks. Fails only once the worker has exited.
    pub fn enqueue(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.sender
            .send(WorkerMessage::Transfer(TransferRequest::new(path)))
            .map_err(|_| RsyncTransferError::QueueClosed)
    }

    /// Messages waiting to be taken by the worker
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// True when nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    fn shutdown(&self) -> Result<()> {
        self.sender
            .send(WorkerMessage::Shutdown)
            .map_err(|_| RsyncTransferError::QueueClosed)
    }
}

/// A running transfer worker
pub struct RsyncService {
    queue: TransferQueue,
    state: StateHandle,
    done: Receiver<Result<WorkerSummary>>,
    handle: JoinHandle<()>,
    log: Arc<dyn TransferLog>,
}

impl RsyncService {
    /// Start the worker thread
    pub fn start(
        config: TransferConfig,
        runner: Arc<dyn CommandRunner>,
        log: Arc<dyn TransferLog>,
    ) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let (done_tx, done_rx) = bounded(1);

        let executor = TransferExecutor::new(runner, log.clone());
        let worker = TransferWorker::new(config, receiver, executor);
        let state = worker.state_handle();

        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let _ = done_tx.send(worker.run());
            })
            .map_err(RsyncTransferError::WorkerSpawn)?;

        log.debug(&format!("Started {} thread", WORKER_THREAD_NAME));

        Ok(Self {
            queue: TransferQueue { sender },
            state,
            done: done_rx,
            handle,
            log,
        })
    }

    /// A producer handle for the queue
    pub fn queue(&self) -> TransferQueue {
        self.queue.clone()
    }

    /// Ask the worker to transfer `path`
    pub fn enqueue(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.queue.enqueue(path)
    }

    /// The worker's current state
    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// True until the worker thread has returned
    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Ask the worker to stop and wait up to `timeout` for it
    ///
    /// Requests queued ahead of the shutdown message are still processed.
    /// On timeout the thread is left running detached. If the worker had
    /// already stopped on an error, that error is returned.
    pub fn stop(self, timeout: Duration) -> Result<WorkerSummary> {
        // a closed queue means the worker already exited; its result is waiting
        let _ = self.queue.shutdown();

        match self.done.recv_timeout(timeout) {
            Ok(result) => {
                if self.handle.join().is_err() {
                    return Err(RsyncTransferError::WorkerPanicked);
                }
                self.log
                    .debug(&format!("Shut down {} thread", WORKER_THREAD_NAME));
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                self.log
                    .error(&format!("Unable to shut down {} thread", WORKER_THREAD_NAME));
                Err(RsyncTransferError::ShutdownTimeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.log.critical(&format!("{} thread panicked", WORKER_THREAD_NAME));
                Err(RsyncTransferError::WorkerPanicked)
            }
        }
    }
}

impl std::fmt::Debug for RsyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsyncService")
            .field("state", &self.state())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}
