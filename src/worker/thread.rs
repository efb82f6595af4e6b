//! The queue-driven transfer worker
//!
//! One worker owns the receiving end of the queue and is the only thing
//! that runs rsync for it, so at most one transfer is in flight. When the
//! queue backs up the worker drops older requests in favour of newer ones.

use crate::command::CommandBuilder;
use crate::config::TransferConfig;
use crate::error::Result;
use crate::outcome::TransferOutcome;
use crate::process::TransferExecutor;
use crossbeam::channel::Receiver;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Queue depth above which requests are dropped instead of transferred
pub const BACKLOG_THRESHOLD: usize = 5;

/// A file to transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    path: PathBuf,
}

impl TransferRequest {
    /// Request a transfer of `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File to transfer
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// What travels on the worker queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Transfer a file
    Transfer(TransferRequest),
    /// Stop after the current transfer
    Shutdown,
}

/// Where the worker is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Waiting on the queue
    Idle = 0,
    /// Dropping requests while the backlog is above the threshold
    Draining = 1,
    /// rsync is running
    Dispatching = 2,
    /// Finished; no more requests are taken
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Draining,
            2 => Self::Dispatching,
            _ => Self::Stopped,
        }
    }
}

/// Shared view of a worker's state
#[derive(Debug, Clone)]
pub struct StateHandle(Arc<AtomicU8>);

impl StateHandle {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(WorkerState::Idle as u8)))
    }

    /// Current state
    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Counts kept over a worker's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// rsync invocations
    pub dispatched: u64,
    /// Requests whose file no longer existed
    pub missing: u64,
    /// Requests dropped to shrink the backlog
    pub trimmed: u64,
    /// Requests accepted while transfers were disabled
    pub skipped_disabled: u64,
}

/// Takes requests off the queue and transfers them one at a time
pub struct TransferWorker {
    config: TransferConfig,
    queue: Receiver<WorkerMessage>,
    executor: TransferExecutor,
    state: StateHandle,
}

impl TransferWorker {
    /// Create a worker reading from `queue`
    pub fn new(config: TransferConfig, queue: Receiver<WorkerMessage>, executor: TransferExecutor) -> Self {
        Self {
            config,
            queue,
            executor,
            state: StateHandle::new(),
        }
    }

    /// Handle for observing the state from other threads
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    /// Process requests until the shutdown message arrives
    ///
    /// A queue with no senders left also ends the loop. Returns an error
    /// only when rsync (or the mkdir helper) cannot be launched, after
    /// which the worker is stopped for good.
    pub fn run(self) -> Result<WorkerSummary> {
        let mut summary = WorkerSummary::default();
        let log = self.executor.log();

        while let Some(request) = self.next_request(&mut summary) {
            if !self.config.enable {
                summary.skipped_disabled += 1;
                continue;
            }

            self.state.set(WorkerState::Dispatching);
            if let Err(e) = self.dispatch(&request) {
                log.critical(&format!("Caught exception in transfer worker: {}", e));
                log.critical("Worker exiting.");
                self.state.set(WorkerState::Stopped);
                return Err(e);
            }
            summary.dispatched += 1;
        }

        self.state.set(WorkerState::Stopped);
        log.debug(&format!(
            "transfer worker stopped: {} dispatched, {} missing, {} trimmed",
            summary.dispatched, summary.missing, summary.trimmed
        ));
        Ok(summary)
    }

    /// Block until a request worth transferring arrives
    fn next_request(&self, summary: &mut WorkerSummary) -> Option<TransferRequest> {
        let log = self.executor.log();
        self.state.set(WorkerState::Idle);

        loop {
            let request = match self.queue.recv().ok()? {
                WorkerMessage::Shutdown => return None,
                WorkerMessage::Transfer(request) => request,
            };

            if !request.path().is_file() {
                log.debug(&format!("file spec '{}' skipped", request.path().display()));
                summary.missing += 1;
                continue;
            }

            let backlog = self.queue.len();
            if backlog <= BACKLOG_THRESHOLD {
                return Some(request);
            }

            self.state.set(WorkerState::Draining);
            log.debug(&format!(
                "{} requests queued, dropping '{}'",
                backlog,
                request.path().display()
            ));
            summary.trimmed += 1;
        }
    }

    fn dispatch(&self, request: &TransferRequest) -> Result<TransferOutcome> {
        let built = CommandBuilder::for_today(&self.config).file_command(request.path());
        self.executor
            .log()
            .debug(&format!("rsyncing file: {}", request.path().display()));

        let outcome = self.executor.execute(&built)?;
        self.executor.report(&outcome, &built, self.config.log_success);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RsyncTransferError;
    use crate::logging::{LogLevel, MemoryLog};
    use crate::process::testing::ScriptedRunner;
    use crossbeam::channel::{unbounded, Sender};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        runner: Arc<ScriptedRunner>,
        log: Arc<MemoryLog>,
        sender: Sender<WorkerMessage>,
        worker: TransferWorker,
    }

    fn fixture(runner: ScriptedRunner, config: TransferConfig) -> Fixture {
        let runner = Arc::new(runner);
        let log = Arc::new(MemoryLog::new());
        let (sender, queue) = unbounded();
        let executor = TransferExecutor::new(runner.clone(), log.clone());

        Fixture {
            dir: TempDir::new().unwrap(),
            runner,
            log,
            sender,
            worker: TransferWorker::new(config, queue, executor),
        }
    }

    fn config() -> TransferConfig {
        TransferConfig {
            user: Some("weewx".to_string()),
            ..TransferConfig::new("backup.example.com", "/srv/mirror")
        }
    }

    impl Fixture {
        fn file(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, name).unwrap();
            path
        }

        fn send(&self, path: &Path) {
            self.sender
                .send(WorkerMessage::Transfer(TransferRequest::new(path)))
                .unwrap();
        }

        fn shutdown(&self) {
            self.sender.send(WorkerMessage::Shutdown).unwrap();
        }
    }

    /// File names handed to rsync, in call order
    fn transferred(runner: &ScriptedRunner) -> Vec<String> {
        runner
            .calls_to("rsync")
            .iter()
            .map(|call| {
                // source is second to last, destination last
                let source = &call.args[call.args.len() - 2];
                Path::new(source)
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    fn names(range: std::ops::RangeInclusive<u32>) -> Vec<String> {
        range.map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_backlog_favours_most_recent() {
        let fx = fixture(ScriptedRunner::new(), config());
        for name in names(1..=7) {
            let file = fx.file(&name);
            fx.send(&file);
        }
        drop(fx.sender);

        let summary = fx.worker.run().unwrap();

        // f1 arrives with six behind it and is dropped; f2 leaves five
        assert_eq!(summary.trimmed, 1);
        assert_eq!(summary.dispatched, 6);
        assert_eq!(transferred(&fx.runner), names(2..=7));
    }

    #[test]
    fn test_backlog_counts_shutdown_message() {
        let fx = fixture(ScriptedRunner::new(), config());
        for name in names(1..=7) {
            let file = fx.file(&name);
            fx.send(&file);
        }
        fx.shutdown();

        let summary = fx.worker.run().unwrap();

        assert_eq!(summary.trimmed, 2);
        assert_eq!(summary.dispatched, 5);
        assert_eq!(transferred(&fx.runner), names(3..=7));
    }

    #[test]
    fn test_shutdown_leaves_later_requests() {
        let fx = fixture(ScriptedRunner::new(), config());
        let a = fx.file("a");
        let b = fx.file("b");
        fx.send(&a);
        fx.shutdown();
        fx.send(&b);

        let state = fx.worker.state_handle();
        let summary = fx.worker.run().unwrap();

        assert_eq!(summary.dispatched, 1);
        assert_eq!(state.get(), WorkerState::Stopped);
        assert_eq!(transferred(&fx.runner), vec!["a"]);
        // b never left the queue
        assert_eq!(fx.sender.len(), 1);
    }

    #[test]
    fn test_missing_file_is_dropped() {
        let fx = fixture(ScriptedRunner::new(), config());
        let present = fx.file("present");
        fx.send(&fx.dir.path().join("vanished"));
        fx.send(&present);
        fx.send(fx.dir.path());
        fx.shutdown();

        let summary = fx.worker.run().unwrap();

        assert_eq!(summary.missing, 2);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(fx.runner.calls().len(), 1);
        assert_eq!(transferred(&fx.runner), vec!["present"]);
        assert!(fx.log.contains("vanished' skipped"));
    }

    #[test]
    fn test_disabled_worker_never_runs_rsync() {
        let mut cfg = config();
        cfg.enable = false;
        let fx = fixture(ScriptedRunner::new(), cfg);
        let a = fx.file("a");
        fx.send(&a);
        fx.send(&a);
        fx.shutdown();

        let summary = fx.worker.run().unwrap();

        assert_eq!(summary.skipped_disabled, 2);
        assert_eq!(summary.dispatched, 0);
        assert!(fx.runner.calls().is_empty());
    }

    #[test]
    fn test_missing_rsync_stops_worker() {
        let fx = fixture(ScriptedRunner::new().missing("rsync"), config());
        let a = fx.file("a");
        let b = fx.file("b");
        fx.send(&a);
        fx.send(&b);

        let state = fx.worker.state_handle();
        let err = fx.worker.run().unwrap_err();

        assert!(matches!(err, RsyncTransferError::Launch { .. }));
        assert_eq!(state.get(), WorkerState::Stopped);
        assert_eq!(fx.runner.calls().len(), 1);
        assert_eq!(fx.log.messages_at(LogLevel::Critical).len(), 2);
    }

    #[test]
    fn test_classified_failures_are_not_fatal() {
        let output = "ssh: connect to host backup.example.com port 22: No route to host\n\
                      rsync error: error in rsync protocol data stream (code 12) at io.c(226)\n";
        let fx = fixture(ScriptedRunner::new().respond("rsync", 12, output), config());
        let a = fx.file("a");
        let b = fx.file("b");
        fx.send(&a);
        fx.send(&b);
        fx.shutdown();

        let summary = fx.worker.run().unwrap();

        assert_eq!(summary.dispatched, 2);
        assert_eq!(transferred(&fx.runner), vec!["a", "b"]);
    }

    #[test]
    fn test_code_11_issues_one_mkdir() {
        let output = "rsync error: error in file IO (code 11) at main.c(674) [Receiver=3.1.2]\n";
        let fx = fixture(ScriptedRunner::new().respond("rsync", 11, output), config());
        let a = fx.file("a");
        fx.send(&a);
        fx.shutdown();

        fx.worker.run().unwrap();

        assert_eq!(fx.runner.calls_to("ssh").len(), 1);
        assert!(fx.log.contains("built destination (remote) directories"));
    }

    #[test]
    fn test_disconnected_queue_stops_worker() {
        let fx = fixture(ScriptedRunner::new(), config());
        drop(fx.sender);
        assert_eq!(fx.worker.run().unwrap(), WorkerSummary::default());
    }
}
