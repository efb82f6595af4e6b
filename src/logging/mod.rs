//! Logging capability injected into transfers
//!
//! The worker and the report sync never reach for a global logger. They
//! are handed a [`TransferLog`] at construction; the binary passes a
//! [`TracingLog`], tests and embedding hosts can pass a [`MemoryLog`].

use std::sync::{Arc, Mutex};

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Verbose diagnostics
    Debug,
    /// Normal operation
    Info,
    /// Something was adjusted to avoid damage
    Warn,
    /// A transfer failed
    Error,
    /// The worker cannot continue
    Critical,
}

/// Sink for transfer log messages
pub trait TransferLog: Send + Sync {
    /// Write one message at `level`
    fn log(&self, level: LogLevel, message: &str);

    /// Verbose diagnostics
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Normal operation
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Recoverable problem
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Failed transfer
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Fatal to the worker
    fn critical(&self, message: &str) {
        self.log(LogLevel::Critical, message);
    }
}

impl<T: TransferLog + ?Sized> TransferLog for Arc<T> {
    fn log(&self, level: LogLevel, message: &str) {
        (**self).log(level, message);
    }
}

/// Forwards messages to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl TransferLog for TracingLog {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "rsync_transfer", "{}", message),
            LogLevel::Info => tracing::info!(target: "rsync_transfer", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "rsync_transfer", "{}", message),
            LogLevel::Error => tracing::error!(target: "rsync_transfer", "{}", message),
            LogLevel::Critical => {
                tracing::error!(target: "rsync_transfer", critical = true, "{}", message)
            }
        }
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries so far
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.lock().clone()
    }

    /// Messages logged at exactly `level`
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// True if any message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|(_, m)| m.contains(needle))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(LogLevel, String)>> {
        // a panic while holding the lock leaves the entries usable
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TransferLog for MemoryLog {
    fn log(&self, level: LogLevel, message: &str) {
        self.lock().push((level, message.to_string()));
    }
}
