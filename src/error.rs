//! Error types for rsync-transfer
//!
//! Only a handful of failures ever leave the library: configuration
//! problems, a subprocess that cannot be launched, and worker lifecycle
//! errors. Classified rsync failures are not errors here, they are
//! [`TransferOutcome`](crate::outcome::TransferOutcome) values.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for rsync-transfer operations
#[derive(Error, Debug)]
pub enum RsyncTransferError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration file '{path}': {source}")]
    ConfigParse {
        /// Configuration file path
        path: PathBuf,
        /// TOML parser error
        #[source]
        source: toml::de::Error,
    },

    /// An external program (rsync, ssh, mkdir) could not be started
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        /// Program name
        program: String,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// The transfer worker is no longer accepting requests
    #[error("Transfer queue is closed, the worker has stopped")]
    QueueClosed,

    /// The worker thread could not be spawned
    #[error("Failed to spawn transfer worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// The worker thread panicked
    #[error("Transfer worker panicked")]
    WorkerPanicked,

    /// The worker did not stop within the allowed wait
    #[error("Transfer worker did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}

impl RsyncTransferError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a launch error for `program`
    pub fn launch(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Launch {
            program: program.into(),
            source,
        }
    }

    /// True when the failure means the program is not installed
    pub fn is_missing_program(&self) -> bool {
        match self {
            Self::Launch { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias for rsync-transfer operations
pub type Result<T> = std::result::Result<T, RsyncTransferError>;

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| RsyncTransferError::io(path, e))
    }
}
