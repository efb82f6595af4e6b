//! # rsync-transfer - Report and File Transfer via rsync
//!
//! Pushes the output of a weather station report engine to a local or
//! remote destination using the system `rsync` binary.
//!
//! ## Features
//!
//! - **Report Sync**: One rsync run per report cycle over the whole report tree
//! - **Background Worker**: Queue-driven single file transfers on their own thread
//! - **Backlog Trimming**: A slow link drops stale files instead of falling behind
//! - **Outcome Classification**: Common rsync failures mapped to remedies
//! - **Self Repair**: Missing destination directories are created on demand
//! - **Dated Directories**: Optional `YYYY/MM/DD` remote layout
//!
//! ## Report Sync
//!
//! ```no_run
//! use rsync_transfer::config::{ReportConfig, TransferConfig};
//! use rsync_transfer::logging::TracingLog;
//! use rsync_transfer::process::SystemRunner;
//! use rsync_transfer::report::ReportSync;
//! use std::sync::Arc;
//!
//! let config = ReportConfig::from_transfer(TransferConfig {
//!     user: Some("weewx".into()),
//!     local_root: Some("/var/www/html/weewx".into()),
//!     ..TransferConfig::new("backup.example.com", "/srv/www/weather")
//! })
//! .unwrap();
//!
//! let sync = ReportSync::new(config, Arc::new(SystemRunner), Arc::new(TracingLog));
//! if let Some(outcome) = sync.run().unwrap() {
//!     println!("{}", outcome);
//! }
//! ```
//!
//! ## Background Worker
//!
//! ```no_run
//! use rsync_transfer::config::TransferConfig;
//! use rsync_transfer::logging::TracingLog;
//! use rsync_transfer::process::SystemRunner;
//! use rsync_transfer::worker::{RsyncService, DEFAULT_STOP_TIMEOUT};
//! use std::sync::Arc;
//!
//! let config = TransferConfig::new("backup.example.com", "/srv/www/weather");
//! let service = RsyncService::start(config, Arc::new(SystemRunner), Arc::new(TracingLog)).unwrap();
//!
//! service.enqueue("/var/www/html/weewx/now.json").unwrap();
//! let summary = service.stop(DEFAULT_STOP_TIMEOUT).unwrap();
//! println!("{} files sent", summary.dispatched);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod outcome;
pub mod process;
pub mod report;
pub mod worker;

// Re-export commonly used types
pub use config::{ConfigFile, ReportConfig, TransferConfig};
pub use error::{Result, RsyncTransferError};
pub use outcome::TransferOutcome;
pub use report::ReportSync;
pub use worker::{RsyncService, TransferQueue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use rsync_transfer::prelude::*;
    //! ```

    pub use crate::command::{BuiltCommand, CommandBuilder, CommandSpec};
    pub use crate::config::{ConfigFile, ReportConfig, TransferConfig};
    pub use crate::error::{Result, RsyncTransferError};
    pub use crate::logging::{LogLevel, MemoryLog, TracingLog, TransferLog};
    pub use crate::outcome::{classify, FailureCategory, TransferOutcome, TransferStats};
    pub use crate::process::{CommandOutput, CommandRunner, SystemRunner, TransferExecutor};
    pub use crate::report::ReportSync;
    pub use crate::worker::{RsyncService, TransferQueue, WorkerState, WorkerSummary};
}
