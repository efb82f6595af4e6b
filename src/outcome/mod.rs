//! Transfer outcomes
//!
//! What one rsync invocation amounted to, and the rules that read it from
//! rsync's output.

mod classifier;

pub use classifier::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Files and bytes moved, verbatim from rsync's `--stats` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    /// e.g. `126`
    pub files_transferred: String,
    /// e.g. `1,854,920 bytes`
    pub total_size: String,
}

/// Known rsync failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// rsync exit code 1, bad command line
    Syntax,
    /// Destination filesystem is mounted read-only
    ReadOnlyFilesystem,
    /// A local source path does not exist
    LocalPathMissing,
    /// Destination directory does not exist
    DestinationMissing,
    /// ssh authentication failed
    AuthFailure,
    /// Destination host unreachable
    NetworkUnreachable,
}

impl FailureCategory {
    /// rsync exit code the category is reported under
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Syntax => 1,
            Self::ReadOnlyFilesystem | Self::LocalPathMissing => 23,
            Self::DestinationMissing => 11,
            Self::AuthFailure | Self::NetworkUnreachable => 12,
        }
    }

    /// Short name for summaries
    pub fn label(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax error",
            Self::ReadOnlyFilesystem => "read-only",
            Self::LocalPathMissing => "link_stat",
            Self::DestinationMissing => "destination missing",
            Self::AuthFailure => "permission denied",
            Self::NetworkUnreachable => "no route to host",
        }
    }
}

/// Result of one transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// rsync reported no error
    Success {
        /// Parsed statistics, when the stats block was complete
        stats: Option<TransferStats>,
        /// Wall-clock time of the invocation
        elapsed: Duration,
    },
    /// The destination was missing and has been created
    DirectoriesBuilt {
        /// Directory that was created
        remote_dir: String,
        /// Wall-clock time including the mkdir
        elapsed: Duration,
    },
    /// rsync failed in a recognized way
    KnownFailure {
        /// Failure kind
        category: FailureCategory,
        /// What to check to fix it
        detail: String,
        /// Wall-clock time of the invocation
        elapsed: Duration,
    },
    /// rsync failed in some other way
    UnknownFailure {
        /// rsync's output with line breaks collapsed
        raw_output: String,
        /// Wall-clock time of the invocation
        elapsed: Duration,
    },
}

impl TransferOutcome {
    /// True for the two success variants
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::DirectoriesBuilt { .. })
    }

    /// Failure category, if this is a known failure
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            Self::KnownFailure { category, .. } => Some(*category),
            _ => None,
        }
    }

    /// Wall-clock time of the invocation
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Success { elapsed, .. }
            | Self::DirectoriesBuilt { elapsed, .. }
            | Self::KnownFailure { elapsed, .. }
            | Self::UnknownFailure { elapsed, .. } => *elapsed,
        }
    }

    /// Same outcome with a different elapsed time
    pub fn with_elapsed(mut self, duration: Duration) -> Self {
        match &mut self {
            Self::Success { elapsed, .. }
            | Self::DirectoriesBuilt { elapsed, .. }
            | Self::KnownFailure { elapsed, .. }
            | Self::UnknownFailure { elapsed, .. } => *elapsed = duration,
        }
        self
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.elapsed().as_secs_f64();
        match self {
            Self::Success {
                stats: Some(stats), ..
            } => write!(
                f,
                "rsync'd {} files ({}) in {:.2} seconds",
                stats.files_transferred, stats.total_size, secs
            ),
            Self::Success { stats: None, .. } => {
                write!(f, "rsync executed in {:.2} seconds", secs)
            }
            Self::DirectoriesBuilt { .. } => write!(
                f,
                "rsync executed in {:.2} seconds, built destination (remote) directories",
                secs
            ),
            Self::KnownFailure { category, .. } => write!(
                f,
                "code {}, {}, rsync failed, executed in {:.2} seconds",
                category.exit_code(),
                category.label(),
                secs
            ),
            Self::UnknownFailure { raw_output, .. } => write!(
                f,
                "rsync failed after {:.2} seconds: {}",
                secs, raw_output
            ),
        }
    }
}
