//! Reads rsync's output into a [`TransferOutcome`]
//!
//! rsync has no machine-readable result beyond its exit code, so this
//! matches on the human-readable text it prints. That text depends on the
//! rsync version and locale; a change there shows up as an
//! [`TransferOutcome::UnknownFailure`] carrying the raw output.

use super::{FailureCategory, TransferOutcome, TransferStats};
use std::collections::HashMap;
use std::time::Duration;

/// Marker rsync prints in front of every fatal error
pub const ERROR_MARKER: &str = "rsync error:";

const FILES_KEY: &str = "Number of regular files transferred";
const FILES_FALLBACK_KEY: &str = "Number of files transferred";
const BYTES_KEY: &str = "Total transferred file size";

/// One classification rule: all substrings present selects the category
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    /// Substrings that must all appear
    pub required: &'static [&'static str],
    /// Category selected
    pub category: FailureCategory,
}

impl ClassificationRule {
    /// True when every required substring is in `text`
    pub fn matches(&self, text: &str) -> bool {
        self.required.iter().all(|needle| text.contains(needle))
    }
}

/// Rules in priority order; the first match wins
pub const RULES: &[ClassificationRule] = &[
    ClassificationRule {
        required: &["code 1)"],
        category: FailureCategory::Syntax,
    },
    ClassificationRule {
        required: &["code 23", "Read-only file system"],
        category: FailureCategory::ReadOnlyFilesystem,
    },
    ClassificationRule {
        required: &["code 23", "link_stat"],
        category: FailureCategory::LocalPathMissing,
    },
    ClassificationRule {
        required: &["code 11"],
        category: FailureCategory::DestinationMissing,
    },
    ClassificationRule {
        required: &["code 12", "Permission denied"],
        category: FailureCategory::AuthFailure,
    },
    ClassificationRule {
        required: &["code 12", "No route to host"],
        category: FailureCategory::NetworkUnreachable,
    },
];

/// Classify rsync's combined output
///
/// `local_spec` names the transfer's sources and only appears in the
/// detail of a [`FailureCategory::LocalPathMissing`] failure.
pub fn classify(output: &str, local_spec: &str, elapsed: Duration) -> TransferOutcome {
    if !output.contains(ERROR_MARKER) {
        return TransferOutcome::Success {
            stats: parse_stats(output),
            elapsed,
        };
    }

    let collapsed = collapse_output(output);

    match RULES.iter().find(|rule| rule.matches(&collapsed)) {
        Some(rule) => TransferOutcome::KnownFailure {
            category: rule.category,
            detail: remedy(rule.category, local_spec),
            elapsed,
        },
        None => TransferOutcome::UnknownFailure {
            raw_output: collapsed,
            elapsed,
        },
    }
}

/// What to check for each failure kind
pub fn remedy(category: FailureCategory, local_spec: &str) -> String {
    match category {
        FailureCategory::Syntax => "syntax error in rsync command, check rsync_options".to_string(),
        FailureCategory::ReadOnlyFilesystem => "Read only file system at the destination".to_string(),
        FailureCategory::LocalPathMissing => format!("rsync code 23: is {} correct?", local_spec),
        FailureCategory::DestinationMissing => "destination directory is missing".to_string(),
        FailureCategory::AuthFailure => {
            "Permission error in rsync command, probably remote authentication".to_string()
        }
        FailureCategory::NetworkUnreachable => "No route to host error in rsync command".to_string(),
    }
}

/// Split `key: value` lines into a map, trimming both sides
pub fn parse_stats_lines(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Files and bytes transferred, when both are present
pub fn parse_stats(output: &str) -> Option<TransferStats> {
    let info = parse_stats_lines(output);

    let files = info
        .get(FILES_KEY)
        .or_else(|| info.get(FILES_FALLBACK_KEY))?;
    let bytes = info.get(BYTES_KEY)?;

    Some(TransferStats {
        files_transferred: files.clone(),
        total_size: bytes.clone(),
    })
}

/// Output on one line: `\n` becomes `. ` and `\r` is dropped
pub fn collapse_output(output: &str) -> String {
    output.trim().replace('\r', "").replace('\n', ". ")
}
