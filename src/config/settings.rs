//! Configuration settings for rsync-transfer
//!
//! Defines the CLI arguments, the on-disk configuration file and the
//! typed transfer settings shared by the worker and the report sync.

use crate::error::{IoResultExt, Result, RsyncTransferError};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server name that selects a local (non-ssh) transfer
pub const LOCALHOST: &str = "localhost";

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/weewx/rsynctransfer.toml";

/// rsynctransfer - push weather station reports and files with rsync
#[derive(Parser, Debug, Clone)]
#[command(name = "rsynctransfer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Transfer generated reports and files to a local or remote destination via rsync")]
#[command(long_about = r#"
rsynctransfer pushes generated report directories, or individual files, to a
local or remote destination using the system rsync binary.

Examples:
  rsynctransfer report                         # Sync the configured report root
  rsynctransfer report --dry-run               # Show the rsync command only
  rsynctransfer queue /var/www/html/now.json   # Push single files via the worker
  find /var/www -newer stamp | rsynctransfer queue
"#)]
pub struct CliArgs {
    /// Configuration file (TOML)
    #[arg(
        short = 'c',
        long,
        env = "RSYNCTRANSFER_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        value_name = "PATH"
    )]
    pub config: PathBuf,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sync the report directories once, as a report cycle would
    #[command(name = "report")]
    Report {
        /// Override the configured local root (space separated for several)
        #[arg(long, value_name = "PATHS")]
        local_root: Option<String>,
        /// Print the rsync command instead of running it
        #[arg(short = 'n', long)]
        dry_run: bool,
        /// Output format for the transfer summary
        #[arg(long, value_enum, default_value = "text")]
        output_format: OutputFormat,
    },

    /// Push individual files through the background transfer worker
    #[command(name = "queue")]
    Queue {
        /// How long to wait for the worker to drain and stop
        #[arg(long, default_value = "20s", value_parser = humantime::parse_duration)]
        stop_timeout: Duration,
        /// Files to transfer; read newline separated from stdin when empty
        #[arg(value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Print the rsync command a transfer would run
    #[command(name = "command")]
    Command {
        /// Show the single-file worker command for this file
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
}

/// Output format for transfer summaries
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Settings for one rsync destination
///
/// Used as-is by the transfer worker and, with a `local_root`, by the
/// report sync. All values are plain scalars; blank optional strings are
/// treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    /// Run transfers at all
    ///
    /// On by default, except in the `[RsyncThread]` table where the worker
    /// stays off unless `enable = true` is given.
    pub enable: bool,
    /// Remote host, or `localhost` for a local copy
    pub server: String,
    /// Remote login name
    pub user: Option<String>,
    /// ssh port
    pub port: Option<u16>,
    /// Destination directory
    pub remote_path: String,
    /// Local directories to sync (report sync only)
    pub local_root: Option<String>,
    /// Delete remote files that no longer exist locally
    pub delete: bool,
    /// Compress file data during the transfer
    pub compress: bool,
    /// Extra rsync flags, whitespace separated
    pub rsync_options: Option<String>,
    /// Extra ssh arguments appended to the `-e` transport string
    pub ssh_options: Option<String>,
    /// ssh ConnectTimeout in seconds
    pub ssh_timeout: Option<u64>,
    /// rsync I/O timeout in seconds (unset means no timeout)
    pub rsync_timeout: Option<u64>,
    /// Append a `/YYYY/MM/DD/` directory to the remote path
    pub dated_dir: bool,
    /// Log the outcome of each transfer
    pub log_success: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            enable: true,
            server: String::new(),
            user: None,
            port: None,
            remote_path: String::new(),
            local_root: None,
            delete: false,
            compress: false,
            rsync_options: None,
            ssh_options: None,
            ssh_timeout: None,
            rsync_timeout: None,
            dated_dir: false,
            log_success: true,
        }
    }
}

impl TransferConfig {
    /// Create a config for `server` and `remote_path` with defaults elsewhere
    pub fn new(server: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            remote_path: remote_path.into(),
            ..Default::default()
        }
    }

    /// True when the destination is on this machine
    pub fn is_local(&self) -> bool {
        self.server.trim() == LOCALHOST
    }

    /// Login name, if one is configured and not blank
    pub fn user_name(&self) -> Option<&str> {
        non_blank(self.user.as_deref())
    }

    /// Extra rsync flags as separate arguments
    pub fn rsync_option_args(&self) -> Vec<&str> {
        non_blank(self.rsync_options.as_deref())
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Extra ssh arguments, if configured
    pub fn ssh_option_string(&self) -> Option<&str> {
        non_blank(self.ssh_options.as_deref())
    }

    /// Check the fields a command cannot be built without
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(RsyncTransferError::config("'server' must be set"));
        }
        if self.remote_path.trim().is_empty() {
            return Err(RsyncTransferError::config("'remote_path' must be set"));
        }
        if self.server.trim().contains(char::is_whitespace) {
            return Err(RsyncTransferError::config(format!(
                "'server' must be a single host name, got '{}'",
                self.server
            )));
        }
        Ok(())
    }
}

/// Validated settings for the report (bulk) sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Destination settings
    pub transfer: TransferConfig,
    /// One or more space separated local directories
    pub local_root: String,
}

impl ReportConfig {
    /// Build from a transfer config, requiring a local root
    pub fn from_transfer(transfer: TransferConfig) -> Result<Self> {
        transfer.validate()?;
        let local_root = non_blank(transfer.local_root.as_deref())
            .ok_or_else(|| RsyncTransferError::config("'local_root' must be set for report sync"))?
            .trim()
            .to_string();

        Ok(Self {
            transfer,
            local_root,
        })
    }

    /// The local roots as individual paths
    pub fn sources(&self) -> Vec<&str> {
        self.local_root.split_whitespace().collect()
    }
}

/// The configuration file, mirroring the host engine's section names
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Queue-driven worker settings
    #[serde(rename = "RsyncThread", default, deserialize_with = "worker_table")]
    pub thread: Option<TransferConfig>,
    /// Report sync settings
    #[serde(rename = "Rsynctransfer")]
    pub report: Option<TransferConfig>,
}

impl ConfigFile {
    /// Load and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_path(path)?;
        Self::parse(&text, path)
    }

    /// Parse configuration text; `origin` is used in error messages
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| RsyncTransferError::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Validated worker settings, with the remote path normalized
    pub fn worker_config(&self) -> Result<TransferConfig> {
        let mut config = self
            .thread
            .clone()
            .ok_or_else(|| RsyncTransferError::config("missing [RsyncThread] section"))?;
        config.validate()?;
        config.remote_path = normalize_remote_path(config.remote_path.trim());
        Ok(config)
    }

    /// Validated report sync settings
    pub fn report_config(&self) -> Result<ReportConfig> {
        let config = self
            .report
            .clone()
            .ok_or_else(|| RsyncTransferError::config("missing [Rsynctransfer] section"))?;
        ReportConfig::from_transfer(config)
    }
}

/// Deserialize the worker table with `enable` defaulting to false
fn worker_table<'de, D>(deserializer: D) -> std::result::Result<Option<TransferConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(mut table) = Option::<toml::Table>::deserialize(deserializer)? else {
        return Ok(None);
    };
    table
        .entry("enable")
        .or_insert(toml::Value::Boolean(false));

    toml::Value::Table(table)
        .try_into()
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Lexically normalize a remote path
///
/// Collapses repeated separators, drops `.` segments and trailing
/// separators, and resolves `..` where possible. The remote filesystem is
/// never consulted.
pub fn normalize_remote_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
