//! rsync command construction
//!
//! Pure mapping from a [`TransferConfig`] to the argument vectors for
//! `rsync` and for the `mkdir` / `ssh mkdir` used to create a missing
//! destination. Nothing here touches the filesystem or the clock; the date
//! for dated remote directories is passed in.

use crate::config::{normalize_remote_path, TransferConfig};
use chrono::NaiveDate;
use std::fmt;
use std::path::Path;
use std::process::Command;

/// Path separator appended to single report sources
const SEPARATOR: char = '/';

/// A program and its arguments, ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name
    pub program: String,
    /// Arguments in order
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a spec with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build a `std::process::Command` for this spec
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg.replace('\'', r"'\''"))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// An rsync invocation plus what it targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCommand {
    /// The rsync command
    pub command: CommandSpec,
    /// Source arguments, as passed to rsync
    pub sources: Vec<String>,
    /// Destination argument (`user@host:path`, `host:path` or a local path)
    pub remote_spec: String,
    /// Destination directory, created on demand when rsync reports it missing
    pub remote_dir: String,
    /// Command creating `remote_dir`
    pub mkdir: CommandSpec,
    /// Adjustments made while building that should be logged
    pub warnings: Vec<String>,
}

impl BuiltCommand {
    /// Sources joined the way they were configured
    pub fn local_spec(&self) -> String {
        self.sources.join(" ")
    }
}

/// Where a transfer lands
#[derive(Debug, Clone, PartialEq, Eq)]
struct Destination {
    spec: String,
    dir: String,
    warning: Option<String>,
}

/// Builds rsync, mkdir and ssh commands from a transfer config
#[derive(Debug, Clone)]
pub struct CommandBuilder<'a> {
    config: &'a TransferConfig,
    date: Option<NaiveDate>,
}

impl<'a> CommandBuilder<'a> {
    /// Create a builder; dated directories stay off until a date is given
    pub fn new(config: &'a TransferConfig) -> Self {
        Self { config, date: None }
    }

    /// Use `date` for the dated remote directory, if enabled
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Builder dated with the local calendar day when `dated_dir` is set
    pub fn for_today(config: &'a TransferConfig) -> Self {
        let builder = Self::new(config);
        if config.dated_dir {
            builder.with_date(chrono::Local::now().date_naive())
        } else {
            builder
        }
    }

    fn date_suffix(&self) -> Option<String> {
        match (self.config.dated_dir, self.date) {
            (true, Some(date)) => Some(date.format("/%Y/%m/%d/").to_string()),
            _ => None,
        }
    }

    fn destination(&self) -> Destination {
        let remote_path = self.config.remote_path.trim();
        let server = self.config.server.trim();

        let dir = match self.date_suffix() {
            Some(suffix) => format!("{}{}", remote_path.trim_end_matches(SEPARATOR), suffix),
            None => remote_path.to_string(),
        };

        if self.config.is_local() {
            if normalize_remote_path(remote_path) == "/" {
                let redirected = format!("/tmp/{}/", server);
                return Destination {
                    spec: redirected.clone(),
                    dir: redirected.clone(),
                    warning: Some(format!(
                        "Attempting to write files to {} redirecting to {}",
                        remote_path, redirected
                    )),
                };
            }
            return Destination {
                spec: dir.clone(),
                dir,
                warning: None,
            };
        }

        let spec = match self.config.user_name() {
            Some(user) => format!("{}@{}:{}", user.trim(), server, dir),
            None => format!("{}:{}", server, dir),
        };

        Destination {
            spec,
            dir,
            warning: None,
        }
    }

    /// The `-e` transport string: `ssh [-p PORT] [-o ConnectTimeout=N] [options]`
    pub fn ssh_transport(&self) -> String {
        let mut transport = String::from("ssh");
        for arg in self.ssh_connect_args() {
            transport.push(' ');
            transport.push_str(&arg);
        }
        if let Some(options) = self.config.ssh_option_string() {
            transport.push(' ');
            transport.push_str(options.trim());
        }
        transport
    }

    /// Port and connect timeout flags shared by every ssh invocation
    fn ssh_connect_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(port) = self.config.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(timeout) = self.config.ssh_timeout {
            args.push("-o".to_string());
            args.push(format!("ConnectTimeout={}", timeout));
        }
        args
    }

    fn rsync_base(&self) -> CommandSpec {
        let mut cmd = CommandSpec::new("rsync")
            .arg("--archive")
            .args(self.config.rsync_option_args())
            .arg("--stats");

        if self.config.delete {
            cmd = cmd.arg("--delete");
        }
        if self.config.compress {
            cmd = cmd.arg("--compress");
        }

        // 0 is rsync's own "no timeout"
        cmd = cmd.arg(format!("--timeout={}", self.config.rsync_timeout.unwrap_or(0)));

        if !self.config.is_local() {
            cmd = cmd.arg("-e").arg(self.ssh_transport());
        }
        cmd
    }

    fn finish(&self, sources: Vec<String>) -> BuiltCommand {
        let destination = self.destination();
        let command = self
            .rsync_base()
            .args(sources.iter().cloned())
            .arg(destination.spec.clone());

        BuiltCommand {
            command,
            sources,
            mkdir: self.mkdir_command(&destination.dir),
            remote_spec: destination.spec,
            remote_dir: destination.dir,
            warnings: destination.warning.into_iter().collect(),
        }
    }

    /// Command transferring one file, as the worker does
    pub fn file_command(&self, file: &Path) -> BuiltCommand {
        self.finish(vec![file.to_string_lossy().into_owned()])
    }

    /// Command transferring the report root(s)
    ///
    /// Several space separated roots become separate source arguments and
    /// are used as entered. A single root gets a trailing separator so
    /// rsync copies the directory's contents rather than the directory.
    pub fn report_command(&self, local_root: &str) -> BuiltCommand {
        let roots: Vec<&str> = local_root.split_whitespace().collect();

        let sources = if roots.len() > 1 {
            roots.into_iter().map(str::to_string).collect()
        } else {
            let root = roots.first().copied().unwrap_or_default();
            if root.ends_with(SEPARATOR) {
                vec![root.to_string()]
            } else {
                vec![format!("{}{}", root, SEPARATOR)]
            }
        };

        self.finish(sources)
    }

    /// Command creating `dir` at the destination
    pub fn mkdir_command(&self, dir: &str) -> CommandSpec {
        if self.config.is_local() {
            return CommandSpec::new("mkdir").arg("-p").arg(dir);
        }

        let mut cmd = CommandSpec::new("ssh").args(self.ssh_connect_args());
        if let Some(options) = self.config.ssh_option_string() {
            cmd = cmd.args(options.split_whitespace());
        }
        let login = match self.config.user_name() {
            Some(user) => format!("{}@{}", user.trim(), self.config.server.trim()),
            None => self.config.server.trim().to_string(),
        };
        cmd.arg(login).arg("mkdir").arg("-p").arg(dir)
    }
}
