//! Running one transfer end to end
//!
//! Launches the built rsync command, classifies what it printed and, when
//! the destination directory was missing, creates it.

use super::{CommandOutput, CommandRunner};
use crate::command::{BuiltCommand, CommandSpec};
use crate::error::{Result, RsyncTransferError};
use crate::logging::TransferLog;
use crate::outcome::{classify, collapse_output, FailureCategory, TransferOutcome};
use std::io;
use std::sync::Arc;
use std::time::Instant;

/// Runs built rsync commands and interprets the result
#[derive(Clone)]
pub struct TransferExecutor {
    runner: Arc<dyn CommandRunner>,
    log: Arc<dyn TransferLog>,
}

impl TransferExecutor {
    /// Create an executor
    pub fn new(runner: Arc<dyn CommandRunner>, log: Arc<dyn TransferLog>) -> Self {
        Self { runner, log }
    }

    /// The log this executor writes to
    pub fn log(&self) -> &dyn TransferLog {
        self.log.as_ref()
    }

    /// Run one transfer
    ///
    /// Only a failure to launch rsync, mkdir or ssh is an error. Every
    /// rsync failure is returned as an outcome and already logged.
    pub fn execute(&self, built: &BuiltCommand) -> Result<TransferOutcome> {
        for warning in &built.warnings {
            self.log.warn(warning);
        }

        let start = Instant::now();
        self.log.debug(&format!("rsync command: {}", built.command));

        let output = self.launch(&built.command)?;

        let outcome = classify(&output.text, &built.local_spec(), start.elapsed());

        match &outcome {
            TransferOutcome::KnownFailure {
                category: FailureCategory::DestinationMissing,
                ..
            } => self.build_destination(built, start),
            TransferOutcome::KnownFailure {
                category, detail, ..
            } => {
                self.log.debug(&format!(
                    "rsync code {}: {}",
                    category.exit_code(),
                    collapse_output(&output.text)
                ));
                self.log.error(&format!("ERR {}", detail));
                Ok(outcome)
            }
            TransferOutcome::UnknownFailure { raw_output, .. } => {
                self.log.error(&format!(
                    "[{}] reported this error: {}",
                    built.command, raw_output
                ));
                Ok(outcome)
            }
            _ => Ok(outcome),
        }
    }

    /// Log the final outcome line, the way the host engine reports transfers
    pub fn report(&self, outcome: &TransferOutcome, built: &BuiltCommand, log_success: bool) {
        if !log_success {
            return;
        }
        let message = format!("{} to {}", outcome, built.remote_spec);
        if outcome.is_success() {
            self.log.info(&message);
        } else {
            self.log.error(&message);
        }
    }

    fn build_destination(&self, built: &BuiltCommand, start: Instant) -> Result<TransferOutcome> {
        self.log.info(&format!(
            "rsync code 11 found, creating {} as a fix",
            built.remote_dir
        ));

        let result = self.launch(&built.mkdir)?;
        if !result.success() {
            // best effort: the next transfer will tell whether it worked
            self.log.error(&format!(
                "'{}' exited with status {}: {}",
                built.mkdir,
                result
                    .status
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                collapse_output(&result.text)
            ));
        }

        Ok(TransferOutcome::DirectoriesBuilt {
            remote_dir: built.remote_dir.clone(),
            elapsed: start.elapsed(),
        })
    }

    /// Run `spec`, logging its output at debug level as it arrives
    fn launch(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let log = self.log.as_ref();
        let mut on_line = |line: &str| {
            if !line.trim().is_empty() {
                log.debug(line);
            }
        };

        self.runner.run_streaming(spec, &mut on_line).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                self.log.error(&format!(
                    "{} does not appear to be installed on this system ({})",
                    spec.program, e
                ));
            }
            RsyncTransferError::launch(&spec.program, e)
        })
    }
}

impl std::fmt::Debug for TransferExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBuilder;
    use crate::config::TransferConfig;
    use crate::logging::{LogLevel, MemoryLog};
    use crate::process::testing::ScriptedRunner;

    const CODE_11: &str = "rsync: mkdir \"/srv/mirror\" failed: No such file or directory (2)\n\
                           rsync error: error in file IO (code 11) at main.c(674) [Receiver=3.1.2]\n";

    fn executor(runner: ScriptedRunner) -> (TransferExecutor, Arc<ScriptedRunner>, Arc<MemoryLog>) {
        let runner = Arc::new(runner);
        let log = Arc::new(MemoryLog::new());
        (
            TransferExecutor::new(runner.clone(), log.clone()),
            runner,
            log,
        )
    }

    fn remote_config() -> TransferConfig {
        TransferConfig {
            user: Some("weewx".to_string()),
            ..TransferConfig::new("backup.example.com", "/srv/mirror")
        }
    }

    #[test]
    fn test_success() {
        let (exec, runner, log) = executor(ScriptedRunner::new());
        let config = remote_config();
        let built = CommandBuilder::new(&config).report_command("/var/www/html");

        let outcome = exec.execute(&built).unwrap();
        assert!(outcome.is_success());
        assert_eq!(runner.calls().len(), 1);
        assert!(log.contains("Total transferred file size: 42 bytes"));

        exec.report(&outcome, &built, true);
        let info = log.messages_at(LogLevel::Info);
        assert!(info[0].starts_with("rsync'd 1 files (42 bytes) in"));
        assert!(info[0].ends_with("to weewx@backup.example.com:/srv/mirror"));
    }

    #[test]
    fn test_code_11_builds_remote_directory_once() {
        let (exec, runner, log) = executor(ScriptedRunner::new().respond("rsync", 11, CODE_11));
        let config = remote_config();
        let built = CommandBuilder::new(&config).file_command(std::path::Path::new("/tmp/a"));

        let outcome = exec.execute(&built).unwrap();

        assert!(matches!(outcome, TransferOutcome::DirectoriesBuilt { .. }));
        assert!(outcome.to_string().contains("built destination (remote) directories"));

        let ssh_calls = runner.calls_to("ssh");
        assert_eq!(ssh_calls.len(), 1);
        assert_eq!(
            ssh_calls[0].args,
            vec!["weewx@backup.example.com", "mkdir", "-p", "/srv/mirror"]
        );
        assert!(runner.calls_to("mkdir").is_empty());
        assert!(log.contains("creating /srv/mirror"));
    }

    #[test]
    fn test_code_11_local_uses_mkdir() {
        let (exec, runner, _log) = executor(ScriptedRunner::new().respond("rsync", 11, CODE_11));
        let config = TransferConfig::new("localhost", "/srv/mirror");
        let built = CommandBuilder::new(&config).report_command("/var/www/html");

        exec.execute(&built).unwrap();

        let mkdir_calls = runner.calls_to("mkdir");
        assert_eq!(mkdir_calls.len(), 1);
        assert_eq!(mkdir_calls[0].args, vec!["-p", "/srv/mirror"]);
    }

    #[test]
    fn test_failed_mkdir_is_logged_not_raised() {
        let runner = ScriptedRunner::new()
            .respond("rsync", 11, CODE_11)
            .respond("ssh", 255, "ssh: connect to host backup.example.com: Connection refused\n");
        let (exec, _runner, log) = executor(runner);
        let config = remote_config();
        let built = CommandBuilder::new(&config).file_command(std::path::Path::new("/tmp/a"));

        let outcome = exec.execute(&built).unwrap();
        assert!(outcome.is_success());
        assert!(log
            .messages_at(LogLevel::Error)
            .iter()
            .any(|m| m.contains("exited with status 255")));
    }

    #[test]
    fn test_known_failure_logged() {
        let output = "Permission denied (publickey).\n\
                      rsync error: error in rsync protocol data stream (code 12) at io.c(226)\n";
        let (exec, runner, log) = executor(ScriptedRunner::new().respond("rsync", 12, output));
        let config = remote_config();
        let built = CommandBuilder::new(&config).file_command(std::path::Path::new("/tmp/a"));

        let outcome = exec.execute(&built).unwrap();
        assert_eq!(outcome.category(), Some(FailureCategory::AuthFailure));
        assert_eq!(runner.calls().len(), 1);
        assert!(log
            .messages_at(LogLevel::Error)
            .iter()
            .any(|m| m.contains("probably remote authentication")));
    }

    #[test]
    fn test_output_lines_logged_before_outcome() {
        let output = "ssh: connect to host backup.example.com port 22: No route to host\n\
                      \n\
                      rsync error: error in rsync protocol data stream (code 12) at io.c(226)\n";
        let (exec, _runner, log) = executor(ScriptedRunner::new().respond("rsync", 12, output));
        let config = remote_config();
        let built = CommandBuilder::new(&config).file_command(std::path::Path::new("/tmp/a"));

        exec.execute(&built).unwrap();

        let messages: Vec<String> = log.entries().into_iter().map(|(_, m)| m).collect();
        assert!(messages[0].starts_with("rsync command: rsync --archive"));
        assert_eq!(
            &messages[1..3],
            &[
                "ssh: connect to host backup.example.com port 22: No route to host".to_string(),
                "rsync error: error in rsync protocol data stream (code 12) at io.c(226)".to_string(),
            ]
        );
        assert_eq!(log.messages_at(LogLevel::Error), vec!["ERR No route to host error in rsync command"]);
    }

    #[test]
    fn test_unknown_failure_logged_verbatim() {
        let output = "rsync: weird\nrsync error: unexplained error (code 255) at io.c(226)\n";
        let (exec, _runner, log) = executor(ScriptedRunner::new().respond("rsync", 255, output));
        let config = remote_config();
        let built = CommandBuilder::new(&config).file_command(std::path::Path::new("/tmp/a"));

        let outcome = exec.execute(&built).unwrap();
        assert!(matches!(outcome, TransferOutcome::UnknownFailure { .. }));
        assert!(log.contains("reported this error: rsync: weird. rsync error: unexplained error"));
    }

    #[test]
    fn test_missing_rsync_is_launch_error() {
        let (exec, _runner, log) = executor(ScriptedRunner::new().missing("rsync"));
        let config = remote_config();
        let built = CommandBuilder::new(&config).file_command(std::path::Path::new("/tmp/a"));

        let err = exec.execute(&built).unwrap_err();
        assert!(err.is_missing_program());
        assert!(log.contains("rsync does not appear to be installed"));
    }

    #[test]
    fn test_root_guard_warning_logged() {
        let (exec, _runner, log) = executor(ScriptedRunner::new());
        let config = TransferConfig::new("localhost", "/");
        let built = CommandBuilder::new(&config).report_command("/var/www/html");

        exec.execute(&built).unwrap();
        assert_eq!(log.messages_at(LogLevel::Warn).len(), 1);
    }

    #[test]
    fn test_report_respects_log_success() {
        let (exec, _runner, log) = executor(ScriptedRunner::new());
        let config = remote_config();
        let built = CommandBuilder::new(&config).file_command(std::path::Path::new("/tmp/a"));
        let outcome = exec.execute(&built).unwrap();

        let before = log.entries().len();
        exec.report(&outcome, &built, false);
        assert_eq!(log.entries().len(), before);
    }
}
