//! Report cycle directory sync
//!
//! Once per report cycle the whole generated report tree is pushed to the
//! destination in a single rsync run.

use crate::command::{BuiltCommand, CommandBuilder};
use crate::config::ReportConfig;
use crate::error::Result;
use crate::logging::TransferLog;
use crate::outcome::TransferOutcome;
use crate::process::{CommandRunner, TransferExecutor};
use std::sync::Arc;

/// Syncs the report root(s) to the destination
#[derive(Debug, Clone)]
pub struct ReportSync {
    config: ReportConfig,
    executor: TransferExecutor,
}

impl ReportSync {
    /// Create a report sync
    pub fn new(config: ReportConfig, runner: Arc<dyn CommandRunner>, log: Arc<dyn TransferLog>) -> Self {
        Self {
            config,
            executor: TransferExecutor::new(runner, log),
        }
    }

    /// Settings in use
    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// The command [`run`](Self::run) would execute today
    pub fn command(&self) -> BuiltCommand {
        CommandBuilder::for_today(&self.config.transfer).report_command(&self.config.local_root)
    }

    /// Run one sync
    ///
    /// Returns `None` when transfers are disabled. rsync failures come back
    /// as an outcome; only a failure to launch rsync is an error.
    pub fn run(&self) -> Result<Option<TransferOutcome>> {
        if !self.config.transfer.enable {
            self.executor.log().debug("rsync transfer disabled, skipping report sync");
            return Ok(None);
        }

        let built = self.command();
        let outcome = self.executor.execute(&built)?;
        self.executor
            .report(&outcome, &built, self.config.transfer.log_success);
        Ok(Some(outcome))
    }
}
