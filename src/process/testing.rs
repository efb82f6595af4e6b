//! Scripted command runner for tests

use super::{CommandOutput, CommandRunner};
use crate::command::CommandSpec;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Mutex;

/// Output rsync prints after a small successful transfer
pub(crate) const RSYNC_OK: &str = "\
Number of files: 1 (reg: 1)
Number of regular files transferred: 1
Total file size: 42 bytes
Total transferred file size: 42 bytes
";

/// Answers each program with a canned response and records every call
#[derive(Debug, Default)]
pub(crate) struct ScriptedRunner {
    responses: HashMap<String, CommandOutput>,
    missing: HashSet<String>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    /// rsync succeeds with [`RSYNC_OK`], everything else exits 0 silently
    pub(crate) fn new() -> Self {
        Self::default().respond("rsync", 0, RSYNC_OK)
    }

    pub(crate) fn respond(mut self, program: &str, status: i32, text: &str) -> Self {
        self.responses
            .insert(program.to_string(), CommandOutput::new(status, text));
        self
    }

    /// Launching `program` fails as if it were not installed
    pub(crate) fn missing(mut self, program: &str) -> Self {
        self.missing.insert(program.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run_streaming(&self, spec: &CommandSpec, on_line: &mut dyn FnMut(&str)) -> io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());

        if self.missing.contains(&spec.program) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "No such file or directory",
            ));
        }

        let output = self
            .responses
            .get(&spec.program)
            .cloned()
            .unwrap_or_else(|| CommandOutput::new(0, ""));
        for line in output.text.lines() {
            on_line(line);
        }
        Ok(output)
    }
}
