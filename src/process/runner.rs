//! Running external programs
//!
//! [`CommandRunner`] is the seam between transfers and the operating
//! system. [`SystemRunner`] launches real processes; tests substitute a
//! scripted runner.

use crate::command::CommandSpec;
use std::io::{self, BufRead, BufReader};
use std::process::Stdio;
use std::sync::Arc;

/// Exit status and captured text of a finished program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub status: Option<i32>,
    /// stdout followed by stderr
    pub text: String,
}

impl CommandOutput {
    /// Output of a program that exited with `status`
    pub fn new(status: i32, text: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            text: text.into(),
        }
    }

    /// True on exit code 0
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs a command to completion
pub trait CommandRunner: Send + Sync {
    /// Run `spec`, handing each line of its combined output to `on_line`
    /// as it arrives
    ///
    /// An `Err` means the program could not be started at all; a program
    /// that ran and failed is an `Ok` with a non-zero status.
    fn run_streaming(&self, spec: &CommandSpec, on_line: &mut dyn FnMut(&str)) -> io::Result<CommandOutput>;

    /// Run `spec`, wait for it and capture its combined output
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        self.run_streaming(spec, &mut |_: &str| {})
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    fn run_streaming(&self, spec: &CommandSpec, on_line: &mut dyn FnMut(&str)) -> io::Result<CommandOutput> {
        (**self).run_streaming(spec, on_line)
    }
}

/// Launches real processes via `std::process`
///
/// stdout and stderr share one pipe, so the captured text keeps the order
/// in which the program wrote it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run_streaming(&self, spec: &CommandSpec, on_line: &mut dyn FnMut(&str)) -> io::Result<CommandOutput> {
        let (reader, writer) = io::pipe()?;

        let mut command = spec.to_command();
        command
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer);
        let mut child = command.spawn()?;
        // the child must hold the only write ends or the read never ends
        drop(command);

        let mut text = String::new();
        let read = read_lines(BufReader::new(reader), &mut text, on_line);
        let status = child.wait()?;
        read?;

        Ok(CommandOutput {
            status: status.code(),
            text,
        })
    }
}

fn read_lines(mut reader: impl BufRead, text: &mut String, on_line: &mut dyn FnMut(&str)) -> io::Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end_matches(['\n', '\r']));
        text.push_str(&line);
    }
}
