//! Seams to the host environment: process execution and editor positioning.

use std::{
    path::Path,
    process::{Command, Stdio},
};

use anyhow::{Context, Result};
use tracing::debug;

/// Runs an external program and reports its exit status
pub trait ProcessRunner {
    /// Run `program` with `args` inside `cwd`; returns the exit code
    /// (-1 when the process was terminated by a signal).
    fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<i32>;
}

/// `ProcessRunner` over `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner;

impl ProcessRunner for CommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<i32> {
        debug!(program, ?args, cwd = %cwd.display(), "spawning tag generator");
        let status = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .with_context(|| format!("failed to run {program}"))?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Moves the host editor to a location
pub trait Navigator {
    fn set_position(
        &mut self,
        file: &Path,
        line: usize,
    ) -> Result<()>;
}
