//! Process execution helpers.
//!
//! External commands are considered "world-touching" and must go through the HAL so we can
//! test workflows without spawning real processes.

use crate::HalResult;
use std::process::Output;
use std::time::Duration;

/// Process execution trait (external command runner).
pub trait ProcessOps {
    /// Run a command with an explicit argument vector and capture its output.
    fn command_output(&self, program: &str, args: &[&str], timeout: Duration)
        -> HalResult<Output>;

    /// Run a command, feeding `stdin` to the child, and capture its output.
    fn command_output_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        stdin: &[u8],
        timeout: Duration,
    ) -> HalResult<Output>;

    /// Run a command with inherited stdio and return its exit code.
    ///
    /// Used for interactive children (the container wrapper) where the
    /// caller propagates the exit code rather than treating non-zero as an
    /// error here.
    fn command_interactive(&self, program: &str, args: &[&str]) -> HalResult<i32>;

    fn command_status(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<()>;
}
