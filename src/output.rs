// src/output.rs

//! Results of running a command once.

use std::sync::Arc;
use std::time::Duration;

use crate::command::Command;

/// Exit code reported when a child could not be spawned.
pub const EXIT_CODE_SPAWN_FAILED: i32 = -1;

/// Exit code for an unhandled compiler exception / CRASH outcome.
pub const EXIT_CODE_CRASH: i32 = 253;

/// Exit code for a parse failure reported by a batch worker.
pub const EXIT_CODE_PARSE_FAIL: i32 = 245;

/// Sentinel exit code forced when a zero-exit command produced output that
/// was not valid UTF-8.
pub const EXIT_CODE_NON_UTF8: i32 = 0xFFFD;

/// The result of running one [`Command`] once.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: Arc<Command>,
    pub exit_code: i32,
    pub timed_out: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
    pub pid: u32,
    pub compilation_skipped: bool,
    /// Extra lines attached by the harness itself: spawn errors, captured
    /// stack traces, stdio-drain warnings.
    pub diagnostics: Vec<String>,
}

impl CommandOutput {
    pub fn new(command: Arc<Command>, exit_code: i32, duration: Duration) -> Self {
        Self {
            command,
            exit_code,
            timed_out: false,
            stdout: Vec::new(),
            stderr: Vec::new(),
            duration,
            pid: 0,
            compilation_skipped: false,
            diagnostics: Vec::new(),
        }
    }

    /// An output representing a failure to even start the child.
    pub fn spawn_failure(command: Arc<Command>, error: &std::io::Error) -> Self {
        let mut output = Self::new(command, EXIT_CODE_SPAWN_FAILED, Duration::ZERO);
        output
            .diagnostics
            .push(format!("Process could not be spawned: {error}"));
        output
    }

    pub fn successful(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// Whether the graph may promote dependents of this command's node.
    pub fn can_run_dependent_commands(&self) -> bool {
        self.successful()
    }
}
