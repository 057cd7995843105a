// src/exec/batch.rs

//! Persistent batch runner workers.
//!
//! A batch runner is a long-lived child that serves many commands
//! sequentially over a line-framed protocol:
//!
//! - The host writes one request line per job to the child's stdin: a
//!   JSON-encoded argument array for runners flagged for the JSON protocol,
//!   otherwise the arguments space-joined.
//! - The child writes job output interspersed with control lines. On
//!   stdout, `>>> TEST <OUTCOME> ...` terminates the job and `>>> BATCH ...`
//!   is informational; any other `>>> ` prefix is a protocol violation and
//!   fatal to the worker. On stderr, `>>> EOF STDERR` marks the end of the
//!   per-job stderr stream.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandKind};
use crate::config::RunConfig;
use crate::exec::process::sanitized_environment;
use crate::output::{CommandOutput, EXIT_CODE_CRASH, EXIT_CODE_PARSE_FAIL};
use crate::output_log::OutputLog;

/// Jobs served before a leaky runner is killed and restarted.
pub const BATCH_RECYCLE_LIMIT: u32 = 100;

/// Outcome word carried by a `>>> TEST` control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchOutcome {
    Pass,
    Fail,
    Ok,
    Crash,
    Timeout,
    ParseFail,
}

impl BatchOutcome {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "PASS" => Some(BatchOutcome::Pass),
            "FAIL" => Some(BatchOutcome::Fail),
            "OK" => Some(BatchOutcome::Ok),
            "CRASH" => Some(BatchOutcome::Crash),
            "TIMEOUT" => Some(BatchOutcome::Timeout),
            "PARSE_FAIL" => Some(BatchOutcome::ParseFail),
            _ => None,
        }
    }

    fn exit_code(self) -> i32 {
        match self {
            BatchOutcome::Ok | BatchOutcome::Pass => 0,
            BatchOutcome::Crash => EXIT_CODE_CRASH,
            BatchOutcome::ParseFail => EXIT_CODE_PARSE_FAIL,
            BatchOutcome::Fail | BatchOutcome::Timeout => 1,
        }
    }
}

struct BatchChild {
    process: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Lines<BufReader<ChildStderr>>,
    pid: u32,
}

/// A reusable worker child, spawned lazily on the first job and respawned
/// after termination.
pub struct BatchRunner {
    key: String,
    config: Arc<RunConfig>,
    environment: BTreeMap<String, String>,
    child: Option<BatchChild>,
}

impl BatchRunner {
    pub fn new(
        key: impl Into<String>,
        config: Arc<RunConfig>,
        environment: BTreeMap<String, String>,
    ) -> Self {
        Self {
            key: key.into(),
            config,
            environment,
            child: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Environment overrides this worker was started with; a job with
    /// different overrides must not reuse it.
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Serve one job, restarting the worker first if it is not running.
    pub async fn run(&mut self, command: &Arc<Command>, time_limit: Duration) -> CommandOutput {
        let started = Instant::now();

        if self.child.is_none() {
            match self.spawn(command).await {
                Ok(child) => {
                    info!(key = %self.key, pid = child.pid, "batch runner started");
                    self.child = Some(child);
                }
                Err(error) => {
                    warn!(key = %self.key, %error, "failed to start batch runner");
                    return CommandOutput::spawn_failure(command.clone(), &error);
                }
            }
        }
        let child = self.child.as_mut().expect("worker was just spawned");
        let pid = child.pid;

        let request = match command.kind() {
            CommandKind::Compilation {
                json_protocol: true,
                ..
            } => serde_json::to_string(command.arguments()).expect("arguments encode as JSON"),
            _ => command.arguments().join(" "),
        };
        if let Err(error) = write_request(&mut child.stdin, &request).await {
            warn!(key = %self.key, %error, "failed to write batch request; restarting worker");
            self.terminate().await;
            let mut output =
                CommandOutput::new(command.clone(), EXIT_CODE_CRASH, started.elapsed());
            output.pid = pid;
            output
                .diagnostics
                .push(format!("Batch worker rejected the request: {error}"));
            return output;
        }

        let mut stdout_log = OutputLog::new();
        let mut stderr_log = OutputLog::new();
        let mut outcome: Option<BatchOutcome> = None;
        let mut stderr_done = false;
        let mut timed_out = false;
        let mut violation: Option<String> = None;
        let mut worker_died = false;

        let deadline = tokio::time::sleep(time_limit);
        tokio::pin!(deadline);

        while !(outcome.is_some() && stderr_done) {
            tokio::select! {
                line = child.stdout.next_line(), if outcome.is_none() => match line {
                    Ok(Some(line)) => {
                        if let Some(control) = line.strip_prefix(">>> ") {
                            if let Some(rest) = control.strip_prefix("TEST ") {
                                let word = rest.split_whitespace().next().unwrap_or("");
                                match BatchOutcome::parse(word) {
                                    Some(parsed) => outcome = Some(parsed),
                                    None => {
                                        violation = Some(line);
                                        break;
                                    }
                                }
                            } else if control.starts_with("BATCH") {
                                // Informational; ignored.
                            } else {
                                violation = Some(line);
                                break;
                            }
                        } else {
                            stdout_log.add(line.as_bytes());
                            stdout_log.add(b"\n");
                        }
                    }
                    Ok(None) | Err(_) => {
                        worker_died = true;
                        break;
                    }
                },
                line = child.stderr.next_line(), if !stderr_done => match line {
                    Ok(Some(line)) => {
                        if line == ">>> EOF STDERR" {
                            stderr_done = true;
                        } else {
                            stderr_log.add(line.as_bytes());
                            stderr_log.add(b"\n");
                        }
                    }
                    Ok(None) | Err(_) => {
                        stderr_done = true;
                    }
                },
                _ = &mut deadline => {
                    timed_out = true;
                    break;
                }
            }
        }

        let mut diagnostics = Vec::new();
        let exit_code = if timed_out {
            debug!(key = %self.key, pid, "batch job timed out; killing worker");
            self.terminate().await;
            BatchOutcome::Timeout.exit_code()
        } else if let Some(line) = violation {
            error!(key = %self.key, pid, line = %line, "batch worker protocol violation; killing worker");
            diagnostics.push(format!("Unexpected control line from batch worker: {line}"));
            self.terminate().await;
            EXIT_CODE_CRASH
        } else if worker_died {
            warn!(key = %self.key, pid, "batch worker exited mid-job");
            diagnostics.push("Batch worker exited before reporting an outcome.".to_string());
            self.terminate().await;
            EXIT_CODE_CRASH
        } else {
            outcome.expect("loop ends with an outcome").exit_code()
        };

        CommandOutput {
            command: command.clone(),
            exit_code,
            timed_out,
            stdout: stdout_log.finalize().to_vec(),
            stderr: stderr_log.finalize().to_vec(),
            duration: started.elapsed(),
            pid,
            compilation_skipped: false,
            diagnostics,
        }
    }

    /// Kill the worker and wait for it to exit. The next job respawns it.
    pub async fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.process.start_kill();
            let _ = child.process.wait().await;
            debug!(key = %self.key, pid = child.pid, "batch runner terminated");
        }
    }

    async fn spawn(&self, command: &Command) -> std::io::Result<BatchChild> {
        let mut cmd = tokio::process::Command::new(command.executable());
        cmd.arg("--batch")
            .env_clear()
            .envs(sanitized_environment(&self.config, command))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = command.working_directory() {
            cmd.current_dir(dir);
        }

        let mut process = cmd.spawn()?;
        let stdin = process.stdin.take().expect("worker stdin is piped");
        let stdout = BufReader::new(process.stdout.take().expect("worker stdout is piped")).lines();
        let stderr = BufReader::new(process.stderr.take().expect("worker stderr is piped")).lines();
        let pid = process.id().unwrap_or(0);
        Ok(BatchChild {
            process,
            stdin,
            stdout,
            stderr,
            pid,
        })
    }
}

async fn write_request(stdin: &mut ChildStdin, request: &str) -> std::io::Result<()> {
    stdin.write_all(request.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}
