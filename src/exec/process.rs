// src/exec/process.rs

//! One-shot child process lifecycle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::command::Command;
use crate::config::RunConfig;
use crate::exec::diagnostics::capture_stack_traces;
use crate::output::{CommandOutput, EXIT_CODE_NON_UTF8};
use crate::output_log::OutputLog;

/// Grace window for stdio to drain after the child's exit code resolves.
pub const MAX_STDIO_DELAY: Duration = Duration::from_secs(30);

/// Proxy variables stripped from the child environment.
const EXCLUDED_ENVIRONMENT_VARIABLES: [&str; 6] = [
    "http_proxy",
    "https_proxy",
    "no_proxy",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
];

/// The environment a child runs with: the captured host environment minus
/// the proxy variables, the glibc compatibility variables, and the
/// command's own overrides applied last.
pub fn sanitized_environment(
    config: &RunConfig,
    command: &Command,
) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = config.host_env.iter().cloned().collect();
    for variable in EXCLUDED_ENVIRONMENT_VARIABLES {
        env.remove(variable);
    }
    env.insert("GLIBCPP_FORCE_NEW".to_string(), "1".to_string());
    env.insert("GLIBCXX_FORCE_NEW".to_string(), "1".to_string());
    for (key, value) in command.environment_overrides() {
        env.insert(key.clone(), value.clone());
    }
    env
}

/// Run a command as a fresh child process, honoring the time limit.
pub async fn run_process(
    config: &RunConfig,
    command: &Arc<Command>,
    time_limit: Duration,
) -> CommandOutput {
    if let Some(output_file) = command.output_file() {
        if output_is_up_to_date(output_file, command.input_files()).await {
            debug!(
                command = %command.display_name(),
                output_file = %output_file.display(),
                "output file up to date; skipping execution"
            );
            let mut output = CommandOutput::new(command.clone(), 0, Duration::ZERO);
            output.compilation_skipped = true;
            return output;
        }
    }

    let mut cmd = tokio::process::Command::new(command.executable());
    cmd.args(command.arguments())
        .env_clear()
        .envs(sanitized_environment(config, command))
        // Close stdin right away so tests that read stdin fail fast.
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = command.working_directory() {
        cmd.current_dir(dir);
    }

    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(error) => {
            warn!(command = %command.display_name(), %error, "failed to spawn child");
            return CommandOutput::spawn_failure(command.clone(), &error);
        }
    };
    let pid = child.id().unwrap_or(0);

    let stdout_log = Arc::new(Mutex::new(OutputLog::new()));
    let stderr_log = Arc::new(Mutex::new(OutputLog::new()));
    let tee_path = command.output_file().map(Path::to_path_buf);
    let stdout_task = drain_stream(
        child.stdout.take().expect("child stdout is piped"),
        stdout_log.clone(),
        tee_path,
    );
    let stderr_task = drain_stream(
        child.stderr.take().expect("child stderr is piped"),
        stderr_log.clone(),
        None,
    );

    let mut timed_out = false;
    let mut diagnostics = Vec::new();
    let status = match tokio::time::timeout(time_limit, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            timed_out = true;
            warn!(
                command = %command.display_name(),
                pid,
                "command timed out; capturing stacks and killing the process tree"
            );
            diagnostics.extend(capture_stack_traces(config, pid).await);
            let _ = child.start_kill();
            child.wait().await
        }
    };

    // Bounded grace window for the stdio pipes to drain.
    let stdout_abort = stdout_task.abort_handle();
    let stderr_abort = stderr_task.abort_handle();
    let drained = tokio::time::timeout(MAX_STDIO_DELAY, async move {
        let _ = stdout_task.await;
        let _ = stderr_task.await;
    })
    .await;
    if drained.is_err() {
        stdout_abort.abort();
        stderr_abort.abort();
        warn!(
            command = %command.display_name(),
            "stdio did not drain within {:?}; cancelling",
            MAX_STDIO_DELAY
        );
        diagnostics.push(format!(
            "Stdio streams did not close within {MAX_STDIO_DELAY:?} of process exit."
        ));
    }

    let mut exit_code = match &status {
        Ok(status) => exit_code_of(status),
        Err(error) => {
            diagnostics.push(format!("Failed to wait for process exit: {error}"));
            -1
        }
    };

    let mut stdout_log = std::mem::take(&mut *stdout_log.lock().unwrap());
    let mut stderr_log = std::mem::take(&mut *stderr_log.lock().unwrap());
    let stdout = stdout_log.finalize().to_vec();
    let stderr = stderr_log.finalize().to_vec();

    // A "successful" run that printed garbage is not a pass.
    if exit_code == 0 && (stdout_log.has_non_utf8() || stderr_log.has_non_utf8()) {
        exit_code = EXIT_CODE_NON_UTF8;
    }

    CommandOutput {
        command: command.clone(),
        exit_code,
        timed_out,
        stdout,
        stderr,
        duration: started.elapsed(),
        pid,
        compilation_skipped: false,
        diagnostics,
    }
}

/// Normalize the exit status: signal deaths report the negated signal
/// number on unix.
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    status.code().unwrap_or(-1)
}

/// The output file exists and is at least as new as every declared input
/// file. Commands without declared inputs are never skipped.
async fn output_is_up_to_date(output_file: &Path, input_files: &[PathBuf]) -> bool {
    if input_files.is_empty() {
        return false;
    }
    let Ok(metadata) = tokio::fs::metadata(output_file).await else {
        return false;
    };
    let Ok(output_modified) = metadata.modified() else {
        return false;
    };
    for input in input_files {
        let Ok(metadata) = tokio::fs::metadata(input).await else {
            return false;
        };
        let Ok(input_modified) = metadata.modified() else {
            return false;
        };
        if input_modified > output_modified {
            return false;
        }
    }
    true
}

/// Read a child stream into the shared log, optionally teeing every chunk
/// to a file. The file is flushed when the stream closes; on write errors
/// the sink is dropped and capture continues in memory only.
fn drain_stream(
    reader: impl AsyncRead + Unpin + Send + 'static,
    log: Arc<Mutex<OutputLog>>,
    tee_path: Option<PathBuf>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = reader;
        let mut tee = match tee_path {
            Some(path) => match tokio::fs::File::create(&path).await {
                Ok(file) => Some(file),
                Err(error) => {
                    warn!(path = %path.display(), %error, "failed to create tee file");
                    None
                }
            },
            None => None,
        };

        let mut buf = [0u8; 16 * 1024];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Some(file) = tee.as_mut() {
                        if let Err(error) = file.write_all(&buf[..n]).await {
                            warn!(%error, "failed to tee output chunk; dropping sink");
                            tee = None;
                        }
                    }
                    log.lock().unwrap().add(&buf[..n]);
                }
                Err(error) => {
                    warn!(%error, "error reading child stream");
                    break;
                }
            }
        }

        if let Some(mut file) = tee {
            if let Err(error) = file.flush().await {
                warn!(%error, "failed to flush tee file");
            }
        }
    })
}
