// src/exec/diagnostics.rs

//! Best-effort stack capture for timed-out process trees.

use std::process::Stdio;

use tracing::warn;

use crate::config::{OperatingSystem, RunConfig};

/// Capture stack traces for `root_pid` and every process below it.
///
/// Everything here is best effort: a missing debugger or an already-dead
/// pid just yields fewer diagnostic lines, never an error.
pub async fn capture_stack_traces(config: &RunConfig, root_pid: u32) -> Vec<String> {
    let mut pids = vec![root_pid];
    pids.extend(descendant_pids(config, root_pid).await);

    let mut lines = Vec::new();
    for pid in pids {
        lines.push(format!("-- Stack trace for pid {pid} --"));
        match stack_trace_of(config, pid).await {
            Some(trace) => lines.extend(trace.lines().map(str::to_string)),
            None => lines.push("(no stack trace available)".to_string()),
        }
    }
    lines
}

/// Transitive children of `root`, breadth first.
async fn descendant_pids(config: &RunConfig, root: u32) -> Vec<u32> {
    let mut found = Vec::new();
    let mut frontier = vec![root];

    while let Some(pid) = frontier.pop() {
        let children = match config.system {
            OperatingSystem::Windows => {
                probe(
                    "wmic",
                    &[
                        "process".to_string(),
                        "where".to_string(),
                        format!("ParentProcessId={pid}"),
                        "get".to_string(),
                        "ProcessId".to_string(),
                    ],
                )
                .await
            }
            _ => probe("pgrep", &["-P".to_string(), pid.to_string()]).await,
        };

        for line in children.lines() {
            if let Ok(child) = line.trim().parse::<u32>() {
                found.push(child);
                frontier.push(child);
            }
        }
    }

    found
}

async fn stack_trace_of(config: &RunConfig, pid: u32) -> Option<String> {
    let (program, args): (String, Vec<String>) = match config.system {
        OperatingSystem::Linux => (
            "eu-stack".to_string(),
            vec!["-p".to_string(), pid.to_string()],
        ),
        OperatingSystem::MacOs => (
            "/usr/bin/sample".to_string(),
            vec![
                pid.to_string(),
                "1".to_string(),
                "4000".to_string(),
                "-mayDie".to_string(),
            ],
        ),
        OperatingSystem::Windows => {
            let sdk = config.windows_sdk_path.as_ref()?;
            (
                sdk.join("Debuggers")
                    .join("x64")
                    .join("cdb.exe")
                    .to_string_lossy()
                    .into_owned(),
                vec![
                    "-p".to_string(),
                    pid.to_string(),
                    "-c".to_string(),
                    "!uniqstack;qd".to_string(),
                ],
            )
        }
    };

    let output = probe(&program, &args).await;
    if output.is_empty() {
        None
    } else {
        Some(output)
    }
}

/// Run a short-lived probe process and return its stdout; failures are
/// logged and yield an empty string.
async fn probe(program: &str, args: &[String]) -> String {
    let result = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    match result {
        Ok(output) => String::from_utf8_lossy(&output.stdout).into_owned(),
        Err(error) => {
            warn!(program, %error, "platform probe failed");
            String::new()
        }
    }
}
