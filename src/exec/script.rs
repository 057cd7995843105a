// src/exec/script.rs

//! In-process filesystem steps.

use std::path::Path;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use crate::command::{Command, ScriptAction};
use crate::output::CommandOutput;

/// Run a script command in-process. Failures surface as exit code 1 with
/// the error message on stderr, never as a panic.
pub async fn run_script(command: &Arc<Command>, action: &ScriptAction) -> CommandOutput {
    let started = Instant::now();
    debug!(command = %command.display_name(), ?action, "running script command");

    let action = action.clone();
    let result = tokio::task::spawn_blocking(move || match &action {
        ScriptAction::CleanDirectoryCopy {
            source,
            destination,
        } => clean_directory_copy(source, destination),
        ScriptAction::MakeSymlink { link, target } => make_symlink(link, target),
    })
    .await
    .unwrap_or_else(|join_error| {
        Err(std::io::Error::other(format!(
            "script task failed: {join_error}"
        )))
    });

    match result {
        Ok(()) => CommandOutput::new(command.clone(), 0, started.elapsed()),
        Err(error) => {
            let mut output = CommandOutput::new(command.clone(), 1, started.elapsed());
            output.stderr = format!("{error}\n").into_bytes();
            output
        }
    }
}

/// Delete the destination if present, then copy the source tree into it.
fn clean_directory_copy(source: &Path, destination: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(destination) {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }
    copy_tree(source, destination)
}

fn copy_tree(source: &Path, destination: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(destination)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Replace `link` with a symlink pointing at `target`.
fn make_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(link) {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }
}
