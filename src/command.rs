// src/command.rs

//! Immutable command descriptors.
//!
//! A [`Command`] describes a single external action by content: executable,
//! arguments, working directory and environment overrides. Commands hash and
//! compare by content so two test cases requesting the same compile end up
//! sharing one graph node. Fields are private; construction goes through
//! [`CommandBuilder`] and the value is immutable afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An in-process filesystem step, run without spawning a child.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScriptAction {
    /// Delete `destination` if present, then copy `source` into it.
    CleanDirectoryCopy {
        source: PathBuf,
        destination: PathBuf,
    },
    /// Replace `link` with a symlink pointing at `target`.
    MakeSymlink { link: PathBuf, target: PathBuf },
}

/// One shell step of a device-push command, run on the acquired device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceStep {
    pub description: String,
    pub arguments: Vec<String>,
}

impl DeviceStep {
    pub fn new(description: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            description: description.into(),
            arguments,
        }
    }
}

/// What kind of action a command is; drives executor dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Plain one-shot child process.
    Process,
    /// A compilation that may be served by a persistent batch runner.
    Compilation {
        /// Runner identifier; batch runners are pooled per identifier.
        runner: String,
        /// Batched regardless of the configured batch mode.
        always_batch: bool,
        /// Requests are framed as a JSON argument array instead of
        /// space-joined arguments.
        json_protocol: bool,
    },
    /// Browser test launch, submitted to the browser controller.
    BrowserTest,
    /// Push to an attached device and run a sequence of shell steps there.
    DevicePush { steps: Vec<DeviceStep> },
    /// VM command served by a batch runner keyed on display name + script.
    VmBatch { script: PathBuf },
    /// In-process filesystem step.
    Script(ScriptAction),
}

/// An immutable, content-hashed description of a single external action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    display_name: String,
    executable: PathBuf,
    arguments: Vec<String>,
    working_directory: Option<PathBuf>,
    // Ordered map so equal override sets hash identically.
    environment_overrides: BTreeMap<String, String>,
    max_retries: u32,
    output_file: Option<PathBuf>,
    input_files: Vec<PathBuf>,
    kind: CommandKind,
    repeat_index: usize,
}

impl Command {
    pub fn builder(display_name: impl Into<String>, executable: impl Into<PathBuf>) -> CommandBuilder {
        CommandBuilder {
            command: Command {
                display_name: display_name.into(),
                executable: executable.into(),
                arguments: Vec::new(),
                working_directory: None,
                environment_overrides: BTreeMap::new(),
                max_retries: 0,
                output_file: None,
                input_files: Vec::new(),
                kind: CommandKind::Process,
                repeat_index: 0,
            },
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn environment_overrides(&self) -> &BTreeMap<String, String> {
        &self.environment_overrides
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    pub fn input_files(&self) -> &[PathBuf] {
        &self.input_files
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn repeat_index(&self) -> usize {
        self.repeat_index
    }

    pub fn is_browser(&self) -> bool {
        matches!(self.kind, CommandKind::BrowserTest)
    }

    /// A copy of this command distinct per repeat iteration.
    ///
    /// Two copies with the same index are equal; copies with different
    /// indices get distinct graph nodes.
    pub fn indexed_copy(&self, index: usize) -> Command {
        let mut copy = self.clone();
        copy.repeat_index = index;
        copy
    }
}

/// Builder for [`Command`]; the only way to construct one.
pub struct CommandBuilder {
    command: Command,
}

impl CommandBuilder {
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.arguments.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.command.working_directory = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.command
            .environment_overrides
            .insert(key.into(), value.into());
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.command.max_retries = retries;
        self
    }

    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.command.output_file = Some(path.into());
        self
    }

    pub fn input_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.command.input_files.push(path.into());
        self
    }

    pub fn kind(mut self, kind: CommandKind) -> Self {
        self.command.kind = kind;
        self
    }

    pub fn build(self) -> Command {
        self.command
    }
}
