// src/exec/executor.rs

//! Dispatch of commands to the appropriate runner, plus the retry policy.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandKind, DeviceStep};
use crate::config::{OperatingSystem, RunConfig};
use crate::exec::batch::{BatchRunner, BATCH_RECYCLE_LIMIT};
use crate::exec::{process, script};
use crate::output::{CommandOutput, EXIT_CODE_CRASH};

/// Out-of-memory marker emitted by crashing kernel compilations.
const OOM_MARKER: &str = "Exhausted heap space, trying to allocat";

/// Display flakiness markers; seeing one on Linux makes a run retry-worthy.
const CANNOT_OPEN_DISPLAY: &str = "Gtk-WARNING **: cannot open display";
const FAILED_TO_RUN_COMMAND: &str = "Failed to run command. return code=1";

/// Per-configuration browser controller; an external collaborator.
pub trait BrowserCommandRunner: Send + Sync {
    fn run(
        &self,
        command: Arc<Command>,
        time_limit: Duration,
    ) -> Pin<Box<dyn Future<Output = CommandOutput> + Send + '_>>;

    /// Release browser resources; called once during executor cleanup.
    fn cleanup(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Result of one shell step on a device.
#[derive(Debug, Clone)]
pub struct DeviceStepResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// An acquired device; an external collaborator.
pub trait Device: Send {
    fn run_step<'a>(
        &'a mut self,
        step: &'a DeviceStep,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<DeviceStepResult>> + Send + 'a>>;
}

/// Pool of attached devices; an external collaborator.
pub trait DevicePool: Send + Sync {
    fn acquire(&self) -> Pin<Box<dyn Future<Output = Box<dyn Device>> + Send + '_>>;
    fn release(&self, device: Box<dyn Device>);
}

struct BatchEntry {
    environment: BTreeMap<String, String>,
    jobs_served: AtomicU32,
    runner: Arc<Mutex<BatchRunner>>,
}

impl BatchEntry {
    fn new(key: &str, config: Arc<RunConfig>, environment: BTreeMap<String, String>) -> Arc<Self> {
        Arc::new(Self {
            runner: Arc::new(Mutex::new(BatchRunner::new(
                key,
                config,
                environment.clone(),
            ))),
            environment,
            jobs_served: AtomicU32::new(0),
        })
    }
}

/// Runs commands via the right backend and owns the pooled resources:
/// batch runners and the browser controller live here and are released
/// during [`cleanup`](CommandExecutor::cleanup).
pub struct CommandExecutor {
    config: Arc<RunConfig>,
    batch_pools: Mutex<HashMap<String, Vec<Arc<BatchEntry>>>>,
    browser: Option<Box<dyn BrowserCommandRunner>>,
    devices: Option<Box<dyn DevicePool>>,
}

impl CommandExecutor {
    pub fn new(config: Arc<RunConfig>) -> Self {
        Self {
            config,
            batch_pools: Mutex::new(HashMap::new()),
            browser: None,
            devices: None,
        }
    }

    pub fn with_browser_runner(mut self, browser: Box<dyn BrowserCommandRunner>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_device_pool(mut self, devices: Box<dyn DevicePool>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Run a command to completion, applying the retry policy.
    pub async fn run(&self, command: Arc<Command>, time_limit: Duration) -> CommandOutput {
        let mut attempt: u32 = 0;
        loop {
            let output = self.dispatch(&command, time_limit).await;
            attempt += 1;
            if attempt <= command.max_retries() && self.is_retry_worthy(&command, &output) {
                info!(
                    command = %command.display_name(),
                    attempt,
                    "transient failure; retrying command"
                );
                continue;
            }
            return output;
        }
    }

    async fn dispatch(&self, command: &Arc<Command>, time_limit: Duration) -> CommandOutput {
        match command.kind() {
            CommandKind::BrowserTest => match &self.browser {
                Some(browser) => browser.run(command.clone(), time_limit).await,
                None => missing_collaborator(command, "no browser controller configured"),
            },
            CommandKind::Compilation {
                runner,
                always_batch,
                ..
            } => {
                if *always_batch || self.config.batch_mode {
                    self.run_batch(runner.clone(), command, time_limit).await
                } else {
                    process::run_process(&self.config, command, time_limit).await
                }
            }
            CommandKind::Script(action) => script::run_script(command, action).await,
            CommandKind::DevicePush { steps } => self.run_device_push(command, steps).await,
            CommandKind::VmBatch { script } => {
                let key = format!("{}-{}", command.display_name(), script.display());
                self.run_batch(key, command, time_limit).await
            }
            CommandKind::Process => process::run_process(&self.config, command, time_limit).await,
        }
    }

    /// Release all pooled resources. Invoked exactly once, after the
    /// command queue drains.
    pub async fn cleanup(&self) {
        let mut pools = self.batch_pools.lock().await;
        for (key, entries) in pools.drain() {
            for entry in entries {
                debug!(key = %key, "terminating batch runner");
                entry.runner.lock().await.terminate().await;
            }
        }
        if let Some(browser) = &self.browser {
            browser.cleanup().await;
        }
    }

    async fn run_batch(
        &self,
        key: String,
        command: &Arc<Command>,
        time_limit: Duration,
    ) -> CommandOutput {
        let (entry, mut runner) = self.acquire_batch_runner(&key, command).await;

        if self.config.leaky_runners.contains(&key)
            && entry.jobs_served.load(Ordering::Relaxed) >= BATCH_RECYCLE_LIMIT
        {
            info!(key = %key, "recycling leaky batch runner");
            runner.terminate().await;
            entry.jobs_served.store(0, Ordering::Relaxed);
        }

        let output = runner.run(command, time_limit).await;
        entry.jobs_served.fetch_add(1, Ordering::Relaxed);
        output
    }

    /// Pick the first idle runner for `key` whose environment matches the
    /// command; replace an idle mismatched runner or grow the pool up to
    /// the process cap otherwise.
    ///
    /// Panics when every runner is busy: the queue must not dispatch more
    /// batch jobs than the cap allows.
    async fn acquire_batch_runner(
        &self,
        key: &str,
        command: &Arc<Command>,
    ) -> (Arc<BatchEntry>, OwnedMutexGuard<BatchRunner>) {
        let mut pools = self.batch_pools.lock().await;
        let entries = pools.entry(key.to_string()).or_default();

        let mut idle_mismatch: Option<(usize, OwnedMutexGuard<BatchRunner>)> = None;
        for (index, entry) in entries.iter().enumerate() {
            if let Ok(guard) = entry.runner.clone().try_lock_owned() {
                if entry.environment == *command.environment_overrides() {
                    return (entry.clone(), guard);
                }
                if idle_mismatch.is_none() {
                    idle_mismatch = Some((index, guard));
                }
            }
        }

        if let Some((index, mut guard)) = idle_mismatch {
            debug!(key, "batch runner environment mismatch; restarting worker");
            guard.terminate().await;
            drop(guard);
            let entry = BatchEntry::new(
                key,
                self.config.clone(),
                command.environment_overrides().clone(),
            );
            entries[index] = entry.clone();
            let guard = entry
                .runner
                .clone()
                .try_lock_owned()
                .expect("fresh batch runner is idle");
            return (entry, guard);
        }

        if entries.len() < self.config.max_processes {
            let entry = BatchEntry::new(
                key,
                self.config.clone(),
                command.environment_overrides().clone(),
            );
            entries.push(entry.clone());
            let guard = entry
                .runner
                .clone()
                .try_lock_owned()
                .expect("fresh batch runner is idle");
            return (entry, guard);
        }

        panic!("no idle batch runner for '{key}'; dispatched beyond the process cap");
    }

    /// Push-and-run on an acquired device: run the shell steps in order
    /// with a per-step stopwatch, concatenating everything into one
    /// synthetic output. The first non-zero step aborts the sequence; the
    /// device is always released.
    async fn run_device_push(
        &self,
        command: &Arc<Command>,
        steps: &[DeviceStep],
    ) -> CommandOutput {
        let Some(pool) = &self.devices else {
            return missing_collaborator(command, "no device pool configured");
        };

        let started = Instant::now();
        let mut device = pool.acquire().await;

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit_code = 0;
        for step in steps {
            let step_started = Instant::now();
            let result = device.run_step(step).await;
            let elapsed = step_started.elapsed();
            match result {
                Ok(step_result) => {
                    let _ = writeln!(
                        stdout,
                        "## {}: exit code {} in {} ms",
                        step.description,
                        step_result.exit_code,
                        elapsed.as_millis()
                    );
                    stdout.push_str(&step_result.stdout);
                    if !step_result.stderr.is_empty() {
                        let _ = writeln!(stderr, "## {}:", step.description);
                        stderr.push_str(&step_result.stderr);
                    }
                    if step_result.exit_code != 0 {
                        exit_code = step_result.exit_code;
                        break;
                    }
                }
                Err(error) => {
                    let _ = writeln!(stderr, "## {} failed: {}", step.description, error);
                    exit_code = -1;
                    break;
                }
            }
        }
        pool.release(device);

        let mut output = CommandOutput::new(command.clone(), exit_code, started.elapsed());
        output.stdout = stdout.into_bytes();
        output.stderr = stderr.into_bytes();
        output
    }

    /// Whether a failed output matches the small allowlist of known
    /// transient failures.
    fn is_retry_worthy(&self, command: &Command, output: &CommandOutput) -> bool {
        if let CommandKind::Compilation {
            always_batch: true, ..
        } = command.kind()
        {
            let crashed = output.exit_code == EXIT_CODE_CRASH || output.exit_code < 0;
            if crashed {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if stdout.contains(OOM_MARKER) || stderr.contains(OOM_MARKER) {
                    return true;
                }
            }
        }

        if self.config.system == OperatingSystem::Linux {
            // The display checks only ever examine the stderr stream.
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains(CANNOT_OPEN_DISPLAY) || stderr.contains(FAILED_TO_RUN_COMMAND) {
                return true;
            }
        }

        false
    }
}

fn missing_collaborator(command: &Arc<Command>, message: &str) -> CommandOutput {
    warn!(command = %command.display_name(), message);
    let mut output = CommandOutput::new(command.clone(), -1, Duration::ZERO);
    output.diagnostics.push(message.to_string());
    output
}
