// tests/executor.rs

//! Dispatch, collaborators and the retry policy.

#![cfg(unix)]

mod common;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use testdag::command::{Command, CommandKind, DeviceStep, ScriptAction};
use testdag::exec::{
    BrowserCommandRunner, CommandExecutor, Device, DevicePool, DeviceStepResult,
};
use testdag::output::CommandOutput;
use testdag_test_utils::builders::sh_config;

use crate::common::init_tracing;

const LIMIT: Duration = Duration::from_secs(20);

#[tokio::test]
async fn clean_directory_copy_replaces_the_destination() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    let destination = dir.path().join("dest");
    std::fs::create_dir_all(source.join("nested")).unwrap();
    std::fs::write(source.join("a.txt"), "a").unwrap();
    std::fs::write(source.join("nested/b.txt"), "b").unwrap();
    std::fs::create_dir_all(&destination).unwrap();
    std::fs::write(destination.join("stale.txt"), "old").unwrap();

    let executor = CommandExecutor::new(sh_config());
    let command = Arc::new(
        Command::builder("copy-step", "/bin/true")
            .kind(CommandKind::Script(ScriptAction::CleanDirectoryCopy {
                source: source.clone(),
                destination: destination.clone(),
            }))
            .build(),
    );

    let output = executor.run(command, LIMIT).await;

    assert_eq!(output.exit_code, 0);
    assert_eq!(std::fs::read_to_string(destination.join("a.txt")).unwrap(), "a");
    assert_eq!(
        std::fs::read_to_string(destination.join("nested/b.txt")).unwrap(),
        "b"
    );
    assert!(!destination.join("stale.txt").exists());
}

#[tokio::test]
async fn make_symlink_replaces_an_existing_link() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target.txt");
    let link = dir.path().join("link");
    std::fs::write(&target, "pointed-at").unwrap();
    std::os::unix::fs::symlink(dir.path().join("elsewhere"), &link).unwrap();

    let executor = CommandExecutor::new(sh_config());
    let command = Arc::new(
        Command::builder("link-step", "/bin/true")
            .kind(CommandKind::Script(ScriptAction::MakeSymlink {
                link: link.clone(),
                target: target.clone(),
            }))
            .build(),
    );

    let output = executor.run(command, LIMIT).await;

    assert_eq!(output.exit_code, 0);
    assert_eq!(std::fs::read_to_string(&link).unwrap(), "pointed-at");
}

#[tokio::test]
async fn failed_script_reports_exit_one_with_the_error() {
    init_tracing();
    let executor = CommandExecutor::new(sh_config());
    let command = Arc::new(
        Command::builder("copy-missing", "/bin/true")
            .kind(CommandKind::Script(ScriptAction::CleanDirectoryCopy {
                source: "/nonexistent/source".into(),
                destination: "/tmp/testdag-copy-missing".into(),
            }))
            .build(),
    );

    let output = executor.run(command, LIMIT).await;
    assert_eq!(output.exit_code, 1);
    assert!(!output.stderr.is_empty());
}

struct FakeDevice {
    steps_run: Arc<Mutex<Vec<String>>>,
    failing_step: Option<usize>,
    counter: usize,
}

impl Device for FakeDevice {
    fn run_step<'a>(
        &'a mut self,
        step: &'a DeviceStep,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<DeviceStepResult>> + Send + 'a>> {
        let index = self.counter;
        self.counter += 1;
        self.steps_run.lock().unwrap().push(step.description.clone());
        let exit_code = if self.failing_step == Some(index) { 4 } else { 0 };
        let stdout = format!("{} output\n", step.description);
        Box::pin(async move {
            Ok(DeviceStepResult {
                stdout,
                stderr: String::new(),
                exit_code,
            })
        })
    }
}

struct FakePool {
    steps_run: Arc<Mutex<Vec<String>>>,
    failing_step: Option<usize>,
    released: Arc<AtomicBool>,
}

impl DevicePool for FakePool {
    fn acquire(&self) -> Pin<Box<dyn Future<Output = Box<dyn Device>> + Send + '_>> {
        let device = FakeDevice {
            steps_run: self.steps_run.clone(),
            failing_step: self.failing_step,
            counter: 0,
        };
        Box::pin(async move { Box::new(device) as Box<dyn Device> })
    }

    fn release(&self, _device: Box<dyn Device>) {
        self.released.store(true, Ordering::SeqCst);
    }
}

fn device_command(steps: &[&str]) -> Arc<Command> {
    Arc::new(
        Command::builder("device-test", "/bin/true")
            .kind(CommandKind::DevicePush {
                steps: steps
                    .iter()
                    .map(|s| DeviceStep::new(*s, vec![s.to_string()]))
                    .collect(),
            })
            .build(),
    )
}

#[tokio::test]
async fn device_push_runs_all_steps_and_releases_the_device() {
    init_tracing();
    let steps_run = Arc::new(Mutex::new(Vec::new()));
    let released = Arc::new(AtomicBool::new(false));
    let executor = CommandExecutor::new(sh_config()).with_device_pool(Box::new(
        FakePool {
            steps_run: steps_run.clone(),
            failing_step: None,
            released: released.clone(),
        },
    ));

    let output = executor
        .run(device_command(&["push", "run", "collect"]), LIMIT)
        .await;

    assert_eq!(output.exit_code, 0);
    assert_eq!(
        steps_run.lock().unwrap().clone(),
        vec!["push", "run", "collect"]
    );
    assert!(released.load(Ordering::SeqCst));
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    assert!(stdout.contains("## push: exit code 0"));
    assert!(stdout.contains("run output"));
}

#[tokio::test]
async fn first_failing_device_step_aborts_the_sequence() {
    init_tracing();
    let steps_run = Arc::new(Mutex::new(Vec::new()));
    let released = Arc::new(AtomicBool::new(false));
    let executor = CommandExecutor::new(sh_config()).with_device_pool(Box::new(
        FakePool {
            steps_run: steps_run.clone(),
            failing_step: Some(1),
            released: released.clone(),
        },
    ));

    let output = executor
        .run(device_command(&["push", "run", "collect"]), LIMIT)
        .await;

    assert_eq!(output.exit_code, 4);
    assert_eq!(steps_run.lock().unwrap().clone(), vec!["push", "run"]);
    assert!(released.load(Ordering::SeqCst), "device released on failure too");
}

struct FakeBrowser {
    ran: Arc<Mutex<Vec<String>>>,
    cleaned: Arc<AtomicBool>,
}

impl BrowserCommandRunner for FakeBrowser {
    fn run(
        &self,
        command: Arc<Command>,
        _time_limit: Duration,
    ) -> Pin<Box<dyn Future<Output = CommandOutput> + Send + '_>> {
        self.ran
            .lock()
            .unwrap()
            .push(command.display_name().to_string());
        Box::pin(async move { CommandOutput::new(command, 0, Duration::ZERO) })
    }

    fn cleanup(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.cleaned.store(true, Ordering::SeqCst);
        Box::pin(async {})
    }
}

#[tokio::test]
async fn browser_commands_go_to_the_browser_controller() {
    init_tracing();
    let ran = Arc::new(Mutex::new(Vec::new()));
    let cleaned = Arc::new(AtomicBool::new(false));
    let executor = CommandExecutor::new(sh_config()).with_browser_runner(
        Box::new(FakeBrowser {
            ran: ran.clone(),
            cleaned: cleaned.clone(),
        }),
    );

    let command = Arc::new(
        Command::builder("browser-1", "/usr/bin/browser")
            .kind(CommandKind::BrowserTest)
            .build(),
    );
    let output = executor.run(command, LIMIT).await;
    executor.cleanup().await;

    assert_eq!(output.exit_code, 0);
    assert_eq!(ran.lock().unwrap().clone(), vec!["browser-1"]);
    assert!(cleaned.load(Ordering::SeqCst));
}

#[tokio::test]
async fn browser_command_without_a_controller_fails() {
    init_tracing();
    let executor = CommandExecutor::new(sh_config());
    let command = Arc::new(
        Command::builder("browser-lost", "/usr/bin/browser")
            .kind(CommandKind::BrowserTest)
            .build(),
    );

    let output = executor.run(command, LIMIT).await;
    assert_eq!(output.exit_code, -1);
    assert!(!output.diagnostics.is_empty());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn display_flakiness_on_stderr_is_retried_up_to_the_budget() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let executor = CommandExecutor::new(sh_config());
    let command = Arc::new(
        Command::builder("flaky-display", "/bin/sh")
            .arg("-c")
            .arg(format!(
                "echo attempt >> {}; echo 'Gtk-WARNING **: cannot open display' >&2; exit 1",
                counter.display()
            ))
            .max_retries(2)
            .build(),
    );

    let output = executor.run(command, LIMIT).await;

    assert_eq!(output.exit_code, 1);
    let attempts = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(attempts.lines().count(), 3, "one attempt plus two retries");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn display_flakiness_on_stdout_alone_is_not_retried() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let executor = CommandExecutor::new(sh_config());
    let command = Arc::new(
        Command::builder("stdout-warning", "/bin/sh")
            .arg("-c")
            .arg(format!(
                "echo attempt >> {}; echo 'Gtk-WARNING **: cannot open display'; exit 1",
                counter.display()
            ))
            .max_retries(2)
            .build(),
    );

    let output = executor.run(command, LIMIT).await;

    assert_eq!(output.exit_code, 1);
    let attempts = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(attempts.lines().count(), 1, "only stderr triggers the retry");
}

#[tokio::test]
async fn plain_failures_are_not_retried() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let executor = CommandExecutor::new(sh_config());
    let command = Arc::new(
        Command::builder("plain-failure", "/bin/sh")
            .arg("-c")
            .arg(format!("echo attempt >> {}; exit 1", counter.display()))
            .max_retries(5)
            .build(),
    );

    let output = executor.run(command, LIMIT).await;

    assert_eq!(output.exit_code, 1);
    let attempts = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(attempts.lines().count(), 1);
}

#[tokio::test]
async fn crashing_kernel_compile_with_oom_marker_is_retried() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let worker = dir.path().join("worker.sh");
    std::fs::write(
        &worker,
        format!(
            "#!/bin/sh
while read line; do
  echo attempt >> {}
  echo 'Exhausted heap space, trying to allocate 1024 bytes'
  echo '>>> TEST CRASH'
  echo '>>> EOF STDERR' >&2
done
",
            counter.display()
        ),
    )
    .unwrap();
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&worker, std::fs::Permissions::from_mode(0o755)).unwrap();

    let executor = CommandExecutor::new(sh_config());
    let command = Arc::new(
        Command::builder("kernel-compile", &worker)
            .arg("unit")
            .max_retries(1)
            .kind(CommandKind::Compilation {
                runner: "kernel".to_string(),
                always_batch: true,
                json_protocol: false,
            })
            .build(),
    );

    let output = executor.run(command, LIMIT).await;
    executor.cleanup().await;

    assert_eq!(output.exit_code, testdag::output::EXIT_CODE_CRASH);
    let attempts = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(attempts.lines().count(), 2, "one attempt plus one retry");
}
