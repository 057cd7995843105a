// crates/test-utils/src/builders.rs

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use testdag::command::{Command, CommandKind};
use testdag::config::RunConfig;
use testdag::enqueue::{TestInfoCache, TestSuite};
use testdag::expectation::{Expectation, ExpectationSet};
use testdag::testcase::TestCase;

/// Builder for `RunConfig` to simplify test setup.
pub struct ConfigBuilder {
    config: RunConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
        }
    }

    pub fn max_processes(mut self, n: usize) -> Self {
        self.config.max_processes = n;
        self
    }

    pub fn max_browser_processes(mut self, n: usize) -> Self {
        self.config.max_browser_processes = n;
        self
    }

    pub fn repeat(mut self, n: usize) -> Self {
        self.config.repeat = n;
        self
    }

    pub fn batch_mode(mut self, on: bool) -> Self {
        self.config.batch_mode = on;
        self
    }

    pub fn base_timeout(mut self, timeout: Duration) -> Self {
        self.config.base_timeout = timeout;
        self
    }

    pub fn leaky_runner(mut self, key: &str) -> Self {
        self.config.leaky_runners.insert(key.to_string());
        self
    }

    pub fn host_env(mut self, key: &str, value: &str) -> Self {
        self.config.host_env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> Arc<RunConfig> {
        Arc::new(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Config for tests that really spawn `sh`: children run with a sanitized
/// environment, so a minimal `PATH` has to be passed through explicitly.
pub fn sh_config() -> Arc<RunConfig> {
    ConfigBuilder::new()
        .host_env("PATH", "/usr/bin:/bin")
        .build()
}

/// A plain process command; the executable is only meaningful for tests
/// that really spawn it.
pub fn process_command(name: &str) -> Arc<Command> {
    Arc::new(Command::builder(name, format!("/usr/bin/{name}")).build())
}

/// A browser test command.
pub fn browser_command(name: &str) -> Arc<Command> {
    Arc::new(
        Command::builder(name, format!("/usr/bin/{name}"))
            .kind(CommandKind::BrowserTest)
            .build(),
    )
}

/// A batch-eligible compilation command.
pub fn compile_command(name: &str, runner: &str, always_batch: bool) -> Arc<Command> {
    Arc::new(
        Command::builder(name, format!("/usr/bin/{runner}"))
            .kind(CommandKind::Compilation {
                runner: runner.to_string(),
                always_batch,
                json_protocol: false,
            })
            .build(),
    )
}

/// A command that runs `script` through `sh -c`, for tests that exercise
/// real child processes.
pub fn sh_command(name: &str, script: &str) -> Arc<Command> {
    Arc::new(Command::builder(name, "/bin/sh").arg("-c").arg(script).build())
}

/// Builder for `TestCase`.
pub struct TestCaseBuilder {
    name: String,
    commands: Vec<Arc<Command>>,
    configuration: Arc<RunConfig>,
    expected: ExpectationSet,
}

impl TestCaseBuilder {
    pub fn new(name: &str, configuration: Arc<RunConfig>) -> Self {
        Self {
            name: name.to_string(),
            commands: Vec::new(),
            configuration,
            expected: ExpectationSet::EMPTY,
        }
    }

    pub fn command(mut self, command: Arc<Command>) -> Self {
        self.commands.push(command);
        self
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expected.insert(expectation);
        self
    }

    pub fn build(self) -> TestCase {
        TestCase::new(
            self.name,
            self.commands,
            self.configuration,
            self.expected,
            ExpectationSet::EMPTY,
        )
    }
}

/// A suite over a fixed list of test cases.
pub struct StaticSuite {
    name: String,
    cases: Vec<TestCase>,
}

impl StaticSuite {
    pub fn new(name: &str, cases: Vec<TestCase>) -> Self {
        Self {
            name: name.to_string(),
            cases,
        }
    }
}

impl TestSuite for StaticSuite {
    fn name(&self) -> &str {
        &self.name
    }

    fn test_cases(&mut self, _cache: &mut TestInfoCache) -> Vec<TestCase> {
        self.cases.clone()
    }
}
