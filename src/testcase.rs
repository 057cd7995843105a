// src/testcase.rs

//! Test cases: named, ordered command sequences plus expected outcomes.

use std::sync::Arc;
use std::time::Duration;

use crate::command::Command;
use crate::config::RunConfig;
use crate::expectation::{Expectation, ExpectationSet};
use crate::output::CommandOutput;

/// Index of a test case within the enqueuer's registry.
pub type TestCaseId = usize;

/// A named, ordered sequence of commands plus its expected outcomes.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub display_name: String,
    pub commands: Vec<Arc<Command>>,
    pub configuration: Arc<RunConfig>,
    /// Outcomes that make this test count as succeeding.
    pub expected: ExpectationSet,
    /// Intrinsic expectations derived from source test metadata.
    pub intrinsic: ExpectationSet,
}

impl TestCase {
    /// Panics when `commands` is empty; a test case always has at least one
    /// command.
    pub fn new(
        display_name: impl Into<String>,
        commands: Vec<Arc<Command>>,
        configuration: Arc<RunConfig>,
        expected: ExpectationSet,
        intrinsic: ExpectationSet,
    ) -> Self {
        assert!(!commands.is_empty(), "test case without commands");
        Self {
            display_name: display_name.into(),
            commands,
            configuration,
            expected,
            intrinsic,
        }
    }

    /// Per-test timeout: the configured base, scaled 4x for slow tests and
    /// 8x for extra-slow ones.
    pub fn timeout(&self) -> Duration {
        let all = self.expected.union(self.intrinsic);
        let factor: u32 = if all.contains(Expectation::ExtraSlow) {
            8
        } else if all.contains(Expectation::Slow) {
            4
        } else {
            1
        };
        self.configuration.base_timeout * factor
    }

    /// A copy for repeat iteration `index`, with every command replaced by
    /// its indexed copy. Metadata and expectations carry over unchanged.
    pub fn indexed_copy(&self, index: usize) -> TestCase {
        TestCase {
            display_name: self.display_name.clone(),
            commands: self
                .commands
                .iter()
                .map(|c| Arc::new(c.indexed_copy(index)))
                .collect(),
            configuration: self.configuration.clone(),
            expected: self.expected,
            intrinsic: self.intrinsic,
        }
    }
}

/// A test case whose execution has ended, with the outputs produced so far
/// attached in command order.
#[derive(Debug, Clone)]
pub struct FinishedTestCase {
    pub test_case: Arc<TestCase>,
    /// One output per command that actually ran; commands after the first
    /// failure never run and have no entry.
    pub outputs: Vec<CommandOutput>,
}

impl FinishedTestCase {
    pub fn last_output(&self) -> &CommandOutput {
        self.outputs
            .last()
            .expect("finished test case without any output")
    }

    /// The outcome this run actually produced, derived from the last
    /// command's output.
    pub fn outcome(&self) -> Expectation {
        let last = self.last_output();
        if last.timed_out {
            Expectation::Timeout
        } else if last.exit_code == crate::output::EXIT_CODE_CRASH || last.exit_code < 0 {
            Expectation::Crash
        } else if last.exit_code == 0 {
            Expectation::Pass
        } else {
            Expectation::Fail
        }
    }

    /// Whether the produced outcome satisfies the expected set. An empty
    /// expected set means only `Pass` satisfies it.
    pub fn succeeded(&self) -> bool {
        let outcome = self.outcome();
        if self.test_case.expected.is_empty() {
            outcome == Expectation::Pass
        } else {
            self.test_case.expected.contains(outcome)
        }
    }
}
