// src/completer.rs

//! Reassembly of command outputs into finished test cases.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error};

use crate::command::Command;
use crate::enqueue::TestCaseEnqueuer;
use crate::output::CommandOutput;
use crate::testcase::{FinishedTestCase, TestCase, TestCaseId};

/// Joins command outputs back into test cases and emits each finished test
/// case exactly once.
#[derive(Debug, Default)]
pub struct TestCaseCompleter {
    outputs: HashMap<Arc<Command>, CommandOutput>,
    remaining: HashSet<TestCaseId>,
}

impl TestCaseCompleter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_test_case(&mut self, id: TestCaseId) {
        self.remaining.insert(id);
    }

    /// Store a command output. Always called before the graph transition it
    /// triggers, so a finished test case can see the output immediately.
    pub fn record_output(&mut self, output: CommandOutput) {
        self.outputs.insert(output.command.clone(), output);
    }

    /// React to a command's node reaching `Successful` or `Failed`: every
    /// test case referring to the command gets the output attached, and
    /// those that are now finished are emitted.
    pub fn on_command_terminal(
        &mut self,
        enqueuer: &TestCaseEnqueuer,
        command: &Arc<Command>,
    ) -> Vec<FinishedTestCase> {
        let mut finished = Vec::new();

        for id in enqueuer.subscribers_of(command) {
            let test_case = enqueuer.test_case(*id);
            if !self.is_finished(test_case) {
                continue;
            }
            if self.remaining.remove(id) {
                debug!(test_case = %test_case.display_name, "test case finished");
                finished.push(self.assemble(test_case));
            } else {
                // The remaining-set guard makes this unreachable in a
                // correct scheduler.
                error!(
                    test_case = %test_case.display_name,
                    "test case finished a second time; ignoring repeat emission"
                );
            }
        }

        finished
    }

    /// A test case is finished once its last command has an output or any
    /// earlier command failed.
    fn is_finished(&self, test_case: &TestCase) -> bool {
        let last = test_case.commands.last().expect("empty test case");
        if self.outputs.contains_key(last) {
            return true;
        }
        test_case.commands[..test_case.commands.len() - 1]
            .iter()
            .any(|c| {
                self.outputs
                    .get(c)
                    .is_some_and(|o| !o.can_run_dependent_commands())
            })
    }

    fn assemble(&self, test_case: &Arc<TestCase>) -> FinishedTestCase {
        let outputs = test_case
            .commands
            .iter()
            .filter_map(|c| self.outputs.get(c).cloned())
            .collect();
        FinishedTestCase {
            test_case: test_case.clone(),
            outputs,
        }
    }

    /// Test cases that have not yet been emitted.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Names of unfinished test cases, for the shutdown diagnostic.
    pub fn remaining_names(&self, enqueuer: &TestCaseEnqueuer) -> Vec<String> {
        self.remaining
            .iter()
            .map(|id| enqueuer.test_case(*id).display_name.clone())
            .collect()
    }
}
