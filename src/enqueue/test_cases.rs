// src/enqueue/test_cases.rs

//! Expansion of test suites into graph nodes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::command::Command;
use crate::expectation::ExpectationSet;
use crate::graph::{CommandGraph, NodeId};
use crate::testcase::{TestCase, TestCaseId};

/// Discovered metadata for one source test, cached across configurations so
/// a suite enumerated for several configurations is only parsed once.
#[derive(Debug, Clone)]
pub struct TestInfo {
    pub path: PathBuf,
    pub intrinsic: ExpectationSet,
}

/// Cache of discovered test information, keyed by suite name.
#[derive(Debug, Default)]
pub struct TestInfoCache {
    entries: HashMap<String, Arc<Vec<TestInfo>>>,
}

impl TestInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with(
        &mut self,
        suite: &str,
        discover: impl FnOnce() -> Vec<TestInfo>,
    ) -> Arc<Vec<TestInfo>> {
        self.entries
            .entry(suite.to_string())
            .or_insert_with(|| Arc::new(discover()))
            .clone()
    }
}

/// External collaborator producing test cases; discovery and expectation
/// parsing live behind this trait.
pub trait TestSuite: Send {
    fn name(&self) -> &str;

    /// Enumerate the suite's test cases, reusing previously discovered test
    /// information from `cache` where possible.
    fn test_cases(&mut self, cache: &mut TestInfoCache) -> Vec<TestCase>;
}

/// Expands test suites into test cases and wires their commands into the
/// graph: one node per distinct command, chain edges within a test case and
/// timing edges between repeat copies.
pub struct TestCaseEnqueuer {
    repeat: usize,
    command_nodes: HashMap<Arc<Command>, NodeId>,
    /// Multimap from command to every test case referring to it.
    subscribers: HashMap<Arc<Command>, Vec<TestCaseId>>,
    test_cases: Vec<Arc<TestCase>>,
}

impl TestCaseEnqueuer {
    /// A repeat count of 0 is treated as 1.
    pub fn new(repeat: usize) -> Self {
        if repeat == 0 {
            warn!("repeat count 0 requested; running each test case once");
        }
        Self {
            repeat: repeat.max(1),
            command_nodes: HashMap::new(),
            subscribers: HashMap::new(),
            test_cases: Vec::new(),
        }
    }

    /// Enqueue every test case of every suite, then seal the graph.
    ///
    /// Returns the total number of test cases registered (after repeat
    /// expansion).
    pub fn enqueue_suites(
        &mut self,
        suites: &mut [Box<dyn TestSuite>],
        cache: &mut TestInfoCache,
        graph: &mut CommandGraph,
    ) -> usize {
        for suite in suites.iter_mut() {
            debug!(suite = suite.name(), "enumerating test suite");
            for test_case in suite.test_cases(cache) {
                self.enqueue(test_case, graph);
            }
        }
        graph.seal();
        self.test_cases.len()
    }

    /// Enqueue one test case, expanded by the repeat count.
    ///
    /// Within a copy, command k+1 depends on command k. The first command of
    /// copy i > 0 holds a timing dependency on the last command of copy i-1:
    /// the next copy starts whenever the previous one is done, regardless of
    /// outcome.
    pub fn enqueue(&mut self, test_case: TestCase, graph: &mut CommandGraph) {
        let mut last_node_of_previous_copy: Option<NodeId> = None;

        for copy in 0..self.repeat {
            let tc = if copy == 0 {
                test_case.clone()
            } else {
                test_case.indexed_copy(copy)
            };
            let id: TestCaseId = self.test_cases.len();

            let mut previous: Option<NodeId> = None;
            for (index, command) in tc.commands.iter().enumerate() {
                let timing = copy > 0 && index == 0;
                let dependencies = match (previous, timing) {
                    (Some(p), _) => vec![p],
                    (None, true) => {
                        vec![last_node_of_previous_copy
                            .expect("repeat copy without a predecessor")]
                    }
                    (None, false) => Vec::new(),
                };

                // Commands are deduplicated across test cases; the first
                // occurrence's dependencies win.
                let node = match self.command_nodes.get(command) {
                    Some(node) => *node,
                    None => {
                        let node = graph.add(command.clone(), dependencies, timing);
                        self.command_nodes.insert(command.clone(), node);
                        node
                    }
                };
                self.subscribers.entry(command.clone()).or_default().push(id);
                previous = Some(node);
            }

            last_node_of_previous_copy = previous;
            self.test_cases.push(Arc::new(tc));
        }
    }

    pub fn test_case(&self, id: TestCaseId) -> &Arc<TestCase> {
        &self.test_cases[id]
    }

    pub fn test_case_count(&self) -> usize {
        self.test_cases.len()
    }

    pub fn node_for(&self, command: &Arc<Command>) -> Option<NodeId> {
        self.command_nodes.get(command).copied()
    }

    /// Every test case referring to `command`.
    pub fn subscribers_of(&self, command: &Arc<Command>) -> &[TestCaseId] {
        self.subscribers
            .get(command)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
