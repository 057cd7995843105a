// src/harness/core.rs

//! Pure scheduler core.
//!
//! All state transitions, graph edits and queue operations happen here, on
//! one logical thread, with no channels, Tokio types or IO. The async shell
//! feeds it events and executes the actions it returns, which keeps the
//! whole scheduling semantics unit-testable without processes.

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::command::Command;
use crate::completer::TestCaseCompleter;
use crate::config::RunConfig;
use crate::enqueue::{CommandEnqueuer, TestCaseEnqueuer, TestInfoCache, TestSuite};
use crate::graph::{CommandGraph, GraphEvent, NodeId, NodeState};
use crate::output::CommandOutput;
use crate::queue::{CommandQueue, BROWSER_RETRY_DELAY};
use crate::testcase::FinishedTestCase;

/// Event fed into the core by the shell.
#[derive(Debug)]
pub enum HarnessEvent {
    /// A dispatched command produced its output.
    CommandFinished { node: NodeId, output: CommandOutput },
    /// A delayed scheduling tick fired.
    Tick,
    ShutdownRequested,
}

/// Action the shell must execute on the core's behalf.
#[derive(Debug)]
pub enum CoreAction {
    /// Hand the command to the executor backend.
    Dispatch {
        node: NodeId,
        command: Arc<Command>,
        timeout: Duration,
    },
    /// Deliver a `Tick` event after the delay.
    ScheduleTick(Duration),
    /// A test case finished; notify the listener.
    EmitTestCase(FinishedTestCase),
    /// The queue drained; release executor resources. Emitted exactly once.
    Cleanup,
    /// Everything is done; notify the listener and stop.
    AllDone,
}

/// Result of handling one event.
#[derive(Debug)]
pub struct CoreStep {
    pub actions: Vec<CoreAction>,
    pub keep_running: bool,
}

/// The deterministic scheduling core.
pub struct HarnessCore {
    config: Arc<RunConfig>,
    graph: CommandGraph,
    test_enqueuer: TestCaseEnqueuer,
    command_enqueuer: CommandEnqueuer,
    queue: CommandQueue,
    completer: TestCaseCompleter,
    done: bool,
}

impl HarnessCore {
    pub fn new(config: Arc<RunConfig>) -> Self {
        let queue = CommandQueue::new(config.max_processes, config.max_browser_processes);
        Self {
            test_enqueuer: TestCaseEnqueuer::new(config.repeat),
            command_enqueuer: CommandEnqueuer::new(),
            queue,
            graph: CommandGraph::new(),
            completer: TestCaseCompleter::new(),
            config,
            done: false,
        }
    }

    /// Build the graph from the suites, seal it, and start dispatching.
    ///
    /// Returns the number of test cases registered and the initial actions
    /// (typically the first wave of dispatches; for an empty run, cleanup
    /// and done).
    pub fn enqueue_test_suites(
        &mut self,
        suites: &mut [Box<dyn TestSuite>],
        cache: &mut TestInfoCache,
    ) -> (usize, Vec<CoreAction>) {
        let added = self
            .test_enqueuer
            .enqueue_suites(suites, cache, &mut self.graph);
        for id in 0..added {
            self.completer.register_test_case(id);
        }
        (added, self.drain())
    }

    /// Handle one event from the shell.
    pub fn step(&mut self, event: HarnessEvent) -> CoreStep {
        let actions = match event {
            HarnessEvent::CommandFinished { node, output } => {
                // The completer must see the output before the graph
                // transition it triggers.
                self.completer.record_output(output.clone());
                self.queue
                    .on_command_finished(&mut self.graph, node, &output);
                self.drain()
            }
            HarnessEvent::Tick => {
                self.queue.on_tick();
                self.drain()
            }
            HarnessEvent::ShutdownRequested => {
                return CoreStep {
                    actions: Vec::new(),
                    keep_running: false,
                }
            }
        };

        CoreStep {
            keep_running: !self.done,
            actions,
        }
    }

    /// Process pending graph events, run a scheduling tick, and detect
    /// completion.
    fn drain(&mut self) -> Vec<CoreAction> {
        let mut actions = Vec::new();

        while let Some(event) = self.graph.pop_event() {
            match event {
                GraphEvent::Added(id) => {
                    self.command_enqueuer.on_node_added(&mut self.graph, id);
                }
                GraphEvent::StateChanged { node, from, to } => {
                    if to == NodeState::Enqueuing {
                        self.queue.on_enqueuing(&mut self.graph, node);
                    }
                    self.command_enqueuer
                        .on_state_changed(&mut self.graph, node, to);
                    if from == NodeState::Processing && to.is_terminal() {
                        let command = self.graph.node(node).command().clone();
                        for finished in self
                            .completer
                            .on_command_terminal(&self.test_enqueuer, &command)
                        {
                            actions.push(CoreAction::EmitTestCase(finished));
                        }
                    }
                }
                GraphEvent::Sealed => {}
            }
        }

        let outcome = self.queue.schedule(&self.graph);
        for node in outcome.dispatched {
            let command = self.graph.node(node).command().clone();
            let timeout = self.timeout_for(&command);
            actions.push(CoreAction::Dispatch {
                node,
                command,
                timeout,
            });
        }
        if outcome.reschedule {
            actions.push(CoreAction::ScheduleTick(BROWSER_RETRY_DELAY));
        }

        if !self.done && self.queue.is_done(&self.graph) {
            self.done = true;
            if self.completer.remaining() > 0 {
                error!(
                    unfinished = ?self.completer.remaining_names(&self.test_enqueuer),
                    "queue drained with unfinished test cases"
                );
            }
            actions.push(CoreAction::Cleanup);
            actions.push(CoreAction::AllDone);
        }

        actions
    }

    /// Timeout for a command: the largest timeout of any test case that
    /// references it. A command with no referring test case falls back to
    /// the configured base timeout.
    fn timeout_for(&self, command: &Arc<Command>) -> Duration {
        self.test_enqueuer
            .subscribers_of(command)
            .iter()
            .map(|id| self.test_enqueuer.test_case(*id).timeout())
            .max()
            .unwrap_or(self.config.base_timeout)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn graph(&self) -> &CommandGraph {
        &self.graph
    }

    pub fn finished_commands(&self) -> usize {
        self.queue.finished_commands()
    }

    /// Graph counters and queue contents, for the inactivity watchdog.
    pub fn dump_state(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "graph: {} nodes, sealed={}", self.graph.len(), self.graph.is_sealed());
        for state in NodeState::ALL {
            let _ = writeln!(out, "  {:?}: {}", state, self.graph.state_count(state));
        }
        out.push_str(&self.queue.dump(&self.graph));
        let _ = writeln!(out, "test cases remaining: {}", self.completer.remaining());
        out
    }
}
