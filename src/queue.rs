// src/queue.rs

//! Bounded concurrency limiter over the ready queue.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, warn};

use crate::graph::{CommandGraph, NodeId, NodeState};
use crate::output::CommandOutput;

/// Delay before retrying dispatch when the browser cap is hit.
pub const BROWSER_RETRY_DELAY: Duration = Duration::from_millis(100);

/// What a scheduling tick decided.
#[derive(Debug, Default)]
pub struct ScheduleOutcome {
    /// Nodes to hand to the executor, in dispatch order.
    pub dispatched: Vec<NodeId>,
    /// A browser command was held back; retry after
    /// [`BROWSER_RETRY_DELAY`].
    pub reschedule: bool,
}

/// FIFO ready queue plus in-flight accounting against the process and
/// browser caps.
#[derive(Debug)]
pub struct CommandQueue {
    max_processes: usize,
    max_browser_processes: usize,
    ready: VecDeque<NodeId>,
    in_flight: usize,
    browser_in_flight: usize,
    finished_commands: usize,
    tick_pending: bool,
}

impl CommandQueue {
    pub fn new(max_processes: usize, max_browser_processes: usize) -> Self {
        Self {
            max_processes: max_processes.max(1),
            max_browser_processes: max_browser_processes.max(1),
            ready: VecDeque::new(),
            in_flight: 0,
            browser_in_flight: 0,
            finished_commands: 0,
            tick_pending: false,
        }
    }

    /// Accept a node that just reached `Enqueuing`: mark it `Processing` and
    /// queue it. Nodes with dependencies go to the front so follow-up work
    /// stays hot; roots go to the back.
    pub fn on_enqueuing(&mut self, graph: &mut CommandGraph, id: NodeId) {
        graph.change_state(id, NodeState::Processing);
        if graph.node(id).dependencies().is_empty() {
            self.ready.push_back(id);
        } else {
            self.ready.push_front(id);
        }
    }

    /// One scheduling tick: dispatch as much of the ready queue as the caps
    /// allow. Browser commands held back by the browser cap are requeued at
    /// the back and `reschedule` is set.
    pub fn schedule(&mut self, graph: &CommandGraph) -> ScheduleOutcome {
        let mut outcome = ScheduleOutcome::default();

        let mut considered = 0;
        let budget = self.ready.len();
        while considered < budget && self.in_flight < self.max_processes {
            let Some(id) = self.ready.pop_front() else {
                break;
            };
            considered += 1;

            let browser = graph.node(id).command().is_browser();
            if browser && self.browser_in_flight >= self.max_browser_processes {
                self.ready.push_back(id);
                outcome.reschedule = true;
                continue;
            }

            self.in_flight += 1;
            if browser {
                self.browser_in_flight += 1;
            }
            outcome.dispatched.push(id);
        }

        if outcome.reschedule && self.tick_pending {
            // A retry tick is already on its way.
            outcome.reschedule = false;
        } else if outcome.reschedule {
            self.tick_pending = true;
        }

        outcome
    }

    /// Mark a delayed retry tick as delivered.
    pub fn on_tick(&mut self) {
        self.tick_pending = false;
    }

    /// Account for a finished command and report its result to the graph.
    pub fn on_command_finished(
        &mut self,
        graph: &mut CommandGraph,
        id: NodeId,
        output: &CommandOutput,
    ) {
        self.in_flight -= 1;
        if graph.node(id).command().is_browser() {
            self.browser_in_flight -= 1;
        }
        self.finished_commands += 1;

        let state = if output.can_run_dependent_commands() {
            NodeState::Successful
        } else {
            NodeState::Failed
        };
        debug!(
            node = id,
            command = %output.command.display_name(),
            exit_code = output.exit_code,
            timed_out = output.timed_out,
            ?state,
            "command finished"
        );
        graph.change_state(id, state);
    }

    /// The run is drained: graph sealed, nothing queued or in flight, and no
    /// node left in a pre-terminal state.
    pub fn is_done(&self, graph: &CommandGraph) -> bool {
        graph.is_sealed()
            && self.ready.is_empty()
            && self.in_flight == 0
            && graph.state_count(NodeState::Initialized) == 0
            && graph.state_count(NodeState::Waiting) == 0
            && graph.state_count(NodeState::Enqueuing) == 0
            && graph.state_count(NodeState::Processing) == 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn browser_in_flight(&self) -> usize {
        self.browser_in_flight
    }

    pub fn finished_commands(&self) -> usize {
        self.finished_commands
    }

    /// Queue contents for the inactivity watchdog dump.
    pub fn dump(&self, graph: &CommandGraph) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "command queue: {} ready, {} in flight ({} browser)",
            self.ready.len(),
            self.in_flight,
            self.browser_in_flight
        );
        for id in &self.ready {
            let _ = writeln!(out, "  ready: {}", graph.node(*id).command().display_name());
        }
        if !self.ready.is_empty() && self.in_flight == 0 {
            warn!("ready commands but nothing in flight; caps may be misconfigured");
        }
        out
    }
}
