// src/enqueue/commands.rs

//! Promotion of graph nodes whose dependencies are satisfied.

use tracing::debug;

use crate::graph::{CommandGraph, NodeId, NodeState};

/// Watches graph events and promotes nodes out of `Initialized`/`Waiting`.
///
/// Promotion rules:
/// - any dependency failed or unable to run, and the node is not a timing
///   dependency: `UnableToRun`
/// - all dependencies terminal, and either all successful or the node is a
///   timing dependency: `Enqueuing`
/// - otherwise the node (re)enters `Waiting`.
#[derive(Debug, Default)]
pub struct CommandEnqueuer;

impl CommandEnqueuer {
    pub fn new() -> Self {
        Self
    }

    pub fn on_node_added(&self, graph: &mut CommandGraph, id: NodeId) {
        self.promote_if_ready(graph, id);
    }

    pub fn on_state_changed(&self, graph: &mut CommandGraph, id: NodeId, to: NodeState) {
        if !to.is_terminal() {
            return;
        }
        let dependents: Vec<NodeId> = graph.node(id).needed_for().to_vec();
        for dependent in dependents {
            self.promote_if_ready(graph, dependent);
        }
    }

    fn promote_if_ready(&self, graph: &mut CommandGraph, id: NodeId) {
        let node = graph.node(id);
        if !matches!(node.state(), NodeState::Initialized | NodeState::Waiting) {
            return;
        }

        let timing = node.timing_dependency();
        let mut any_unsuccessful = false;
        let mut all_terminal = true;
        let mut all_successful = true;
        for dep in node.dependencies() {
            let state = graph.node(*dep).state();
            match state {
                NodeState::Failed | NodeState::UnableToRun => {
                    any_unsuccessful = true;
                    all_successful = false;
                }
                NodeState::Successful => {}
                _ => {
                    all_terminal = false;
                    all_successful = false;
                }
            }
        }

        let new_state = if any_unsuccessful && !timing {
            NodeState::UnableToRun
        } else if all_successful || (all_terminal && timing) {
            NodeState::Enqueuing
        } else {
            NodeState::Waiting
        };

        if new_state != graph.node(id).state() {
            debug!(
                node = id,
                command = %graph.node(id).command().display_name(),
                ?new_state,
                "promoting node"
            );
            graph.change_state(id, new_state);
        }
    }
}
