// src/graph/graph.rs

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::command::Command;

/// Index of a node in the graph. Nodes are never removed, so ids stay valid
/// for the life of the run.
pub type NodeId = usize;

/// State of a graph node.
///
/// Transitions are strictly monotone in declaration order and the last three
/// states are terminal; a node never leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeState {
    Initialized,
    Waiting,
    Enqueuing,
    Processing,
    Successful,
    Failed,
    UnableToRun,
}

impl NodeState {
    pub const COUNT: usize = 7;

    pub const ALL: [NodeState; NodeState::COUNT] = [
        NodeState::Initialized,
        NodeState::Waiting,
        NodeState::Enqueuing,
        NodeState::Processing,
        NodeState::Successful,
        NodeState::Failed,
        NodeState::UnableToRun,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Successful | NodeState::Failed | NodeState::UnableToRun
        )
    }
}

/// A command plus its scheduling state and adjacency.
#[derive(Debug)]
pub struct Node {
    command: Arc<Command>,
    state: NodeState,
    dependencies: Vec<NodeId>,
    needed_for: Vec<NodeId>,
    timing_dependency: bool,
}

impl Node {
    pub fn command(&self) -> &Arc<Command> {
        &self.command
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Nodes that must reach a terminal state before this one can run.
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Nodes waiting on this one.
    pub fn needed_for(&self) -> &[NodeId] {
        &self.needed_for
    }

    /// When set, this node may advance once its dependencies finish,
    /// regardless of their success.
    pub fn timing_dependency(&self) -> bool {
        self.timing_dependency
    }
}

/// Event emitted by the graph, drained synchronously by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEvent {
    Added(NodeId),
    StateChanged {
        node: NodeId,
        from: NodeState,
        to: NodeState,
    },
    Sealed,
}

/// Typed DAG of commands. The graph exclusively owns its nodes; observers
/// look nodes up by id.
#[derive(Debug, Default)]
pub struct CommandGraph {
    nodes: Vec<Node>,
    state_counts: [usize; NodeState::COUNT],
    sealed: bool,
    events: VecDeque<GraphEvent>,
}

impl CommandGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node for `command` with the given dependencies.
    ///
    /// Callers deduplicate by command identity before calling; the graph
    /// itself never merges nodes. Panics when the graph is sealed.
    pub fn add(
        &mut self,
        command: Arc<Command>,
        dependencies: Vec<NodeId>,
        timing_dependency: bool,
    ) -> NodeId {
        assert!(!self.sealed, "add called on a sealed graph");

        let id = self.nodes.len();
        for dep in &dependencies {
            self.nodes[*dep].needed_for.push(id);
        }
        debug!(
            node = id,
            command = %command.display_name(),
            deps = dependencies.len(),
            timing_dependency,
            "graph: node added"
        );
        self.nodes.push(Node {
            command,
            state: NodeState::Initialized,
            dependencies,
            needed_for: Vec::new(),
            timing_dependency,
        });
        self.state_counts[NodeState::Initialized as usize] += 1;
        self.events.push_back(GraphEvent::Added(id));
        id
    }

    /// Transition a node to a new state.
    ///
    /// Panics on a non-monotone transition or on any transition away from a
    /// terminal state; both indicate a scheduler bug.
    pub fn change_state(&mut self, id: NodeId, to: NodeState) {
        let node = &mut self.nodes[id];
        let from = node.state;
        assert!(
            !from.is_terminal() && from < to,
            "illegal state transition {:?} -> {:?} for '{}'",
            from,
            to,
            node.command.display_name()
        );

        node.state = to;
        self.state_counts[from as usize] -= 1;
        self.state_counts[to as usize] += 1;
        self.events
            .push_back(GraphEvent::StateChanged { node: id, from, to });
    }

    /// Forbid further `add` calls and emit the sealed event.
    pub fn seal(&mut self) {
        assert!(!self.sealed, "seal called twice");
        self.sealed = true;
        self.events.push_back(GraphEvent::Sealed);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        0..self.nodes.len()
    }

    pub fn state_count(&self, state: NodeState) -> usize {
        self.state_counts[state as usize]
    }

    /// Next pending event, in the order transitions occurred.
    pub fn pop_event(&mut self) -> Option<GraphEvent> {
        self.events.pop_front()
    }
}
