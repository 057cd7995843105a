// tests/graph.rs

use std::sync::Arc;

use testdag::command::Command;
use testdag::graph::{CommandGraph, GraphEvent, NodeState};

fn command(name: &str) -> Arc<Command> {
    Arc::new(Command::builder(name, "/usr/bin/true").build())
}

#[test]
fn added_nodes_start_initialized_and_wire_adjacency() {
    let mut graph = CommandGraph::new();
    let a = graph.add(command("a"), vec![], false);
    let b = graph.add(command("b"), vec![a], false);

    assert_eq!(graph.len(), 2);
    assert_eq!(graph.node(a).state(), NodeState::Initialized);
    assert_eq!(graph.node(b).dependencies(), &[a]);
    assert_eq!(graph.node(a).needed_for(), &[b]);
    assert_eq!(graph.state_count(NodeState::Initialized), 2);
}

#[test]
fn state_changes_update_counters_and_emit_events_in_order() {
    let mut graph = CommandGraph::new();
    let a = graph.add(command("a"), vec![], false);

    graph.change_state(a, NodeState::Enqueuing);
    graph.change_state(a, NodeState::Processing);
    graph.change_state(a, NodeState::Successful);
    graph.seal();

    assert_eq!(graph.state_count(NodeState::Initialized), 0);
    assert_eq!(graph.state_count(NodeState::Successful), 1);

    let mut events = Vec::new();
    while let Some(event) = graph.pop_event() {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            GraphEvent::Added(a),
            GraphEvent::StateChanged {
                node: a,
                from: NodeState::Initialized,
                to: NodeState::Enqueuing
            },
            GraphEvent::StateChanged {
                node: a,
                from: NodeState::Enqueuing,
                to: NodeState::Processing
            },
            GraphEvent::StateChanged {
                node: a,
                from: NodeState::Processing,
                to: NodeState::Successful
            },
            GraphEvent::Sealed,
        ]
    );
}

#[test]
#[should_panic(expected = "illegal state transition")]
fn leaving_a_terminal_state_panics() {
    let mut graph = CommandGraph::new();
    let a = graph.add(command("a"), vec![], false);
    graph.change_state(a, NodeState::Enqueuing);
    graph.change_state(a, NodeState::Processing);
    graph.change_state(a, NodeState::Successful);
    graph.change_state(a, NodeState::Failed);
}

#[test]
#[should_panic(expected = "illegal state transition")]
fn moving_backwards_panics() {
    let mut graph = CommandGraph::new();
    let a = graph.add(command("a"), vec![], false);
    graph.change_state(a, NodeState::Processing);
    graph.change_state(a, NodeState::Waiting);
}

#[test]
#[should_panic(expected = "sealed")]
fn adding_to_a_sealed_graph_panics() {
    let mut graph = CommandGraph::new();
    graph.seal();
    graph.add(command("late"), vec![], false);
}
