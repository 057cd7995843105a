// tests/enqueue.rs

use std::sync::Arc;

use testdag::command::Command;
use testdag::graph::CommandGraph;
use testdag::enqueue::TestCaseEnqueuer;
use testdag_test_utils::builders::{process_command, ConfigBuilder, TestCaseBuilder};

fn chain_case(name: &str, commands: &[Arc<Command>]) -> testdag::testcase::TestCase {
    let config = ConfigBuilder::new().build();
    let mut builder = TestCaseBuilder::new(name, config);
    for command in commands {
        builder = builder.command(command.clone());
    }
    builder.build()
}

#[test]
fn commands_within_a_test_case_form_a_chain() {
    let c1 = process_command("c1");
    let c2 = process_command("c2");
    let c3 = process_command("c3");

    let mut graph = CommandGraph::new();
    let mut enqueuer = TestCaseEnqueuer::new(1);
    enqueuer.enqueue(chain_case("t", &[c1.clone(), c2.clone(), c3.clone()]), &mut graph);

    assert_eq!(graph.len(), 3);
    let n1 = enqueuer.node_for(&c1).unwrap();
    let n2 = enqueuer.node_for(&c2).unwrap();
    let n3 = enqueuer.node_for(&c3).unwrap();
    assert!(graph.node(n1).dependencies().is_empty());
    assert_eq!(graph.node(n2).dependencies(), &[n1]);
    assert_eq!(graph.node(n3).dependencies(), &[n2]);
}

#[test]
fn a_single_command_test_case_gets_no_edges() {
    let c = process_command("only");
    let mut graph = CommandGraph::new();
    let mut enqueuer = TestCaseEnqueuer::new(1);
    enqueuer.enqueue(chain_case("t", &[c.clone()]), &mut graph);

    assert_eq!(graph.len(), 1);
    let node = enqueuer.node_for(&c).unwrap();
    assert!(graph.node(node).dependencies().is_empty());
    assert!(graph.node(node).needed_for().is_empty());
}

#[test]
fn equal_commands_share_one_node_across_test_cases() {
    let compile = process_command("compile-a");
    // Built separately but equal by content.
    let compile_again = process_command("compile-a");
    let run1 = process_command("run-a1");
    let run2 = process_command("run-a2");

    let mut graph = CommandGraph::new();
    let mut enqueuer = TestCaseEnqueuer::new(1);
    enqueuer.enqueue(chain_case("t1", &[compile.clone(), run1]), &mut graph);
    enqueuer.enqueue(chain_case("t2", &[compile_again.clone(), run2]), &mut graph);

    assert_eq!(graph.len(), 3);
    assert_eq!(
        enqueuer.node_for(&compile),
        enqueuer.node_for(&compile_again)
    );
    assert_eq!(enqueuer.subscribers_of(&compile), &[0, 1]);
    assert_eq!(enqueuer.test_case_count(), 2);
}

#[test]
fn repeat_copies_are_chained_with_timing_dependencies() {
    let c1 = process_command("c1");
    let c2 = process_command("c2");

    let mut graph = CommandGraph::new();
    let mut enqueuer = TestCaseEnqueuer::new(3);
    enqueuer.enqueue(chain_case("t", &[c1.clone(), c2.clone()]), &mut graph);

    // Three copies, two commands each, all distinct nodes.
    assert_eq!(graph.len(), 6);
    assert_eq!(enqueuer.test_case_count(), 3);

    let copy0_last = enqueuer.node_for(&c2).unwrap();
    let copy1_first = enqueuer
        .node_for(&Arc::new(c1.indexed_copy(1)))
        .unwrap();
    let node = graph.node(copy1_first);
    assert!(node.timing_dependency());
    assert_eq!(node.dependencies(), &[copy0_last]);

    // Copies with the same index are equal; different indices are not.
    assert_eq!(c1.indexed_copy(1), c1.indexed_copy(1));
    assert_ne!(c1.indexed_copy(1), c1.indexed_copy(2));
}

#[test]
fn discovered_test_information_is_cached_across_configurations() {
    use testdag::enqueue::{TestInfo, TestInfoCache, TestSuite};
    use testdag::expectation::ExpectationSet;

    struct CountingSuite {
        discoveries: usize,
    }

    impl TestSuite for CountingSuite {
        fn name(&self) -> &str {
            "counting"
        }

        fn test_cases(&mut self, cache: &mut TestInfoCache) -> Vec<testdag::testcase::TestCase> {
            let discoveries = &mut self.discoveries;
            let infos = cache.get_or_insert_with("counting", || {
                *discoveries += 1;
                vec![TestInfo {
                    path: "tests/one.src".into(),
                    intrinsic: ExpectationSet::EMPTY,
                }]
            });
            infos
                .iter()
                .map(|info| {
                    chain_case(
                        &format!("counting/{}", info.path.display()),
                        &[process_command("c")],
                    )
                })
                .collect()
        }
    }

    let mut suite = CountingSuite { discoveries: 0 };
    let mut cache = TestInfoCache::new();

    // Enumerated once per configuration; discovery runs only once.
    let first = suite.test_cases(&mut cache);
    let second = suite.test_cases(&mut cache);
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(suite.discoveries, 1);
}

#[test]
fn repeat_zero_is_treated_as_one() {
    let c = process_command("c");
    let mut graph = CommandGraph::new();
    let mut enqueuer = TestCaseEnqueuer::new(0);
    enqueuer.enqueue(chain_case("t", &[c]), &mut graph);

    assert_eq!(enqueuer.test_case_count(), 1);
    assert_eq!(graph.len(), 1);
}
