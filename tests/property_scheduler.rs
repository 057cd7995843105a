// tests/property_scheduler.rs

//! Property test: random suites always drain the queue and emit every test
//! case exactly once, without ever exceeding the process cap.
//!
//! The core is deterministic and synchronous, so this drives it directly:
//! each dispatched command is completed in FIFO order with a scripted
//! outcome.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use proptest::prelude::*;

use testdag::command::Command;
use testdag::enqueue::{TestInfoCache, TestSuite};
use testdag::graph::NodeId;
use testdag::harness::core::{CoreAction, HarnessCore, HarnessEvent};
use testdag::output::CommandOutput;
use testdag_test_utils::builders::{process_command, ConfigBuilder, StaticSuite, TestCaseBuilder};

#[derive(Debug, Clone)]
struct Plan {
    /// Command-name chains, one per test case.
    ///
    /// Chains are prefixes of a per-family command list, so commands are
    /// only ever shared as chain prefixes (the shared-compile shape); a
    /// shared suffix could leave a test case without any output.
    cases: Vec<Vec<String>>,
    failing: Vec<String>,
    repeat: usize,
    max_processes: usize,
}

fn plan_strategy() -> impl Strategy<Value = Plan> {
    let case = (0..4usize, 1..4usize).prop_map(|(family, len)| {
        (0..len)
            .map(|i| format!("f{family}-cmd-{i}"))
            .collect::<Vec<String>>()
    });
    let all_names: Vec<String> = (0..4)
        .flat_map(|f| (0..3).map(move |i| format!("f{f}-cmd-{i}")))
        .collect();
    (
        proptest::collection::vec(case, 1..8),
        proptest::sample::subsequence(all_names, 0..5),
        1..3usize,
        1..4usize,
    )
        .prop_map(|(cases, failing, repeat, max_processes)| Plan {
            cases,
            failing,
            repeat,
            max_processes,
        })
}

fn absorb(
    actions: Vec<CoreAction>,
    pending: &mut VecDeque<(NodeId, Arc<Command>)>,
    emitted: &mut usize,
) {
    for action in actions {
        match action {
            CoreAction::Dispatch { node, command, .. } => {
                pending.push_back((node, command));
            }
            CoreAction::EmitTestCase(_) => *emitted += 1,
            CoreAction::ScheduleTick(_) | CoreAction::Cleanup | CoreAction::AllDone => {}
        }
    }
}

proptest! {
    #[test]
    fn random_suites_drain_and_emit_each_case_once(plan in plan_strategy()) {
        let config = ConfigBuilder::new()
            .repeat(plan.repeat)
            .max_processes(plan.max_processes)
            .build();

        let cases: Vec<_> = plan
            .cases
            .iter()
            .enumerate()
            .map(|(i, chain)| {
                let mut builder = TestCaseBuilder::new(&format!("case-{i}"), config.clone());
                for name in chain {
                    builder = builder.command(process_command(name));
                }
                builder.build()
            })
            .collect();
        let expected_emissions = cases.len() * plan.repeat;

        let mut suites: Vec<Box<dyn TestSuite>> =
            vec![Box::new(StaticSuite::new("prop", cases))];
        let mut core = HarnessCore::new(config);
        let mut cache = TestInfoCache::new();
        let (added, initial) = core.enqueue_test_suites(&mut suites, &mut cache);
        prop_assert_eq!(added, expected_emissions);

        let failing: HashSet<String> = plan.failing.into_iter().collect();
        let mut pending: VecDeque<(NodeId, Arc<Command>)> = VecDeque::new();
        let mut emitted = 0usize;

        absorb(initial, &mut pending, &mut emitted);
        prop_assert!(pending.len() <= plan.max_processes);

        let mut steps = 0;
        while let Some((node, command)) = pending.pop_front() {
            steps += 1;
            prop_assert!(steps < 10_000, "simulation did not converge");

            let exit_code = if failing.contains(command.display_name()) { 1 } else { 0 };
            let output =
                CommandOutput::new(command, exit_code, std::time::Duration::ZERO);
            let step = core.step(HarnessEvent::CommandFinished { node, output });
            absorb(step.actions, &mut pending, &mut emitted);

            prop_assert!(
                pending.len() <= plan.max_processes,
                "in-flight exceeded the process cap"
            );
        }

        prop_assert!(core.is_done(), "queue must drain once nothing is pending");
        prop_assert_eq!(emitted, expected_emissions);
    }
}
