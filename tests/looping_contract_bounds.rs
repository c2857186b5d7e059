//! This module provides integration tests that ensure that exploration of
//! looping bytecode always terminates, and that the watchdog can wind an
//! exploration down early while still producing a fully-resolved tree.
#![cfg(test)]

use std::sync::{atomic::AtomicBool, Arc};

use bytecode_path_analyzer as bpa;
use bytecode_path_analyzer::{
    explorer::{tree::NodeStatus, Config},
    solver::ConstantFoldingSolver,
    watchdog::{FlagWatchdog, LazyWatchdog},
};

mod common;

/// JUMPDEST; PUSH1 0x00; CALLDATALOAD; PUSH1 0x00; JUMPI; STOP — a counted
/// loop whose continue condition stays symbolic on every iteration.
const SYMBOLIC_LOOP: &str = "0x5b60003560005700";

#[test]
fn a_symbolic_loop_terminates_under_the_default_bounds() -> anyhow::Result<()> {
    let analysis = common::analyze_bytecode(SYMBOLIC_LOOP, LazyWatchdog.in_arc())?;
    let results = analysis.state();
    let exploration = &results.exploration;

    // The looping branch is eventually given up on rather than followed
    // forever, and the abandonment is visible in the statistics.
    assert!(exploration.stats.bound_exceeded > 0);

    // Whatever was abandoned, every node handed back is resolved.
    for node in exploration.tree.nodes() {
        assert_ne!(node.status(), NodeStatus::Open);
    }
    assert!(exploration
        .tree
        .nodes()
        .iter()
        .any(|node| node.status() == NodeStatus::UnknownBounded));

    Ok(())
}

#[test]
fn a_tripped_watchdog_resolves_the_frontier_to_unknown_bounded() -> anyhow::Result<()> {
    let flag = Arc::new(AtomicBool::new(true));
    let watchdog = FlagWatchdog::new(flag).polling_every(1).in_arc();

    let bytecode = common::get_bytecode_from_string(SYMBOLIC_LOOP)?;
    let analysis = bpa::new(bytecode)
        .analyze(
            Config::default(),
            ConstantFoldingSolver.in_arc(),
            watchdog,
        )
        .map_err(|e| anyhow::anyhow!("Analysis failed: {e}"))?;
    let exploration = &analysis.state().exploration;

    assert!(exploration.stats.cancelled_paths > 0);
    for node in exploration.tree.nodes() {
        assert_ne!(node.status(), NodeStatus::Open);
    }

    Ok(())
}
