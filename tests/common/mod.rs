//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use anyhow::anyhow;
use bytecode_path_analyzer as bpa;
use bytecode_path_analyzer::{
    analyzer::{state, Analyzer},
    explorer,
    solver::ConstantFoldingSolver,
    watchdog::DynWatchdog,
};

/// Runs the whole analysis pipeline over the hex-encoded (with or without
/// the `0x` prefix) bytecode provided in `code`.
///
/// It uses the default exploration bounds and the built-in constant-folding
/// solver.
#[allow(unused)] // It is actually
pub fn analyze_bytecode(
    code: impl Into<String>,
    watchdog: DynWatchdog,
) -> anyhow::Result<Analyzer<state::ExplorationComplete>> {
    let bytecode = get_bytecode_from_string(code)?;

    let analyzer = bpa::new(bytecode)
        .analyze(
            explorer::Config::default(),
            ConstantFoldingSolver.in_arc(),
            watchdog,
        )
        .map_err(|e| anyhow!("Analysis failed: {e}"))?;

    Ok(analyzer)
}

/// Gets the bytecode from the provided hex-encoded string `code`.
///
/// This hex-encoded string may or may not start with the `0x` prefix. Both
/// cases will be handled.
pub fn get_bytecode_from_string(code: impl Into<String>) -> anyhow::Result<Vec<u8>> {
    let bytecode_string = code.into();
    // Remove the 0x if it is present
    let no_0x_prefix = match bytecode_string.strip_prefix("0x") {
        Some(no_0x_prefix) => no_0x_prefix,
        None => &bytecode_string,
    };

    let bytecode = hex::decode(no_0x_prefix).map_err(|_| anyhow!("Could not decode hex"))?;
    Ok(bytecode)
}
