//! This module contains the state tracking functionality for the analyzer.

use std::{collections::BTreeMap, fmt::Debug};

use crate::{
    cfg::ControlFlowGraph,
    disassembly::InstructionStream,
    explorer::Exploration,
    storage::StorageAccessSet,
};

/// A marker trait that says that the type implementing it is an analyzer state.
pub trait State
where
    Self: Clone + Debug + Sized,
{
}

/// The initial state for the analyzer.
#[derive(Clone, Debug)]
pub struct HasBytecode;
impl State for HasBytecode {}

/// The analyzer has successfully disassembled the bytecode.
#[derive(Clone, Debug)]
pub struct DisassemblyComplete {
    /// The disassembled instruction stream for the bytecode being analyzed.
    pub instructions: InstructionStream,
}
impl State for DisassemblyComplete {}

/// The analyzer has partitioned the instruction stream into basic blocks and
/// derived the typed edges between them.
#[derive(Clone, Debug)]
pub struct CfgComplete {
    /// The disassembled instruction stream for the bytecode being analyzed.
    pub instructions: InstructionStream,

    /// The control-flow graph built over the instruction stream.
    pub graph: ControlFlowGraph,
}
impl State for CfgComplete {}

/// The analyzer has classified the storage accesses of every block in the
/// graph.
#[derive(Clone, Debug)]
pub struct AccessAnalysisComplete {
    /// The disassembled instruction stream for the bytecode being analyzed.
    pub instructions: InstructionStream,

    /// The control-flow graph built over the instruction stream.
    pub graph: ControlFlowGraph,

    /// The storage access classification for each block, keyed by the
    /// block's start offset.
    pub accesses: BTreeMap<u32, StorageAccessSet>,
}
impl State for AccessAnalysisComplete {}

/// The analyzer has symbolically explored the graph.
#[derive(Clone, Debug)]
pub struct ExplorationComplete {
    /// The disassembled instruction stream for the bytecode being analyzed.
    pub instructions: InstructionStream,

    /// The control-flow graph built over the instruction stream.
    pub graph: ControlFlowGraph,

    /// The storage access classification for each block, keyed by the
    /// block's start offset.
    pub accesses: BTreeMap<u32, StorageAccessSet>,

    /// The symbolic execution tree and the statistics gathered while
    /// growing it.
    pub exploration: Exploration,
}
impl State for ExplorationComplete {}
