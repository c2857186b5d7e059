//! This module contains the control-flow graph built over a disassembled
//! instruction stream: basic blocks keyed by start offset, and the typed
//! edges derived from each block's terminator.

pub mod block;
pub mod builder;

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;

pub use crate::cfg::block::{BasicBlock, Edge, EdgeKind, JumpTarget, Terminator};
use crate::disassembly::InstructionStream;

/// The directed graph of basic blocks and typed edges reconstructed from an
/// instruction stream.
///
/// # Determinism
///
/// Blocks are stored in a [`BTreeMap`] keyed by start offset and edges are
/// derived in ascending source order, so building the graph twice over
/// identical bytecode yields structurally identical results.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ControlFlowGraph {
    /// The basic blocks of the program, keyed by start offset.
    blocks: BTreeMap<u32, BasicBlock>,

    /// The typed edges between blocks, in ascending order of source offset.
    edges: Vec<Edge>,

    /// The start offset of the entry block.
    entry: u32,
}

impl ControlFlowGraph {
    /// Builds the control-flow graph for the provided `stream`.
    #[must_use]
    pub fn new(stream: &InstructionStream) -> Self {
        let blocks = builder::partition(stream);
        let edges = builder::derive_edges(&blocks);
        let entry = stream.instructions()[0].offset();
        Self {
            blocks,
            edges,
            entry,
        }
    }

    /// Gets the basic blocks of the graph, keyed by start offset.
    #[must_use]
    pub fn blocks(&self) -> &BTreeMap<u32, BasicBlock> {
        &self.blocks
    }

    /// Gets the block beginning at the provided `offset`, if one does.
    #[must_use]
    pub fn block_at(&self, offset: u32) -> Option<&BasicBlock> {
        self.blocks.get(&offset)
    }

    /// Gets the entry block of the graph.
    #[must_use]
    pub fn entry_block(&self) -> &BasicBlock {
        &self.blocks[&self.entry]
    }

    /// Gets all edges of the graph, in ascending order of source offset.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        self.edges.as_slice()
    }

    /// Gets the edges leaving the block that begins at `source`.
    pub fn edges_from(&self, source: u32) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |edge| edge.source == source)
    }

    /// Gets the number of blocks in the graph.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Checks whether any edge in the graph has an unresolved target, which
    /// tells the caller that static analysis alone could not reconstruct all
    /// control flow.
    #[must_use]
    pub fn has_unresolved_edges(&self) -> bool {
        self.edges
            .iter()
            .any(|edge| edge.target == JumpTarget::Unresolved)
    }
}

/// Displays the graph as one line per block listing its out-edges, suitable
/// for quick inspection; serialization for external renderers should go
/// through [`serde`] instead.
impl std::fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for block in self.blocks.values() {
            let successors = self
                .edges_from(block.start())
                .map(|edge| match edge.target {
                    JumpTarget::Block(offset) => format!("{:?}->{offset}", edge.kind),
                    JumpTarget::Unresolved => format!("{:?}->?", edge.kind),
                })
                .join(", ");
            writeln!(
                f,
                "block {} [{:?}]: {successors}",
                block.start(),
                block.terminator()
            )?;
        }
        Ok(())
    }
}
