//! This module contains the per-block classification of persistent-storage
//! accesses.
//!
//! # Conservative Classification
//!
//! Each block is scanned with an abstract operand stack ([`crate::value`]).
//! Where the slot-address operand of an `SLOAD`/`SSTORE` is a known literal,
//! the slot index is recorded exactly; where it is not statically
//! determinable—a hashed mapping key, a computed index—the block's
//! unknown-access flag for that direction is set instead. Dropping such an
//! access would be unsound: any downstream conflict detection must assume an
//! unknown access touches every slot.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    cfg::{BasicBlock, ControlFlowGraph},
    utility::U256Wrapper,
    value::{AbstractStack, StorageEvent},
};

/// The storage accesses performed by a single basic block.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageAccessSet {
    /// The slots read with statically known indices.
    known_reads: BTreeSet<U256Wrapper>,

    /// The slots written with statically known indices.
    known_writes: BTreeSet<U256Wrapper>,

    /// Whether the block reads at least one slot whose index is not
    /// statically determinable.
    unknown_reads: bool,

    /// Whether the block writes at least one slot whose index is not
    /// statically determinable.
    unknown_writes: bool,
}

impl StorageAccessSet {
    /// Records the `event` into the appropriate collection.
    pub fn record(&mut self, event: StorageEvent) {
        match event {
            StorageEvent::Read { slot } => match slot.as_known() {
                Some(index) => {
                    self.known_reads.insert(index.into());
                }
                None => self.unknown_reads = true,
            },
            StorageEvent::Write { slot } => match slot.as_known() {
                Some(index) => {
                    self.known_writes.insert(index.into());
                }
                None => self.unknown_writes = true,
            },
        }
    }

    /// Gets the slots read with statically known indices.
    #[must_use]
    pub fn known_reads(&self) -> &BTreeSet<U256Wrapper> {
        &self.known_reads
    }

    /// Gets the slots written with statically known indices.
    #[must_use]
    pub fn known_writes(&self) -> &BTreeSet<U256Wrapper> {
        &self.known_writes
    }

    /// Checks whether the block reads any slot with a non-determinable index.
    #[must_use]
    pub fn has_unknown_reads(&self) -> bool {
        self.unknown_reads
    }

    /// Checks whether the block writes any slot with a non-determinable
    /// index.
    #[must_use]
    pub fn has_unknown_writes(&self) -> bool {
        self.unknown_writes
    }

    /// Checks whether the block performs any storage access at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known_reads.is_empty()
            && self.known_writes.is_empty()
            && !self.unknown_reads
            && !self.unknown_writes
    }

    /// Checks whether the accesses of this block may conflict with those of
    /// `other`: a write on either side overlapping any access on the other.
    ///
    /// Unknown-index accesses are assumed to touch every slot, so a write
    /// with an unknown index conflicts with any access on the other side, and
    /// a known write conflicts with the other side's unknown accesses. This
    /// over-approximation is deliberate; false negatives here would hide real
    /// conflicts from a vulnerability-detection layer.
    #[must_use]
    pub fn may_conflict_with(&self, other: &Self) -> bool {
        if self.unknown_writes && !other.is_empty() {
            return true;
        }
        if other.unknown_writes && !self.is_empty() {
            return true;
        }

        let overlaps = |writes: &BTreeSet<U256Wrapper>, other: &StorageAccessSet| {
            if writes.is_empty() {
                return false;
            }
            if other.unknown_reads || other.unknown_writes {
                return true;
            }
            writes
                .iter()
                .any(|slot| other.known_reads.contains(slot) || other.known_writes.contains(slot))
        };

        overlaps(&self.known_writes, other) || overlaps(&other.known_writes, self)
    }
}

/// Classifies the storage accesses of a single `block`.
#[must_use]
pub fn analyze_block(block: &BasicBlock) -> StorageAccessSet {
    let mut stack = AbstractStack::new();
    let mut accesses = StorageAccessSet::default();

    for instruction in block.instructions() {
        if let Some(event) = stack.apply(instruction) {
            accesses.record(event);
        }
    }

    accesses
}

/// Classifies the storage accesses of every block in `graph`, keyed by block
/// start offset.
#[must_use]
pub fn analyze(graph: &ControlFlowGraph) -> BTreeMap<u32, StorageAccessSet> {
    graph
        .blocks()
        .iter()
        .map(|(start, block)| (*start, analyze_block(block)))
        .collect()
}

#[cfg(test)]
mod test {
    use crate::{
        cfg::ControlFlowGraph,
        disassembly::InstructionStream,
        storage::{analyze, analyze_block},
        utility::U256W,
    };

    #[test]
    fn records_a_known_slot_write() {
        // PUSH1 0x2a; PUSH1 0x00; SSTORE; STOP — store 42 to slot 0.
        let bytes = [0x60, 0x2a, 0x60, 0x00, 0x55, 0x00];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let graph = ControlFlowGraph::new(&stream);

        let accesses = analyze_block(graph.entry_block());
        assert!(accesses.known_writes().contains(&U256W::from(0_usize)));
        assert!(accesses.known_reads().is_empty());
        assert!(!accesses.has_unknown_reads());
        assert!(!accesses.has_unknown_writes());
    }

    #[test]
    fn records_the_same_slot_in_read_and_write_sets() {
        // PUSH1 0x05; SLOAD; PUSH1 0x05; SSTORE; STOP — increment-style
        // access to slot 5 in both directions.
        let bytes = [0x60, 0x05, 0x54, 0x60, 0x05, 0x55, 0x00];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let graph = ControlFlowGraph::new(&stream);

        let accesses = analyze_block(graph.entry_block());
        assert!(accesses.known_reads().contains(&U256W::from(5_usize)));
        assert!(accesses.known_writes().contains(&U256W::from(5_usize)));
    }

    #[test]
    fn flags_an_unknown_slot_instead_of_dropping_it() {
        // CALLDATALOAD produces the slot index, so it cannot be known.
        // PUSH1 0x00; CALLDATALOAD; SLOAD; POP; STOP
        let bytes = [0x60, 0x00, 0x35, 0x54, 0x50, 0x00];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let graph = ControlFlowGraph::new(&stream);

        let accesses = analyze_block(graph.entry_block());
        assert!(accesses.has_unknown_reads());
        assert!(!accesses.has_unknown_writes());
        assert!(accesses.known_reads().is_empty());
    }

    #[test]
    fn analyzes_every_block_of_the_graph() {
        // Block at 0 writes slot 0, block at 6 writes slot 1.
        // PUSH1 0x01; PUSH1 0x00; SSTORE; STOP; ...
        let bytes = [
            0x60, 0x01, 0x60, 0x00, 0x55, 0x00, // entry block
            0x5b, 0x60, 0x02, 0x60, 0x01, 0x55, 0x00, // block at 6
        ];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let graph = ControlFlowGraph::new(&stream);

        let summary = analyze(&graph);
        assert_eq!(summary.len(), 2);
        assert!(summary[&0].known_writes().contains(&U256W::from(0_usize)));
        assert!(summary[&6].known_writes().contains(&U256W::from(1_usize)));
    }

    #[test]
    fn unknown_writes_conflict_with_everything() {
        let bytes_unknown = [0x60, 0x00, 0x35, 0x60, 0x00, 0x35, 0x55, 0x00];
        let bytes_known = [0x60, 0x01, 0x60, 0x07, 0x55, 0x00];

        let stream_unknown =
            InstructionStream::try_from(bytes_unknown.as_slice()).expect("Parsing failed");
        let graph_unknown = ControlFlowGraph::new(&stream_unknown);
        let unknown = analyze_block(graph_unknown.entry_block());

        let stream_known =
            InstructionStream::try_from(bytes_known.as_slice()).expect("Parsing failed");
        let graph_known = ControlFlowGraph::new(&stream_known);
        let known = analyze_block(graph_known.entry_block());

        assert!(unknown.has_unknown_writes());
        assert!(unknown.may_conflict_with(&known));
        assert!(known.may_conflict_with(&unknown));
    }
}
