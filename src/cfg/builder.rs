//! This module contains the construction of the control-flow graph: the
//! partitioning of an instruction stream into basic blocks, and the
//! derivation of the typed edges between them.

use std::collections::BTreeMap;

use ethnum::U256;

use crate::{
    cfg::block::{BasicBlock, Edge, EdgeKind, JumpTarget, Terminator},
    disassembly::{Instruction, InstructionStream},
    opcode::Opcode,
};

/// Partitions the provided `stream` into basic blocks keyed by their start
/// offset.
///
/// A new block begins at the entry instruction, at every instruction
/// immediately following a terminator, and at every `JUMPDEST`. The last rule
/// holds regardless of what precedes the `JUMPDEST`: backward jumps target
/// destinations that appear mid-stream relative to sequential scan order, and
/// merging them into a straight-line block would corrupt every graph built
/// downstream.
///
/// The partitioning is a single pure fold over the instructions, threading an
/// explicit accumulator of sealed blocks and the in-progress run.
#[must_use]
pub fn partition(stream: &InstructionStream) -> BTreeMap<u32, BasicBlock> {
    let accumulator = stream.instructions().iter().fold(
        Accumulator::default(),
        |mut accumulator, instruction| {
            if instruction.opcode() == Opcode::JumpDest {
                accumulator.seal();
            }
            accumulator.pending.push(*instruction);
            if instruction.opcode().is_terminator() {
                accumulator.seal();
            }
            accumulator
        },
    );

    accumulator.finish()
}

/// The fold accumulator for [`partition`].
#[derive(Debug, Default)]
struct Accumulator {
    /// The blocks sealed so far, keyed by start offset.
    blocks: BTreeMap<u32, BasicBlock>,

    /// The instructions of the block currently being accumulated.
    pending: Vec<Instruction>,
}

impl Accumulator {
    /// Seals the in-progress run of instructions into a block, if the run is
    /// non-empty.
    fn seal(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let block = BasicBlock::new(std::mem::take(&mut self.pending));
        self.blocks.insert(block.start(), block);
    }

    /// Seals any trailing run and returns the completed block mapping.
    fn finish(mut self) -> BTreeMap<u32, BasicBlock> {
        self.seal();
        self.blocks
    }
}

/// Derives the outgoing edges for every block in `blocks`.
///
/// Edges are emitted in ascending order of source block, with the true branch
/// of a conditional jump always preceding the false branch. Targets that
/// cannot be determined statically are emitted as [`JumpTarget::Unresolved`]
/// rather than being dropped.
#[must_use]
pub fn derive_edges(blocks: &BTreeMap<u32, BasicBlock>) -> Vec<Edge> {
    let mut edges = Vec::new();

    for block in blocks.values() {
        let source = block.start();
        match block.terminator() {
            Terminator::UnconditionalJump => {
                edges.push(Edge {
                    source,
                    target: resolve_static_target(block, blocks),
                    kind: EdgeKind::Unconditional,
                });
            }
            Terminator::ConditionalJump => {
                edges.push(Edge {
                    source,
                    target: resolve_static_target(block, blocks),
                    kind: EdgeKind::CondTrue,
                });
                edges.push(Edge {
                    source,
                    target: sequential_successor(block, blocks),
                    kind: EdgeKind::CondFalse,
                });
            }
            Terminator::Halt => {}
            Terminator::Fallthrough => {
                // A trailing block with nothing after it simply runs off the
                // end of the code, which halts; only emit the edge when a
                // sequential successor exists.
                if let JumpTarget::Block(next) = sequential_successor(block, blocks) {
                    edges.push(Edge {
                        source,
                        target: JumpTarget::Block(next),
                        kind: EdgeKind::Fallthrough,
                    });
                }
            }
        }
    }

    edges
}

/// Resolves the jump target for the terminator of `block`, if the
/// instruction immediately preceding the jump pushed a literal equal to the
/// offset of a `JUMPDEST`-led block.
fn resolve_static_target(
    block: &BasicBlock,
    blocks: &BTreeMap<u32, BasicBlock>,
) -> JumpTarget {
    let Some(literal) = block.literal_before_terminator() else {
        return JumpTarget::Unresolved;
    };
    let Ok(offset) = u32::try_from(literal) else {
        return JumpTarget::Unresolved;
    };
    let valid_destination = blocks
        .get(&offset)
        .is_some_and(|target| target.instructions()[0].opcode() == Opcode::JumpDest);

    if valid_destination {
        JumpTarget::Block(offset)
    } else {
        JumpTarget::Unresolved
    }
}

/// Gets the block beginning at the next sequential offset after `block`, as
/// a jump target.
fn sequential_successor(block: &BasicBlock, blocks: &BTreeMap<u32, BasicBlock>) -> JumpTarget {
    let next = block.end_offset();
    if blocks.contains_key(&next) {
        JumpTarget::Block(next)
    } else {
        JumpTarget::Unresolved
    }
}

/// Checks whether `literal` names the offset of a `JUMPDEST`-led block in
/// `blocks`.
#[must_use]
pub fn is_jump_destination(literal: U256, blocks: &BTreeMap<u32, BasicBlock>) -> bool {
    let Ok(offset) = u32::try_from(literal) else {
        return false;
    };
    blocks
        .get(&offset)
        .is_some_and(|target| target.instructions()[0].opcode() == Opcode::JumpDest)
}

#[cfg(test)]
mod test {
    use crate::{
        cfg::{
            block::{EdgeKind, JumpTarget, Terminator},
            builder::{derive_edges, partition},
        },
        disassembly::InstructionStream,
        opcode::Opcode,
    };

    #[test]
    fn starts_a_new_block_at_every_jumpdest() {
        // PUSH1 0x00; JUMPDEST; ADD; JUMPDEST; STOP — neither JUMPDEST is
        // preceded by a terminator.
        let bytes = [0x60, 0x00, 0x5b, 0x01, 0x5b, 0x00];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let blocks = partition(&stream);

        let starts: Vec<u32> = blocks.keys().copied().collect();
        assert_eq!(starts, vec![0, 2, 4]);

        // No block contains a JUMPDEST in a non-leading position.
        for block in blocks.values() {
            for instruction in &block.instructions()[1..] {
                assert_ne!(instruction.opcode(), Opcode::JumpDest);
            }
        }
    }

    #[test]
    fn starts_a_new_block_after_every_terminator() {
        // STOP; ADD; JUMP; MUL; REVERT
        let bytes = [0x00, 0x01, 0x56, 0x02, 0xfd];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let blocks = partition(&stream);

        let starts: Vec<u32> = blocks.keys().copied().collect();
        assert_eq!(starts, vec![0, 1, 3]);
        assert_eq!(blocks[&0].terminator(), Terminator::Halt);
        assert_eq!(blocks[&1].terminator(), Terminator::UnconditionalJump);
        assert_eq!(blocks[&3].terminator(), Terminator::Halt);
    }

    #[test]
    fn assigns_every_instruction_to_exactly_one_block() {
        let bytes = [0x60, 0x05, 0x56, 0x01, 0x5b, 0x00];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let blocks = partition(&stream);

        let total: usize = blocks.values().map(|b| b.instructions().len()).sum();
        assert_eq!(total, stream.len());
    }

    #[test]
    fn emits_one_unconditional_edge_for_a_resolved_jump() {
        // PUSH1 0x04; JUMP; INVALID; JUMPDEST; STOP
        let bytes = [0x60, 0x04, 0x56, 0xfe, 0x5b, 0x00];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let blocks = partition(&stream);
        let edges = derive_edges(&blocks);

        let from_entry: Vec<_> = edges.iter().filter(|e| e.source == 0).collect();
        assert_eq!(from_entry.len(), 1);
        assert_eq!(from_entry[0].kind, EdgeKind::Unconditional);
        assert_eq!(from_entry[0].target, JumpTarget::Block(4));

        // No fallthrough edge accompanies the jump.
        assert!(!edges
            .iter()
            .any(|e| e.source == 0 && e.kind == EdgeKind::Fallthrough));
    }

    #[test]
    fn emits_an_unresolved_edge_for_a_dynamic_jump() {
        // CALLDATALOAD feeds the jump target, so it cannot be resolved.
        // PUSH1 0x00; CALLDATALOAD; JUMP; JUMPDEST; STOP
        let bytes = [0x60, 0x00, 0x35, 0x56, 0x5b, 0x00];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let blocks = partition(&stream);
        let edges = derive_edges(&blocks);

        let from_entry: Vec<_> = edges.iter().filter(|e| e.source == 0).collect();
        assert_eq!(from_entry.len(), 1);
        assert_eq!(from_entry[0].target, JumpTarget::Unresolved);
    }

    #[test]
    fn emits_exactly_two_edges_for_a_conditional_jump() {
        // PUSH1 0x01; PUSH1 0x06; JUMPI; STOP; JUMPDEST; STOP
        let bytes = [0x60, 0x01, 0x60, 0x06, 0x57, 0x00, 0x5b, 0x00];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let blocks = partition(&stream);
        let edges = derive_edges(&blocks);

        let from_entry: Vec<_> = edges.iter().filter(|e| e.source == 0).collect();
        assert_eq!(from_entry.len(), 2);
        assert_eq!(from_entry[0].kind, EdgeKind::CondTrue);
        assert_eq!(from_entry[0].target, JumpTarget::Block(6));
        assert_eq!(from_entry[1].kind, EdgeKind::CondFalse);
        assert_eq!(from_entry[1].target, JumpTarget::Block(5));
    }

    #[test]
    fn rejects_a_literal_target_that_is_not_a_jumpdest() {
        // PUSH1 0x04 targets the STOP at offset 4, which is not a JUMPDEST.
        let bytes = [0x60, 0x04, 0x56, 0xfe, 0x00];
        let stream = InstructionStream::try_from(bytes.as_slice()).expect("Parsing failed");
        let blocks = partition(&stream);
        let edges = derive_edges(&blocks);

        assert_eq!(edges[0].target, JumpTarget::Unresolved);
    }
}
