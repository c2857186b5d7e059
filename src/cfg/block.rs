//! This module contains the representation of basic blocks and the typed
//! edges that connect them.

use serde::{Deserialize, Serialize};

use crate::{disassembly::Instruction, opcode::Category};

/// The classification of the instruction that ends a basic block.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Terminator {
    /// The block ends with an unconditional `JUMP`.
    UnconditionalJump,

    /// The block ends with a conditional `JUMPI`.
    ConditionalJump,

    /// The block ends with an opcode that halts the execution path (`STOP`,
    /// `RETURN`, `REVERT`, `SELFDESTRUCT` or an invalid byte).
    Halt,

    /// The block ends only because the next instruction begins a new block,
    /// with execution falling through sequentially.
    Fallthrough,
}

impl Terminator {
    /// Classifies the terminator for a block whose final instruction has the
    /// provided `category`.
    #[must_use]
    pub fn from_category(category: Category) -> Self {
        match category {
            Category::Halt => Self::Halt,
            Category::UnconditionalJump => Self::UnconditionalJump,
            Category::ConditionalJump => Self::ConditionalJump,
            _ => Self::Fallthrough,
        }
    }
}

/// A maximal run of instructions with a single entry point and a single exit.
///
/// # Invariants
///
/// A block is never empty. Its first instruction is either the program's
/// entry point or a `JUMPDEST`; no `JUMPDEST` appears in a non-leading
/// position. The block is identified by [`Self::start`], the byte offset of
/// its first instruction.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BasicBlock {
    /// The byte offset at which the block begins; this doubles as the block's
    /// identifier within the graph.
    start: u32,

    /// The ordered instructions of the block.
    instructions: Vec<Instruction>,

    /// The classification of the block's final instruction.
    terminator: Terminator,
}

impl BasicBlock {
    /// Constructs a block from its non-empty `instructions`.
    ///
    /// # Panics
    ///
    /// Panics if `instructions` is empty. The partitioner never seals an
    /// empty block, so hitting this is a programmer bug.
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let first = instructions
            .first()
            .expect("A basic block cannot be built from zero instructions");
        let last = instructions
            .last()
            .expect("A basic block cannot be built from zero instructions");
        let start = first.offset();
        let terminator = Terminator::from_category(last.opcode().category());
        Self {
            start,
            instructions,
            terminator,
        }
    }

    /// Gets the byte offset at which the block begins.
    #[must_use]
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Gets the ordered instructions of the block.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        self.instructions.as_slice()
    }

    /// Gets the classification of the block's final instruction.
    #[must_use]
    pub fn terminator(&self) -> Terminator {
        self.terminator
    }

    /// Gets the block's final instruction.
    #[must_use]
    pub fn last_instruction(&self) -> &Instruction {
        self.instructions
            .last()
            .expect("A basic block is never empty")
    }

    /// Gets the byte offset immediately after the block, which is where the
    /// next sequential block begins if one exists.
    #[must_use]
    pub fn end_offset(&self) -> u32 {
        let last = self.last_instruction();
        last.offset() + last.size()
    }

    /// Gets the literal value pushed by the instruction immediately preceding
    /// the block's terminator, if there is such an instruction and it is a
    /// push of a literal.
    ///
    /// This is the basis of static jump-target resolution: a `JUMP`/`JUMPI`
    /// whose target was pushed as a literal directly before it can be
    /// resolved without symbolic execution.
    #[must_use]
    pub fn literal_before_terminator(&self) -> Option<ethnum::U256> {
        let penultimate = self.instructions.iter().nth_back(1)?;
        penultimate.push_literal()
    }
}

/// The kind of a control-flow edge.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum EdgeKind {
    /// The out-edge of a `JUMP`-terminated block.
    Unconditional,

    /// The taken branch of a `JUMPI`-terminated block.
    CondTrue,

    /// The not-taken branch of a `JUMPI`-terminated block, continuing at the
    /// next sequential offset.
    CondFalse,

    /// Sequential flow into the block that begins at the next offset.
    Fallthrough,
}

/// The destination of a control-flow edge.
///
/// Unresolved targets are first-class: they tell callers exactly where
/// static analysis was incomplete and symbolic exploration is required, and
/// must never be silently dropped.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum JumpTarget {
    /// The edge leads to the block beginning at this byte offset.
    Block(u32),

    /// The edge's destination could not be determined statically.
    Unresolved,
}

/// A directed, typed edge between two blocks in the graph.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Edge {
    /// The start offset of the block the edge leaves.
    pub source: u32,

    /// The destination of the edge.
    pub target: JumpTarget,

    /// The kind of control transfer the edge represents.
    pub kind: EdgeKind,
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::{
        cfg::block::{BasicBlock, Terminator},
        disassembly::Instruction,
        opcode::Opcode,
    };

    #[test]
    fn classifies_terminators_from_final_instructions() {
        let halt = BasicBlock::new(vec![Instruction::new(0, Opcode::Stop)]);
        assert_eq!(halt.terminator(), Terminator::Halt);

        let jump = BasicBlock::new(vec![
            Instruction::new_push(0, Opcode::PushN(1), U256::from(4_u8)),
            Instruction::new(2, Opcode::Jump),
        ]);
        assert_eq!(jump.terminator(), Terminator::UnconditionalJump);
        assert_eq!(jump.end_offset(), 3);
        assert_eq!(jump.literal_before_terminator(), Some(U256::from(4_u8)));
    }

    #[test]
    fn resolves_no_literal_without_a_preceding_push() {
        let block = BasicBlock::new(vec![Instruction::new(0, Opcode::Jump)]);
        assert_eq!(block.literal_before_terminator(), None);

        let unknown_target = BasicBlock::new(vec![
            Instruction::new(0, Opcode::CallDataLoad),
            Instruction::new(1, Opcode::Jump),
        ]);
        assert_eq!(unknown_target.literal_before_terminator(), None);
    }
}
