//! This module contains the abstract value domain and the abstract operand
//! stack used when scanning a block's instructions.
//!
//! The domain is deliberately tiny: a value is either a known literal word or
//! unknown. Anything computed from an unknown operand is itself unknown. This
//! is all that the storage-access classification and the branch-condition
//! tracking need, and it keeps the per-block scan trivially terminating.

use ethnum::U256;

use crate::{
    disassembly::Instruction,
    opcode::{Category, Opcode},
};

/// A value on the abstract operand stack.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AbstractValue {
    /// A literal word whose exact value is statically known.
    Known(U256),

    /// A value whose contents are not statically determinable: environment
    /// reads, storage loads, and any computation over an unknown operand.
    Unknown,
}

impl AbstractValue {
    /// Gets the literal word if the value is known.
    #[must_use]
    pub fn as_known(&self) -> Option<U256> {
        match self {
            Self::Known(word) => Some(*word),
            Self::Unknown => None,
        }
    }

    /// Checks if the value is statically known.
    #[must_use]
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl std::fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(word) => write!(f, "0x{word:x}"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// The abstract operand stack threaded through a scan of a block's
/// instructions.
///
/// # Indexing
///
/// Indexing is zero-based, where frame 0 is the top of the stack.
///
/// # Underflow
///
/// A scan begins at a block boundary with no knowledge of what earlier blocks
/// left on the machine stack, so popping past the bottom does not fail: it
/// yields [`AbstractValue::Unknown`], the value the preceding blocks produced
/// as far as this scan is concerned.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AbstractStack {
    data: Vec<AbstractValue>,
}

impl AbstractStack {
    /// Creates a new stack without any items on it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes the provided `value` onto the top of the stack.
    pub fn push(&mut self, value: AbstractValue) {
        self.data.push(value);
    }

    /// Pops the top value from the stack, yielding
    /// [`AbstractValue::Unknown`] when the stack bottoms out into state
    /// produced before the current block.
    pub fn pop(&mut self) -> AbstractValue {
        self.data.pop().unwrap_or(AbstractValue::Unknown)
    }

    /// Reads the value at `depth` without removing it.
    #[must_use]
    pub fn peek(&self, depth: usize) -> AbstractValue {
        if depth < self.data.len() {
            self.data[self.data.len() - 1 - depth]
        } else {
            AbstractValue::Unknown
        }
    }

    /// Duplicates the value at `depth` onto the top of the stack.
    pub fn dup(&mut self, depth: usize) {
        let value = self.peek(depth);
        self.push(value);
    }

    /// Swaps the top of the stack with the value at `depth`.
    pub fn swap(&mut self, depth: usize) {
        if depth == 0 || self.data.is_empty() {
            return;
        }
        if depth < self.data.len() {
            let top = self.data.len() - 1;
            let other = top - depth;
            self.data.swap(top, other);
        } else {
            // The counterpart frame predates the block; what we get back for
            // the top is unknown.
            let top = self.data.len() - 1;
            self.data[top] = AbstractValue::Unknown;
        }
    }

    /// Gets the number of values currently tracked on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks if the stack tracks no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Applies the stack effect of `instruction`, returning the storage
    /// access it performs, if any.
    ///
    /// Pushes of literals enter the stack as known words; every other opcode
    /// consumes its operands and produces [`AbstractValue::Unknown`] results,
    /// which propagates unknownness through arithmetic, hashing and loads
    /// exactly as the conservative classification requires.
    pub fn apply(&mut self, instruction: &Instruction) -> Option<StorageEvent> {
        let opcode = instruction.opcode();
        match opcode.category() {
            Category::PushImmediate(_) => {
                let literal = instruction
                    .push_literal()
                    .map_or(AbstractValue::Unknown, AbstractValue::Known);
                self.push(literal);
                None
            }
            Category::StorageRead => {
                let slot = self.pop();
                // The loaded value is data from storage, never a literal.
                self.push(AbstractValue::Unknown);
                Some(StorageEvent::Read { slot })
            }
            Category::StorageWrite => {
                let slot = self.pop();
                let _value = self.pop();
                Some(StorageEvent::Write { slot })
            }
            _ => {
                match opcode {
                    Opcode::DupN(n) => self.dup(n as usize - 1),
                    Opcode::SwapN(n) => self.swap(n as usize),
                    _ => {
                        let (pops, pushes) = opcode.stack_effect();
                        for _ in 0..pops {
                            self.pop();
                        }
                        for _ in 0..pushes {
                            self.push(AbstractValue::Unknown);
                        }
                    }
                }
                None
            }
        }
    }
}

/// A storage access performed by a single instruction, with the abstract
/// value of its slot-address operand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageEvent {
    /// An `SLOAD` of the provided slot.
    Read { slot: AbstractValue },

    /// An `SSTORE` to the provided slot.
    Write { slot: AbstractValue },
}
