//! This module contains the implementation of the [`InstructionStream`], a
//! type that represents a sequence of bytecode instructions and provides
//! utilities for working with it.

mod disassembler;

use ethnum::U256;
use hex::FromHexError;
use serde::{Deserialize, Serialize};

use crate::{
    error::{
        container::Locatable,
        disassembly::{Error, Result},
    },
    opcode::Opcode,
};

/// A single instruction in the disassembled bytecode.
///
/// # Byte-Instruction Correspondence
///
/// Where most [`Opcode`]s occupy a single byte, the push family is followed
/// in the encoding by the `N` bytes of data to push. An instruction therefore
/// records its byte `offset` and reports its [`Self::size`] so that for any
/// two consecutive instructions `offset[i + 1] == offset[i] + size[i]`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Instruction {
    /// The byte offset at which this instruction begins in the bytecode.
    offset: u32,

    /// The decoded opcode.
    opcode: Opcode,

    /// The immediate operand for push-family opcodes, interpreted as a
    /// big-endian word, and [`None`] for every other opcode.
    immediate: Option<U256>,
}

impl Instruction {
    /// Constructs a new instruction without an immediate operand at the
    /// provided `offset`.
    #[must_use]
    pub fn new(offset: u32, opcode: Opcode) -> Self {
        Self {
            offset,
            opcode,
            immediate: None,
        }
    }

    /// Constructs a new push-family instruction at the provided `offset`
    /// carrying `immediate`.
    #[must_use]
    pub fn new_push(offset: u32, opcode: Opcode, immediate: U256) -> Self {
        Self {
            offset,
            opcode,
            immediate: Some(immediate),
        }
    }

    /// Gets the byte offset at which this instruction begins.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Gets the instruction's opcode.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Gets the immediate operand, if the instruction has one.
    #[must_use]
    pub fn immediate(&self) -> Option<U256> {
        self.immediate
    }

    /// Gets the literal word this instruction pushes onto the stack, if it is
    /// a push of a literal.
    ///
    /// `PUSH0` pushes the literal zero despite carrying no operand bytes.
    #[must_use]
    pub fn push_literal(&self) -> Option<U256> {
        match self.opcode {
            Opcode::Push0 => Some(U256::ZERO),
            Opcode::PushN(_) => self.immediate,
            _ => None,
        }
    }

    /// Gets the encoded size of the instruction in bytes, including any
    /// immediate operand bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)] // Bounded by 33
        let size = self.opcode.encoded_size() as u32;
        size
    }

    /// Re-encodes the instruction to the bytes it was decoded from.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![self.opcode.as_byte()];
        if let Some(immediate) = self.immediate {
            let operand_size = self.opcode.immediate_size();
            bytes.extend_from_slice(&immediate.to_be_bytes()[32 - operand_size..]);
        }
        bytes
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.immediate {
            Some(immediate) => write!(f, "{} 0x{immediate:x}", self.opcode),
            None => write!(f, "{}", self.opcode),
        }
    }
}

/// The instruction stream is a representation of a sequence of instructions
/// that implements some program.
///
/// # Non-Emptiness
///
/// The instruction stream is required to contain _at least one_ instruction.
/// This is validated at construction time.
///
/// # Stream Validity
///
/// The `InstructionStream` is a pure representation of the sequence of
/// instructions and performs no validation that the instruction stream is a
/// valid one. It is _perfectly_ possible, and allowable, to construct an
/// instruction stream containing invalid instructions; whether they are
/// reachable is a question for the control-flow graph built on top.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstructionStream {
    /// The sequence of instructions, ordered by strictly increasing byte
    /// offset.
    instructions: Vec<Instruction>,
}

impl InstructionStream {
    /// Gets the instructions in the stream, ordered by byte offset.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        self.instructions.as_slice()
    }

    /// Gets the number of instructions in the stream.
    #[allow(clippy::len_without_is_empty)] // The structure cannot be empty.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Gets the total length of the stream's encoding in bytes.
    #[must_use]
    pub fn byte_len(&self) -> u32 {
        let last = self
            .instructions
            .last()
            .expect("The instruction stream is never empty");
        last.offset() + last.size()
    }

    /// Gets the instruction beginning at the byte offset `offset`, if one
    /// does.
    ///
    /// Offsets falling inside a push immediate do not begin an instruction
    /// and hence return [`None`].
    #[must_use]
    pub fn instruction_at(&self, offset: u32) -> Option<&Instruction> {
        self.instructions
            .binary_search_by_key(&offset, Instruction::offset)
            .ok()
            .map(|index| &self.instructions[index])
    }

    /// Converts the instructions in the instruction stream back to their
    /// corresponding bytecode.
    #[must_use]
    pub fn as_bytecode(&self) -> Vec<u8> {
        self.instructions.iter().flat_map(Instruction::encode).collect()
    }
}

/// An [`InstructionStream`] is usually created from a byte array of bytecode.
impl<'a> TryFrom<&'a [u8]> for InstructionStream {
    type Error = crate::error::disassembly::LocatedError;

    fn try_from(value: &'a [u8]) -> Result<Self> {
        let instructions = disassembler::disassemble(value)?;
        Ok(Self { instructions })
    }
}

/// An [`InstructionStream`] can be created from a string as long as that
/// string is a hexadecimal encoding of the equivalent bytes. A leading `0x`
/// prefix is accepted.
impl TryFrom<&str> for InstructionStream {
    type Error = crate::error::disassembly::LocatedError;

    fn try_from(value: &str) -> Result<Self> {
        let stripped = value.strip_prefix("0x").unwrap_or(value);
        let bytes = match hex::decode(stripped) {
            Ok(b) => b,
            Err(e) => {
                let error = match e {
                    FromHexError::InvalidHexCharacter { c, index } => {
                        Error::InvalidHexCharacter(c, index)
                    }
                    _ => Error::InvalidHexLength,
                };
                return Err(error.locate(0));
            }
        };
        InstructionStream::try_from(bytes.as_slice())
    }
}

/// Allows converting the [`InstructionStream`] back to the corresponding
/// bytecode representation.
impl From<InstructionStream> for Vec<u8> {
    fn from(value: InstructionStream) -> Self {
        value.as_bytecode()
    }
}
