//! This module contains the parser definition for turning a stream of bytes
//! into the instructions of a [`super::InstructionStream`].
//!
//! # Implementation Note
//!
//! While it might make sense in the future to build a more robust parser based
//! on parser combinators from a library like [`nom`](https://docs.rs/nom), for
//! now it makes sense to stick to a simple system.

use ethnum::U256;

use crate::{
    disassembly::Instruction,
    error::{
        container::Locatable,
        disassembly::{Error, Result},
    },
    opcode::{Category, Opcode},
};

/// Disassembles the input `bytes` into a sequence of [`Instruction`]s whose
/// byte offsets are contiguous and cover every input byte exactly once.
///
/// # Truncated Push Operands
///
/// Solc has generated valid code that ends with a `PUSH` whose operand runs
/// off the end of the bytecode. Rather than failing the whole disassembly,
/// the unterminated push and all of its trailing operand bytes are each
/// re-emitted as an `INVALID` instruction. This keeps the byte coverage
/// invariant intact and marks the tail as a terminal, non-executable region.
///
/// # CBOR Metadata
///
/// Any byte that is unrecognised at the time of disassembly is translated to
/// [`Opcode::Invalid`], and hence will cause execution to revert if ever
/// actually reached. This is much simpler than trying to strip trailing
/// metadata beforehand, and is more robust against changes in the metadata
/// format.
///
/// # Errors
///
/// When `bytes` is empty, or when `bytes` is too large to be addressed by a
/// `u32` byte offset.
pub fn disassemble(bytes: &[u8]) -> Result<Vec<Instruction>> {
    if bytes.is_empty() {
        return Err(Error::EmptyBytecode.locate(0));
    }
    if u32::try_from(bytes.len()).is_err() {
        return Err(Error::BytecodeTooLarge.locate(u32::MAX));
    }

    let mut instructions: Vec<Instruction> = Vec::with_capacity(bytes.len());
    let mut cursor: usize = 0;

    while cursor < bytes.len() {
        #[allow(clippy::cast_possible_truncation)] // Guarded by the length check above
        let offset = cursor as u32;
        let opcode = Opcode::from_byte(bytes[cursor]);

        match opcode.category() {
            Category::PushImmediate(n) if n > 0 => {
                let operand_start = cursor + 1;
                let operand_end = operand_start + n as usize;

                if operand_end > bytes.len() {
                    // The operand is truncated, so the push and every byte
                    // after it become terminal `INVALID` markers.
                    instructions.push(Instruction::new(offset, Opcode::Invalid(bytes[cursor])));
                    for trailing in operand_start..bytes.len() {
                        #[allow(clippy::cast_possible_truncation)] // As above
                        let trailing_offset = trailing as u32;
                        instructions.push(Instruction::new(
                            trailing_offset,
                            Opcode::Invalid(bytes[trailing]),
                        ));
                    }
                    cursor = bytes.len();
                } else {
                    let immediate = be_word(&bytes[operand_start..operand_end]);
                    instructions.push(Instruction::new_push(offset, opcode, immediate));
                    cursor = operand_end;
                }
            }
            _ => {
                instructions.push(Instruction::new(offset, opcode));
                cursor += 1;
            }
        }
    }

    Ok(instructions)
}

/// Interprets up to 32 `bytes` as a big-endian word.
fn be_word(bytes: &[u8]) -> U256 {
    let mut buffer = [0u8; 32];
    buffer[32 - bytes.len()..].copy_from_slice(bytes);
    U256::from_be_bytes(buffer)
}
