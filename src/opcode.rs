//! This module contains the [`Opcode`] type, a closed representation of each
//! of the EVM's [opcodes](https://ethereum.org/en/developers/docs/evm/opcodes/).
//!
//! # A Closed Enum
//!
//! Where consumers of an instruction stream would otherwise need to compare
//! mnemonics or downcast trait objects per use-site, every consumer here
//! instead matches once on the closed [`Category`] tag computed from the
//! opcode. This keeps the classification of an instruction—terminator,
//! push-immediate, storage access, or plain computation—in exactly one place.

use serde::{Deserialize, Serialize};

use crate::constant::{
    DUP_OPCODE_BASE_VALUE,
    LOG_OPCODE_BASE_VALUE,
    PUSH_OPCODE_BASE_VALUE,
    SWAP_OPCODE_BASE_VALUE,
};

/// A single opcode of the EVM's instruction set.
///
/// The consolidated opcode families (`PUSH1..=PUSH32`, `DUP1..=DUP16`,
/// `SWAP1..=SWAP16` and `LOG0..=LOG4`) are represented as a single variant
/// carrying `N`. Unrecognised bytes—commonly trailing CBOR metadata—are
/// represented as [`Opcode::Invalid`] carrying the original byte, and hence
/// revert if ever treated as executable.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Opcode {
    Stop,
    Add,
    Mul,
    Sub,
    Div,
    SDiv,
    Mod,
    SMod,
    AddMod,
    MulMod,
    Exp,
    SignExtend,
    Lt,
    Gt,
    SLt,
    SGt,
    Eq,
    IsZero,
    And,
    Or,
    Xor,
    Not,
    Byte,
    Shl,
    Shr,
    Sar,
    Sha3,
    Address,
    Balance,
    Origin,
    Caller,
    CallValue,
    CallDataLoad,
    CallDataSize,
    CallDataCopy,
    CodeSize,
    CodeCopy,
    GasPrice,
    ExtCodeSize,
    ExtCodeCopy,
    ReturnDataSize,
    ReturnDataCopy,
    ExtCodeHash,
    BlockHash,
    CoinBase,
    Timestamp,
    Number,
    Prevrandao,
    GasLimit,
    ChainId,
    SelfBalance,
    BaseFee,
    Pop,
    MLoad,
    MStore,
    MStore8,
    SLoad,
    SStore,
    Jump,
    JumpI,
    PC,
    MSize,
    Gas,
    JumpDest,
    Push0,
    /// `PUSH1..=PUSH32`, pushing the next `N` bytes of the stream.
    PushN(u8),
    /// `DUP1..=DUP16`, duplicating the `N`th stack item.
    DupN(u8),
    /// `SWAP1..=SWAP16`, swapping the top item with the `N+1`th.
    SwapN(u8),
    /// `LOG0..=LOG4`, logging with `N` topics.
    LogN(u8),
    Create,
    Call,
    CallCode,
    Return,
    DelegateCall,
    Create2,
    StaticCall,
    Revert,
    /// Either the designated `INVALID` opcode (`0xfe`) or any byte that does
    /// not decode to a known opcode, kept verbatim.
    Invalid(u8),
    SelfDestruct,
}

/// The closed category tag for an opcode.
///
/// This is the single classification that the partitioner, the edge builder,
/// the storage-access analyzer and the explorer all branch on; it is computed
/// once per instruction via [`Opcode::category`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Category {
    /// An opcode that halts the current execution path outright (`STOP`,
    /// `RETURN`, `REVERT`, `SELFDESTRUCT` and any invalid byte).
    Halt,

    /// An unconditional transfer of control (`JUMP`).
    UnconditionalJump,

    /// A conditional transfer of control (`JUMPI`).
    ConditionalJump,

    /// The only valid target of a jump (`JUMPDEST`).
    JumpDest,

    /// An opcode that carries `N` immediate bytes in the instruction stream
    /// (`PUSH0..=PUSH32`, with `N = 0` for `PUSH0`).
    PushImmediate(u8),

    /// A read from persistent storage (`SLOAD`).
    StorageRead,

    /// A write to persistent storage (`SSTORE`).
    StorageWrite,

    /// Every opcode that does not affect control flow, storage, or the
    /// instruction encoding.
    Other,
}

impl Opcode {
    /// Decodes a single byte into its opcode.
    ///
    /// This decoding is total: bytes that do not correspond to any known
    /// opcode decode to [`Opcode::Invalid`]. Note that for push-family bytes
    /// this yields only the opcode itself; consuming the immediate operand
    /// bytes that follow is the disassembler's job.
    #[must_use]
    #[allow(clippy::too_many_lines)] // It is a flat table; splitting it hurts
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Stop,
            0x01 => Self::Add,
            0x02 => Self::Mul,
            0x03 => Self::Sub,
            0x04 => Self::Div,
            0x05 => Self::SDiv,
            0x06 => Self::Mod,
            0x07 => Self::SMod,
            0x08 => Self::AddMod,
            0x09 => Self::MulMod,
            0x0a => Self::Exp,
            0x0b => Self::SignExtend,
            0x10 => Self::Lt,
            0x11 => Self::Gt,
            0x12 => Self::SLt,
            0x13 => Self::SGt,
            0x14 => Self::Eq,
            0x15 => Self::IsZero,
            0x16 => Self::And,
            0x17 => Self::Or,
            0x18 => Self::Xor,
            0x19 => Self::Not,
            0x1a => Self::Byte,
            0x1b => Self::Shl,
            0x1c => Self::Shr,
            0x1d => Self::Sar,
            0x20 => Self::Sha3,
            0x30 => Self::Address,
            0x31 => Self::Balance,
            0x32 => Self::Origin,
            0x33 => Self::Caller,
            0x34 => Self::CallValue,
            0x35 => Self::CallDataLoad,
            0x36 => Self::CallDataSize,
            0x37 => Self::CallDataCopy,
            0x38 => Self::CodeSize,
            0x39 => Self::CodeCopy,
            0x3a => Self::GasPrice,
            0x3b => Self::ExtCodeSize,
            0x3c => Self::ExtCodeCopy,
            0x3d => Self::ReturnDataSize,
            0x3e => Self::ReturnDataCopy,
            0x3f => Self::ExtCodeHash,
            0x40 => Self::BlockHash,
            0x41 => Self::CoinBase,
            0x42 => Self::Timestamp,
            0x43 => Self::Number,
            0x44 => Self::Prevrandao,
            0x45 => Self::GasLimit,
            0x46 => Self::ChainId,
            0x47 => Self::SelfBalance,
            0x48 => Self::BaseFee,
            0x50 => Self::Pop,
            0x51 => Self::MLoad,
            0x52 => Self::MStore,
            0x53 => Self::MStore8,
            0x54 => Self::SLoad,
            0x55 => Self::SStore,
            0x56 => Self::Jump,
            0x57 => Self::JumpI,
            0x58 => Self::PC,
            0x59 => Self::MSize,
            0x5a => Self::Gas,
            0x5b => Self::JumpDest,
            0x5f => Self::Push0,
            0x60..=0x7f => Self::PushN(byte - PUSH_OPCODE_BASE_VALUE),
            0x80..=0x8f => Self::DupN(byte - DUP_OPCODE_BASE_VALUE),
            0x90..=0x9f => Self::SwapN(byte - SWAP_OPCODE_BASE_VALUE),
            0xa0..=0xa4 => Self::LogN(byte - LOG_OPCODE_BASE_VALUE),
            0xf0 => Self::Create,
            0xf1 => Self::Call,
            0xf2 => Self::CallCode,
            0xf3 => Self::Return,
            0xf4 => Self::DelegateCall,
            0xf5 => Self::Create2,
            0xfa => Self::StaticCall,
            0xfd => Self::Revert,
            0xfe => Self::Invalid(0xfe),
            0xff => Self::SelfDestruct,
            // CBOR metadata or otherwise unassigned bytes; only reachable
            // intentionally to cause a revert, so they become `INVALID`.
            _ => Self::Invalid(byte),
        }
    }

    /// Gets the byte representation of the opcode.
    #[must_use]
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Stop => 0x00,
            Self::Add => 0x01,
            Self::Mul => 0x02,
            Self::Sub => 0x03,
            Self::Div => 0x04,
            Self::SDiv => 0x05,
            Self::Mod => 0x06,
            Self::SMod => 0x07,
            Self::AddMod => 0x08,
            Self::MulMod => 0x09,
            Self::Exp => 0x0a,
            Self::SignExtend => 0x0b,
            Self::Lt => 0x10,
            Self::Gt => 0x11,
            Self::SLt => 0x12,
            Self::SGt => 0x13,
            Self::Eq => 0x14,
            Self::IsZero => 0x15,
            Self::And => 0x16,
            Self::Or => 0x17,
            Self::Xor => 0x18,
            Self::Not => 0x19,
            Self::Byte => 0x1a,
            Self::Shl => 0x1b,
            Self::Shr => 0x1c,
            Self::Sar => 0x1d,
            Self::Sha3 => 0x20,
            Self::Address => 0x30,
            Self::Balance => 0x31,
            Self::Origin => 0x32,
            Self::Caller => 0x33,
            Self::CallValue => 0x34,
            Self::CallDataLoad => 0x35,
            Self::CallDataSize => 0x36,
            Self::CallDataCopy => 0x37,
            Self::CodeSize => 0x38,
            Self::CodeCopy => 0x39,
            Self::GasPrice => 0x3a,
            Self::ExtCodeSize => 0x3b,
            Self::ExtCodeCopy => 0x3c,
            Self::ReturnDataSize => 0x3d,
            Self::ReturnDataCopy => 0x3e,
            Self::ExtCodeHash => 0x3f,
            Self::BlockHash => 0x40,
            Self::CoinBase => 0x41,
            Self::Timestamp => 0x42,
            Self::Number => 0x43,
            Self::Prevrandao => 0x44,
            Self::GasLimit => 0x45,
            Self::ChainId => 0x46,
            Self::SelfBalance => 0x47,
            Self::BaseFee => 0x48,
            Self::Pop => 0x50,
            Self::MLoad => 0x51,
            Self::MStore => 0x52,
            Self::MStore8 => 0x53,
            Self::SLoad => 0x54,
            Self::SStore => 0x55,
            Self::Jump => 0x56,
            Self::JumpI => 0x57,
            Self::PC => 0x58,
            Self::MSize => 0x59,
            Self::Gas => 0x5a,
            Self::JumpDest => 0x5b,
            Self::Push0 => 0x5f,
            Self::PushN(n) => PUSH_OPCODE_BASE_VALUE + n,
            Self::DupN(n) => DUP_OPCODE_BASE_VALUE + n,
            Self::SwapN(n) => SWAP_OPCODE_BASE_VALUE + n,
            Self::LogN(n) => LOG_OPCODE_BASE_VALUE + n,
            Self::Create => 0xf0,
            Self::Call => 0xf1,
            Self::CallCode => 0xf2,
            Self::Return => 0xf3,
            Self::DelegateCall => 0xf4,
            Self::Create2 => 0xf5,
            Self::StaticCall => 0xfa,
            Self::Revert => 0xfd,
            Self::Invalid(byte) => *byte,
            Self::SelfDestruct => 0xff,
        }
    }

    /// Gets the closed category tag for this opcode.
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            Self::Stop | Self::Return | Self::Revert | Self::SelfDestruct | Self::Invalid(_) => {
                Category::Halt
            }
            Self::Jump => Category::UnconditionalJump,
            Self::JumpI => Category::ConditionalJump,
            Self::JumpDest => Category::JumpDest,
            Self::Push0 => Category::PushImmediate(0),
            Self::PushN(n) => Category::PushImmediate(*n),
            Self::SLoad => Category::StorageRead,
            Self::SStore => Category::StorageWrite,
            _ => Category::Other,
        }
    }

    /// Checks whether this opcode ends a basic block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.category(),
            Category::Halt | Category::UnconditionalJump | Category::ConditionalJump
        )
    }

    /// Gets the number of immediate operand bytes this opcode consumes from
    /// the instruction stream.
    #[must_use]
    pub fn immediate_size(&self) -> usize {
        match self.category() {
            Category::PushImmediate(n) => n as usize,
            _ => 0,
        }
    }

    /// Gets the total encoded size of the opcode in bytes, including any
    /// immediate operand bytes.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        1 + self.immediate_size()
    }

    /// Gets the stack effect of the opcode as `(pops, pushes)`: the number of
    /// operands it consumes from the stack and the number of results it
    /// leaves there.
    #[must_use]
    #[allow(clippy::match_same_arms)] // The table reads better grouped by opcode family
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Self::Stop | Self::JumpDest | Self::Invalid(_) => (0, 0),

            Self::Add
            | Self::Mul
            | Self::Sub
            | Self::Div
            | Self::SDiv
            | Self::Mod
            | Self::SMod
            | Self::Exp
            | Self::SignExtend => (2, 1),
            Self::AddMod | Self::MulMod => (3, 1),

            Self::Lt
            | Self::Gt
            | Self::SLt
            | Self::SGt
            | Self::Eq
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::Byte
            | Self::Shl
            | Self::Shr
            | Self::Sar => (2, 1),
            Self::IsZero | Self::Not => (1, 1),

            Self::Sha3 => (2, 1),

            Self::Address
            | Self::Origin
            | Self::Caller
            | Self::CallValue
            | Self::CallDataSize
            | Self::CodeSize
            | Self::GasPrice
            | Self::ReturnDataSize
            | Self::CoinBase
            | Self::Timestamp
            | Self::Number
            | Self::Prevrandao
            | Self::GasLimit
            | Self::ChainId
            | Self::SelfBalance
            | Self::BaseFee
            | Self::PC
            | Self::MSize
            | Self::Gas => (0, 1),
            Self::Balance
            | Self::CallDataLoad
            | Self::ExtCodeSize
            | Self::ExtCodeHash
            | Self::BlockHash => (1, 1),
            Self::CallDataCopy | Self::CodeCopy | Self::ReturnDataCopy => (3, 0),
            Self::ExtCodeCopy => (4, 0),

            Self::Pop => (1, 0),
            Self::MLoad => (1, 1),
            Self::MStore | Self::MStore8 => (2, 0),
            Self::SLoad => (1, 1),
            Self::SStore => (2, 0),

            Self::Jump => (1, 0),
            Self::JumpI => (2, 0),

            Self::Push0 | Self::PushN(_) => (0, 1),
            Self::DupN(n) => (*n as usize, *n as usize + 1),
            Self::SwapN(n) => (*n as usize + 1, *n as usize + 1),
            Self::LogN(n) => (*n as usize + 2, 0),

            Self::Create => (3, 1),
            Self::Create2 => (4, 1),
            Self::Call | Self::CallCode => (7, 1),
            Self::DelegateCall | Self::StaticCall => (6, 1),
            Self::Return | Self::Revert => (2, 0),
            Self::SelfDestruct => (1, 0),
        }
    }

    /// Gets a textual representation of the opcode to aid in debugging.
    #[must_use]
    pub fn as_text_code(&self) -> String {
        match self {
            Self::PushN(n) => format!("PUSH{n}"),
            Self::DupN(n) => format!("DUP{n}"),
            Self::SwapN(n) => format!("SWAP{n}"),
            Self::LogN(n) => format!("LOG{n}"),
            Self::Invalid(_) => "INVALID".into(),
            Self::Prevrandao => "PREVRANDAO".into(),
            Self::SelfDestruct => "SELFDESTRUCT".into(),
            Self::Push0 => "PUSH0".into(),
            other => format!("{other:?}").to_uppercase(),
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_text_code())
    }
}

#[cfg(test)]
mod test {
    use crate::opcode::{Category, Opcode};

    #[test]
    fn decodes_every_byte_totally() {
        for byte in 0x00..=0xff_u8 {
            let opcode = Opcode::from_byte(byte);
            assert_eq!(opcode.as_byte(), byte);
        }
    }

    #[test]
    fn categorises_terminators() {
        assert_eq!(Opcode::Stop.category(), Category::Halt);
        assert_eq!(Opcode::Return.category(), Category::Halt);
        assert_eq!(Opcode::Revert.category(), Category::Halt);
        assert_eq!(Opcode::SelfDestruct.category(), Category::Halt);
        assert_eq!(Opcode::Invalid(0xfe).category(), Category::Halt);
        assert_eq!(Opcode::Jump.category(), Category::UnconditionalJump);
        assert_eq!(Opcode::JumpI.category(), Category::ConditionalJump);

        assert!(Opcode::Jump.is_terminator());
        assert!(!Opcode::JumpDest.is_terminator());
        assert!(!Opcode::Add.is_terminator());
    }

    #[test]
    fn categorises_storage_accesses() {
        assert_eq!(Opcode::SLoad.category(), Category::StorageRead);
        assert_eq!(Opcode::SStore.category(), Category::StorageWrite);
    }

    #[test]
    fn computes_immediate_sizes_for_pushes() {
        assert_eq!(Opcode::Push0.immediate_size(), 0);
        assert_eq!(Opcode::PushN(1).immediate_size(), 1);
        assert_eq!(Opcode::PushN(32).immediate_size(), 32);
        assert_eq!(Opcode::PushN(32).encoded_size(), 33);
        assert_eq!(Opcode::Add.encoded_size(), 1);
    }

    #[test]
    fn renders_consolidated_mnemonics() {
        assert_eq!(Opcode::PushN(3).as_text_code(), "PUSH3");
        assert_eq!(Opcode::DupN(16).as_text_code(), "DUP16");
        assert_eq!(Opcode::SwapN(1).as_text_code(), "SWAP1");
        assert_eq!(Opcode::LogN(0).as_text_code(), "LOG0");
        assert_eq!(Opcode::JumpDest.as_text_code(), "JUMPDEST");
        assert_eq!(Opcode::Invalid(0xab).as_text_code(), "INVALID");
    }
}
