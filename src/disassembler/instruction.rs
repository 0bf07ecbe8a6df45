//! Decoded CIL instructions and their operands.

use std::{collections::HashMap, fmt, sync::OnceLock};

use crate::{
    disassembler::{CilInstruction, FE_PREFIX, INSTRUCTIONS, INSTRUCTIONS_FE},
    metadata::token::TableIndex,
    Result,
};

/// Encoding of the operand that follows an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer, a short argument or local slot
    UInt8,
    /// Unsigned 16-bit integer, an argument or local slot
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Metadata token
    Token,
    /// `#US` token of a string literal
    String,
    /// Jump table
    Switch,
    /// Branch offset, signed byte
    BranchTarget8,
    /// Branch offset, signed 32-bit
    BranchTarget32,
}

impl OperandType {
    /// Encoded size in bytes, `None` for the variable sized switch table
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 | OperandType::BranchTarget8 => Some(1),
            OperandType::UInt16 => Some(2),
            OperandType::Int32
            | OperandType::Float32
            | OperandType::Token
            | OperandType::String
            | OperandType::BranchTarget32 => Some(4),
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }
}

/// How an instruction affects control flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Branches or falls through
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Calls a method and continues
    Call,
    /// Returns from the method
    Return,
    /// Jump table
    Switch,
    /// Raises an exception
    Throw,
    /// Ends a `finally`, `fault` or filter block
    EndFinally,
    /// Leaves a protected region
    Leave,
}

/// The operand of a decoded instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// `ldc.i4.s`
    Int8(i8),
    /// Short argument or local slot, `unaligned.` and `no.` flags
    UInt8(u8),
    /// Argument or local slot
    UInt16(u16),
    /// `ldc.i4`
    Int32(i32),
    /// `ldc.i8`
    Int64(i64),
    /// `ldc.r4`
    Float32(f32),
    /// `ldc.r8`
    Float64(f64),
    /// A metadata row, restricted to the tables IL may reference
    Token(TableIndex),
    /// `ldstr` literal, resolved from `#US`
    String(String),
    /// Jump table, offsets relative to the next instruction
    Switch(Vec<i32>),
    /// Short branch, offset relative to the next instruction
    BranchShort(i8),
    /// Long branch, offset relative to the next instruction
    Branch(i32),
}

impl Operand {
    /// True if this operand is a valid value for operand type `kind`
    #[must_use]
    pub fn matches(&self, kind: OperandType) -> bool {
        matches!(
            (self, kind),
            (Operand::None, OperandType::None)
                | (Operand::Int8(_), OperandType::Int8)
                | (Operand::UInt8(_), OperandType::UInt8)
                | (Operand::UInt16(_), OperandType::UInt16)
                | (Operand::Int32(_), OperandType::Int32)
                | (Operand::Int64(_), OperandType::Int64)
                | (Operand::Float32(_), OperandType::Float32)
                | (Operand::Float64(_), OperandType::Float64)
                | (Operand::Token(_), OperandType::Token)
                | (Operand::String(_), OperandType::String)
                | (Operand::Switch(_), OperandType::Switch)
                | (Operand::BranchShort(_), OperandType::BranchTarget8)
                | (Operand::Branch(_), OperandType::BranchTarget32)
        )
    }
}

/// A single CIL instruction.
///
/// Branch operands stay relative, so a decoded instruction list can be re-encoded without
/// tracking offsets. Use [`Instruction::size`] to walk offsets where they are needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// `0xFE` for two-byte opcodes, 0 otherwise
    pub prefix: u8,
    /// The opcode byte
    pub opcode: u8,
    /// The operand
    pub operand: Operand,
}

static MNEMONIC_TO_OPCODE: OnceLock<HashMap<&'static str, (u8, u8)>> = OnceLock::new();

fn get_mnemonic_lookup() -> &'static HashMap<&'static str, (u8, u8)> {
    MNEMONIC_TO_OPCODE.get_or_init(|| {
        let mut map = HashMap::new();
        for (opcode, instr) in (0u8..=u8::MAX).zip(INSTRUCTIONS.iter()) {
            if instr.is_valid() {
                map.insert(instr.instr, (0, opcode));
            }
        }
        for (opcode, instr) in (0u8..).zip(INSTRUCTIONS_FE.iter()) {
            if instr.is_valid() {
                map.insert(instr.instr, (FE_PREFIX, opcode));
            }
        }
        map
    })
}

impl Instruction {
    /// Build an instruction from its mnemonic
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown mnemonic or an operand that does not
    /// fit the opcode
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dotcodec::disassembler::{Instruction, Operand};
    ///
    /// let load = Instruction::new("ldc.i4.s", Operand::Int8(-3))?;
    /// assert_eq!((load.opcode, load.size()), (0x1F, 2));
    /// assert!(Instruction::new("ldc.i4.s", Operand::None).is_err());
    /// # Ok::<(), dotcodec::Error>(())
    /// ```
    pub fn new(mnemonic: &str, operand: Operand) -> Result<Instruction> {
        let Some(&(prefix, opcode)) = get_mnemonic_lookup().get(mnemonic) else {
            return Err(malformed_error!("Unknown mnemonic - {}", mnemonic));
        };

        let instruction = Instruction {
            prefix,
            opcode,
            operand,
        };
        let op_type = instruction.info().op_type;
        if !instruction.operand.matches(op_type) {
            return Err(malformed_error!(
                "{} expects a {:?} operand, got {:?}",
                mnemonic,
                op_type,
                instruction.operand
            ));
        }

        Ok(instruction)
    }

    /// Shorthand for an instruction without operand
    ///
    /// # Errors
    /// Same as [`Instruction::new`]
    pub fn simple(mnemonic: &str) -> Result<Instruction> {
        Self::new(mnemonic, Operand::None)
    }

    /// The static description of this opcode
    #[must_use]
    pub fn info(&self) -> &'static CilInstruction {
        if self.prefix == FE_PREFIX {
            INSTRUCTIONS_FE
                .get(usize::from(self.opcode))
                .unwrap_or(&INSTRUCTIONS[usize::from(FE_PREFIX)])
        } else {
            &INSTRUCTIONS[usize::from(self.opcode)]
        }
    }

    /// The mnemonic, empty for an invalid opcode
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.info().instr
    }

    /// Effect on control flow
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.info().flow
    }

    /// Encoded size in bytes, including prefix and operand
    #[must_use]
    pub fn size(&self) -> usize {
        let opcode = if self.prefix == FE_PREFIX { 2 } else { 1 };
        let operand = match &self.operand {
            Operand::Switch(targets) => 4 + 4 * targets.len(),
            _ => self.info().op_type.size().unwrap_or(0),
        };
        opcode + operand
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int8(value) => write!(f, " {value}"),
            Operand::UInt8(value) => write!(f, " {value}"),
            Operand::UInt16(value) => write!(f, " {value}"),
            Operand::Int32(value) => write!(f, " {value}"),
            Operand::Int64(value) => write!(f, " {value}"),
            Operand::Float32(value) => write!(f, " {value}"),
            Operand::Float64(value) => write!(f, " {value}"),
            Operand::Token(index) => write!(f, " {index}"),
            Operand::String(value) => write!(f, " {value:?}"),
            Operand::Switch(targets) => write!(f, " {targets:?}"),
            Operand::BranchShort(offset) => write!(f, " {offset:+}"),
            Operand::Branch(offset) => write!(f, " {offset:+}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let ceq = Instruction::simple("ceq").unwrap();
        assert_eq!((ceq.prefix, ceq.opcode, ceq.size()), (0xFE, 0x01, 2));

        let switch = Instruction::new("switch", Operand::Switch(vec![0, 4, -8])).unwrap();
        assert_eq!(switch.size(), 1 + 4 + 12);
        assert_eq!(switch.flow_type(), FlowType::Switch);

        assert!(Instruction::simple("frobnicate").is_err());
        assert!(Instruction::new("br.s", Operand::Branch(4)).is_err());
    }

    #[test]
    fn display() {
        let ldstr = Instruction::new("ldstr", Operand::String("hi".into())).unwrap();
        assert_eq!(ldstr.to_string(), "ldstr \"hi\"");
        let br = Instruction::new("br.s", Operand::BranchShort(-2)).unwrap();
        assert_eq!(br.to_string(), "br.s -2");
    }
}
