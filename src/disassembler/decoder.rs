//! CIL instruction decoding.
//!
//! # Example
//!
//! ```rust
//! use dotcodec::{disassembler::decode_stream, metadata::streams::UserStrings};
//!
//! let code = [0x00, 0x2A]; // nop, ret
//! let instrs = decode_stream(&code, &UserStrings::new())?;
//! assert_eq!(instrs[1].mnemonic(), "ret");
//! # Ok::<(), dotcodec::Error>(())
//! ```

use crate::{
    disassembler::{Instruction, Operand, OperandType, FE_PREFIX, INSTRUCTIONS, INSTRUCTIONS_FE},
    file::parser::Parser,
    metadata::{
        method::UserStringResolver,
        token::{TableIndex, Token},
    },
    Error, Result,
};

/// Table byte of `ldstr` tokens
pub(crate) const USER_STRING_TABLE: u8 = 0x70;

/// Decode the instruction at the parser position
///
/// # Arguments
/// * `parser` - Positioned at an opcode
/// * `strings` - Resolves `ldstr` operands
///
/// # Errors
/// Returns [`Error::UnknownOpcode`] for unassigned opcodes, [`Error::OutOfBounds`] for a
/// truncated operand and [`Error::Malformed`] for tokens IL may not reference
pub fn decode_instruction(
    parser: &mut Parser,
    strings: &impl UserStringResolver,
) -> Result<Instruction> {
    let offset = parser.pos();
    let first_byte = parser.read_le::<u8>()?;

    let (info, prefix, opcode) = if first_byte == FE_PREFIX {
        let second_byte = parser.read_le::<u8>()?;
        match INSTRUCTIONS_FE.get(usize::from(second_byte)) {
            Some(info) if info.is_valid() => (info, FE_PREFIX, second_byte),
            _ => {
                return Err(Error::UnknownOpcode {
                    prefix: FE_PREFIX,
                    opcode: second_byte,
                    offset,
                })
            }
        }
    } else {
        let info = &INSTRUCTIONS[usize::from(first_byte)];
        if !info.is_valid() {
            return Err(Error::UnknownOpcode {
                prefix: 0,
                opcode: first_byte,
                offset,
            });
        }
        (info, 0, first_byte)
    };

    let operand = match info.op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Int8(parser.read_le::<i8>()?),
        OperandType::UInt8 => Operand::UInt8(parser.read_le::<u8>()?),
        OperandType::UInt16 => Operand::UInt16(parser.read_le::<u16>()?),
        OperandType::Int32 => Operand::Int32(parser.read_le::<i32>()?),
        OperandType::Int64 => Operand::Int64(parser.read_le::<i64>()?),
        OperandType::Float32 => Operand::Float32(parser.read_le::<f32>()?),
        OperandType::Float64 => Operand::Float64(parser.read_le::<f64>()?),
        OperandType::Token => {
            Operand::Token(TableIndex::from_il_token(Token::new(parser.read_le::<u32>()?))?)
        }
        OperandType::String => {
            let token = Token::new(parser.read_le::<u32>()?);
            if token.table() != USER_STRING_TABLE {
                return Err(malformed_error!(
                    "ldstr at {:#x} has non-string token {}",
                    offset,
                    token
                ));
            }
            Operand::String(strings.resolve(token.row())?)
        }
        OperandType::Switch => {
            let case_count = parser.read_le::<u32>()? as usize;
            if case_count > parser.remaining() / 4 {
                return Err(Error::OutOfBounds);
            }

            let mut targets = Vec::with_capacity(case_count);
            for _ in 0..case_count {
                targets.push(parser.read_le::<i32>()?);
            }
            Operand::Switch(targets)
        }
        OperandType::BranchTarget8 => Operand::BranchShort(parser.read_le::<i8>()?),
        OperandType::BranchTarget32 => Operand::Branch(parser.read_le::<i32>()?),
    };

    Ok(Instruction {
        prefix,
        opcode,
        operand,
    })
}

/// Decode `code` completely
///
/// # Errors
/// Fails on the first instruction [`decode_instruction`] rejects; an instruction running
/// past the end of `code` is [`Error::OutOfBounds`]
pub fn decode_stream(code: &[u8], strings: &impl UserStringResolver) -> Result<Vec<Instruction>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();

    while parser.has_more_data() {
        instructions.push(decode_instruction(&mut parser, strings)?);
    }

    Ok(instructions)
}
