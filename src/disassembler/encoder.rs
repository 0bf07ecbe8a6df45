//! CIL instruction encoding, the exact inverse of [`super::decode_stream`].

use crate::{
    disassembler::{decoder::USER_STRING_TABLE, Instruction, Operand, FE_PREFIX},
    file::io::write_le_at,
    metadata::{method::UserStringEncoder, token::Token},
    Result,
};

/// Append one instruction to `buffer` at `offset`
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for an invalid opcode, an operand that does not match
/// the opcode, a token of a table IL may not reference, or a string the encoder rejects
pub fn encode_instruction(
    instruction: &Instruction,
    buffer: &mut Vec<u8>,
    offset: &mut usize,
    strings: &mut impl UserStringEncoder,
) -> Result<()> {
    let info = instruction.info();
    if !info.is_valid() {
        return Err(malformed_error!(
            "Invalid opcode {:#04x}:{:#04x}",
            instruction.prefix,
            instruction.opcode
        ));
    }
    if !instruction.operand.matches(info.op_type) {
        return Err(malformed_error!(
            "{} expects a {:?} operand, got {:?}",
            info.instr,
            info.op_type,
            instruction.operand
        ));
    }

    if instruction.prefix == FE_PREFIX {
        write_le_at(buffer, offset, FE_PREFIX);
    }
    write_le_at(buffer, offset, instruction.opcode);

    match &instruction.operand {
        Operand::None => {}
        Operand::Int8(value) | Operand::BranchShort(value) => write_le_at(buffer, offset, *value),
        Operand::UInt8(value) => write_le_at(buffer, offset, *value),
        Operand::UInt16(value) => write_le_at(buffer, offset, *value),
        Operand::Int32(value) | Operand::Branch(value) => write_le_at(buffer, offset, *value),
        Operand::Int64(value) => write_le_at(buffer, offset, *value),
        Operand::Float32(value) => write_le_at(buffer, offset, *value),
        Operand::Float64(value) => write_le_at(buffer, offset, *value),
        Operand::Token(index) => write_le_at(buffer, offset, index.to_il_token()?.value()),
        Operand::String(value) => {
            let heap_offset = strings.encode(value)?;
            let token = Token::from_parts(USER_STRING_TABLE, heap_offset);
            if token.row() != heap_offset {
                return Err(malformed_error!(
                    "#US offset {:#x} does not fit an ldstr token",
                    heap_offset
                ));
            }
            write_le_at(buffer, offset, token.value());
        }
        Operand::Switch(targets) => {
            let count = u32::try_from(targets.len())
                .map_err(|_| malformed_error!("Switch with {} targets", targets.len()))?;
            write_le_at(buffer, offset, count);
            for target in targets {
                write_le_at(buffer, offset, *target);
            }
        }
    }

    Ok(())
}

/// Encode a complete instruction stream
///
/// # Errors
/// Fails on the first instruction [`encode_instruction`] rejects
pub fn encode_stream(
    instructions: &[Instruction],
    strings: &mut impl UserStringEncoder,
) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(instructions.iter().map(Instruction::size).sum());
    let mut offset = 0;

    for instruction in instructions {
        encode_instruction(instruction, &mut buffer, &mut offset, strings)?;
    }

    Ok(buffer)
}
