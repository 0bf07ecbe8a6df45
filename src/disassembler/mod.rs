//! CIL instruction streams: opcode tables, decoding and encoding.
//!
//! Instructions decode into [`Instruction`] values whose operands are already resolved:
//! metadata tokens become zero-based [`crate::metadata::token::TableIndex`] values, and
//! `ldstr` literals are looked up in the `#US` heap. Encoding is the exact inverse, so
//! `encode_stream(decode_stream(code))` reproduces `code` when the strings go back into the
//! heap they came from.
//!
//! # Key Types
//! - [`Instruction`] - A decoded CIL instruction
//! - [`Operand`] - Instruction operands (immediates, tokens, strings, branch offsets)
//! - [`FlowType`] - How instructions affect control flow
//!
//! # Main Functions
//! - [`decode_instruction`] / [`decode_stream`] - Bytes to instructions
//! - [`encode_instruction`] / [`encode_stream`] - Instructions to bytes

mod decoder;
mod encoder;
mod instruction;
mod instructions;

pub use decoder::{decode_instruction, decode_stream};
pub use encoder::{encode_instruction, encode_stream};
pub use instruction::{FlowType, Instruction, Operand, OperandType};
pub use instructions::{CilInstruction, FE_PREFIX, INSTRUCTIONS, INSTRUCTIONS_FE};
