//! Opcode tables for the one-byte and `0xFE`-prefixed CIL instruction sets (ECMA-335 III).
//!
//! Both tables are indexed by the opcode byte. Unassigned slots carry an empty mnemonic.

use crate::disassembler::{FlowType, OperandType};

/// Static description of one CIL opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CilInstruction {
    /// Mnemonic as written in IL assembly, empty for unassigned opcodes
    pub instr: &'static str,
    /// The operand that follows the opcode
    pub op_type: OperandType,
    /// Effect on control flow
    pub flow: FlowType,
}

impl CilInstruction {
    /// True if the opcode is assigned
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.instr.is_empty()
    }
}

const RESERVED: CilInstruction = op("", OperandType::None, FlowType::Sequential);

const fn op(instr: &'static str, op_type: OperandType, flow: FlowType) -> CilInstruction {
    CilInstruction {
        instr,
        op_type,
        flow,
    }
}

const fn seq(instr: &'static str) -> CilInstruction {
    op(instr, OperandType::None, FlowType::Sequential)
}

const fn with(instr: &'static str, op_type: OperandType) -> CilInstruction {
    op(instr, op_type, FlowType::Sequential)
}

const fn short_branch(instr: &'static str) -> CilInstruction {
    op(instr, OperandType::BranchTarget8, FlowType::ConditionalBranch)
}

const fn branch(instr: &'static str) -> CilInstruction {
    op(instr, OperandType::BranchTarget32, FlowType::ConditionalBranch)
}

#[allow(clippy::too_many_lines)]
const fn one_byte(opcode: u8) -> CilInstruction {
    use OperandType::{Float32, Float64, Int32, Int64, Int8, String, Switch, Token, UInt8};

    match opcode {
        0x00 => seq("nop"),
        0x01 => seq("break"),
        0x02 => seq("ldarg.0"),
        0x03 => seq("ldarg.1"),
        0x04 => seq("ldarg.2"),
        0x05 => seq("ldarg.3"),
        0x06 => seq("ldloc.0"),
        0x07 => seq("ldloc.1"),
        0x08 => seq("ldloc.2"),
        0x09 => seq("ldloc.3"),
        0x0A => seq("stloc.0"),
        0x0B => seq("stloc.1"),
        0x0C => seq("stloc.2"),
        0x0D => seq("stloc.3"),
        0x0E => with("ldarg.s", UInt8),
        0x0F => with("ldarga.s", UInt8),
        0x10 => with("starg.s", UInt8),
        0x11 => with("ldloc.s", UInt8),
        0x12 => with("ldloca.s", UInt8),
        0x13 => with("stloc.s", UInt8),
        0x14 => seq("ldnull"),
        0x15 => seq("ldc.i4.m1"),
        0x16 => seq("ldc.i4.0"),
        0x17 => seq("ldc.i4.1"),
        0x18 => seq("ldc.i4.2"),
        0x19 => seq("ldc.i4.3"),
        0x1A => seq("ldc.i4.4"),
        0x1B => seq("ldc.i4.5"),
        0x1C => seq("ldc.i4.6"),
        0x1D => seq("ldc.i4.7"),
        0x1E => seq("ldc.i4.8"),
        0x1F => with("ldc.i4.s", Int8),
        0x20 => with("ldc.i4", Int32),
        0x21 => with("ldc.i8", Int64),
        0x22 => with("ldc.r4", Float32),
        0x23 => with("ldc.r8", Float64),
        0x25 => seq("dup"),
        0x26 => seq("pop"),
        0x27 => op("jmp", Token, FlowType::Call),
        0x28 => op("call", Token, FlowType::Call),
        0x29 => op("calli", Token, FlowType::Call),
        0x2A => op("ret", OperandType::None, FlowType::Return),
        0x2B => op("br.s", OperandType::BranchTarget8, FlowType::UnconditionalBranch),
        0x2C => short_branch("brfalse.s"),
        0x2D => short_branch("brtrue.s"),
        0x2E => short_branch("beq.s"),
        0x2F => short_branch("bge.s"),
        0x30 => short_branch("bgt.s"),
        0x31 => short_branch("ble.s"),
        0x32 => short_branch("blt.s"),
        0x33 => short_branch("bne.un.s"),
        0x34 => short_branch("bge.un.s"),
        0x35 => short_branch("bgt.un.s"),
        0x36 => short_branch("ble.un.s"),
        0x37 => short_branch("blt.un.s"),
        0x38 => op("br", OperandType::BranchTarget32, FlowType::UnconditionalBranch),
        0x39 => branch("brfalse"),
        0x3A => branch("brtrue"),
        0x3B => branch("beq"),
        0x3C => branch("bge"),
        0x3D => branch("bgt"),
        0x3E => branch("ble"),
        0x3F => branch("blt"),
        0x40 => branch("bne.un"),
        0x41 => branch("bge.un"),
        0x42 => branch("bgt.un"),
        0x43 => branch("ble.un"),
        0x44 => branch("blt.un"),
        0x45 => op("switch", Switch, FlowType::Switch),
        0x46 => seq("ldind.i1"),
        0x47 => seq("ldind.u1"),
        0x48 => seq("ldind.i2"),
        0x49 => seq("ldind.u2"),
        0x4A => seq("ldind.i4"),
        0x4B => seq("ldind.u4"),
        0x4C => seq("ldind.i8"),
        0x4D => seq("ldind.i"),
        0x4E => seq("ldind.r4"),
        0x4F => seq("ldind.r8"),
        0x50 => seq("ldind.ref"),
        0x51 => seq("stind.ref"),
        0x52 => seq("stind.i1"),
        0x53 => seq("stind.i2"),
        0x54 => seq("stind.i4"),
        0x55 => seq("stind.i8"),
        0x56 => seq("stind.r4"),
        0x57 => seq("stind.r8"),
        0x58 => seq("add"),
        0x59 => seq("sub"),
        0x5A => seq("mul"),
        0x5B => seq("div"),
        0x5C => seq("div.un"),
        0x5D => seq("rem"),
        0x5E => seq("rem.un"),
        0x5F => seq("and"),
        0x60 => seq("or"),
        0x61 => seq("xor"),
        0x62 => seq("shl"),
        0x63 => seq("shr"),
        0x64 => seq("shr.un"),
        0x65 => seq("neg"),
        0x66 => seq("not"),
        0x67 => seq("conv.i1"),
        0x68 => seq("conv.i2"),
        0x69 => seq("conv.i4"),
        0x6A => seq("conv.i8"),
        0x6B => seq("conv.r4"),
        0x6C => seq("conv.r8"),
        0x6D => seq("conv.u4"),
        0x6E => seq("conv.u8"),
        0x6F => op("callvirt", Token, FlowType::Call),
        0x70 => with("cpobj", Token),
        0x71 => with("ldobj", Token),
        0x72 => with("ldstr", String),
        0x73 => op("newobj", Token, FlowType::Call),
        0x74 => with("castclass", Token),
        0x75 => with("isinst", Token),
        0x76 => seq("conv.r.un"),
        0x79 => with("unbox", Token),
        0x7A => op("throw", OperandType::None, FlowType::Throw),
        0x7B => with("ldfld", Token),
        0x7C => with("ldflda", Token),
        0x7D => with("stfld", Token),
        0x7E => with("ldsfld", Token),
        0x7F => with("ldsflda", Token),
        0x80 => with("stsfld", Token),
        0x81 => with("stobj", Token),
        0x82 => seq("conv.ovf.i1.un"),
        0x83 => seq("conv.ovf.i2.un"),
        0x84 => seq("conv.ovf.i4.un"),
        0x85 => seq("conv.ovf.i8.un"),
        0x86 => seq("conv.ovf.u1.un"),
        0x87 => seq("conv.ovf.u2.un"),
        0x88 => seq("conv.ovf.u4.un"),
        0x89 => seq("conv.ovf.u8.un"),
        0x8A => seq("conv.ovf.i.un"),
        0x8B => seq("conv.ovf.u.un"),
        0x8C => with("box", Token),
        0x8D => with("newarr", Token),
        0x8E => seq("ldlen"),
        0x8F => with("ldelema", Token),
        0x90 => seq("ldelem.i1"),
        0x91 => seq("ldelem.u1"),
        0x92 => seq("ldelem.i2"),
        0x93 => seq("ldelem.u2"),
        0x94 => seq("ldelem.i4"),
        0x95 => seq("ldelem.u4"),
        0x96 => seq("ldelem.i8"),
        0x97 => seq("ldelem.i"),
        0x98 => seq("ldelem.r4"),
        0x99 => seq("ldelem.r8"),
        0x9A => seq("ldelem.ref"),
        0x9B => seq("stelem.i"),
        0x9C => seq("stelem.i1"),
        0x9D => seq("stelem.i2"),
        0x9E => seq("stelem.i4"),
        0x9F => seq("stelem.i8"),
        0xA0 => seq("stelem.r4"),
        0xA1 => seq("stelem.r8"),
        0xA2 => seq("stelem.ref"),
        0xA3 => with("ldelem", Token),
        0xA4 => with("stelem", Token),
        0xA5 => with("unbox.any", Token),
        0xB3 => seq("conv.ovf.i1"),
        0xB4 => seq("conv.ovf.u1"),
        0xB5 => seq("conv.ovf.i2"),
        0xB6 => seq("conv.ovf.u2"),
        0xB7 => seq("conv.ovf.i4"),
        0xB8 => seq("conv.ovf.u4"),
        0xB9 => seq("conv.ovf.i8"),
        0xBA => seq("conv.ovf.u8"),
        0xC2 => with("refanyval", Token),
        0xC3 => seq("ckfinite"),
        0xC6 => with("mkrefany", Token),
        0xD0 => with("ldtoken", Token),
        0xD1 => seq("conv.u2"),
        0xD2 => seq("conv.u1"),
        0xD3 => seq("conv.i"),
        0xD4 => seq("conv.ovf.i"),
        0xD5 => seq("conv.ovf.u"),
        0xD6 => seq("add.ovf"),
        0xD7 => seq("add.ovf.un"),
        0xD8 => seq("mul.ovf"),
        0xD9 => seq("mul.ovf.un"),
        0xDA => seq("sub.ovf"),
        0xDB => seq("sub.ovf.un"),
        0xDC => op("endfinally", OperandType::None, FlowType::EndFinally),
        0xDD => op("leave", OperandType::BranchTarget32, FlowType::Leave),
        0xDE => op("leave.s", OperandType::BranchTarget8, FlowType::Leave),
        0xDF => seq("stind.i"),
        0xE0 => seq("conv.u"),
        _ => RESERVED,
    }
}

const fn two_byte(opcode: u8) -> CilInstruction {
    use OperandType::{Token, UInt16, UInt8};

    match opcode {
        0x00 => seq("arglist"),
        0x01 => seq("ceq"),
        0x02 => seq("cgt"),
        0x03 => seq("cgt.un"),
        0x04 => seq("clt"),
        0x05 => seq("clt.un"),
        0x06 => with("ldftn", Token),
        0x07 => with("ldvirtftn", Token),
        0x09 => with("ldarg", UInt16),
        0x0A => with("ldarga", UInt16),
        0x0B => with("starg", UInt16),
        0x0C => with("ldloc", UInt16),
        0x0D => with("ldloca", UInt16),
        0x0E => with("stloc", UInt16),
        0x0F => seq("localloc"),
        0x11 => op("endfilter", OperandType::None, FlowType::EndFinally),
        0x12 => with("unaligned.", UInt8),
        0x13 => seq("volatile."),
        0x14 => seq("tail."),
        0x15 => with("initobj", Token),
        0x16 => with("constrained.", Token),
        0x17 => seq("cpblk"),
        0x18 => seq("initblk"),
        0x19 => with("no.", UInt8),
        0x1A => op("rethrow", OperandType::None, FlowType::Throw),
        0x1C => with("sizeof", Token),
        0x1D => seq("refanytype"),
        0x1E => seq("readonly."),
        _ => RESERVED,
    }
}

/// One-byte opcodes, indexed by opcode
pub static INSTRUCTIONS: [CilInstruction; 256] = {
    let mut table = [RESERVED; 256];
    let mut opcode = 0;
    while opcode < 256 {
        table[opcode] = one_byte(opcode as u8);
        opcode += 1;
    }
    table
};

/// Opcodes following the `0xFE` prefix, indexed by the second byte
pub static INSTRUCTIONS_FE: [CilInstruction; 32] = {
    let mut table = [RESERVED; 32];
    let mut opcode = 0;
    while opcode < 32 {
        table[opcode] = two_byte(opcode as u8);
        opcode += 1;
    }
    table
};

/// The prefix byte selecting [`INSTRUCTIONS_FE`]
pub const FE_PREFIX: u8 = 0xFE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_shape() {
        assert_eq!(INSTRUCTIONS.iter().filter(|i| i.is_valid()).count(), 191);
        assert_eq!(INSTRUCTIONS_FE.iter().filter(|i| i.is_valid()).count(), 28);
        assert!(!INSTRUCTIONS[usize::from(FE_PREFIX)].is_valid());
        assert_eq!(INSTRUCTIONS[0x72].op_type, OperandType::String);
        assert_eq!(INSTRUCTIONS_FE[0x0C].instr, "ldloc");
    }

    #[test]
    fn unique_mnemonics() {
        let mut names: Vec<&str> = INSTRUCTIONS
            .iter()
            .chain(INSTRUCTIONS_FE.iter())
            .filter(|i| i.is_valid())
            .map(|i| i.instr)
            .collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
