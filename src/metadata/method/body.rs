//! Method body codec (ECMA-335 II.25.4): header, instruction stream and data sections.

use crate::{
    disassembler::{decode_stream, encode_stream, Instruction},
    file::io::{pad_to, read_bytes_at, read_le_at, write_bytes_at, write_le_at},
    metadata::{
        method::{
            EncodeOptions, ExceptionClause, HeaderFormat, MethodBodyFlags, SectionFlags,
            UserStringEncoder, UserStringResolver, FAT_CLAUSE_SIZE, SMALL_CLAUSE_SIZE,
        },
        module::Module,
        signatures::{parse_local_var_signature, LocalVarSig},
        tables::{StandAloneSigRow, TableId},
        token::{TableIndex, TableKind, Token},
    },
    Error::OutOfBounds,
    Result,
};

/// Size of a fat header in bytes
pub const FAT_HEADER_SIZE: usize = 12;
/// Largest code size a tiny header can describe, exclusive
pub const TINY_CODE_LIMIT: usize = 64;
/// Max stack implied by a tiny header
pub const TINY_MAX_STACK: u16 = 8;

/// A decoded method body.
///
/// Tiny and fat headers are not distinguished here: a tiny body reads as max stack 8, no
/// locals and no clauses, and [`MethodBody::write`] picks the header again.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero-initialize locals on entry
    pub init_locals: bool,
    /// `StandAloneSig` row holding the locals signature
    pub local_var_sig: Option<TableIndex>,
    /// The code
    pub instructions: Vec<Instruction>,
    /// Exception handling clauses, in declaration order
    pub exception_clauses: Vec<ExceptionClause>,
}

impl Default for MethodBody {
    fn default() -> Self {
        MethodBody {
            max_stack: TINY_MAX_STACK,
            init_locals: false,
            local_var_sig: None,
            instructions: Vec::new(),
            exception_clauses: Vec::new(),
        }
    }
}

impl MethodBody {
    /// Decode the body at the start of `data`
    ///
    /// # Errors
    /// Returns an error if the header is neither tiny nor fat, the code or a section is
    /// truncated, or an instruction does not decode
    pub fn read(data: &[u8], strings: &impl UserStringResolver) -> Result<MethodBody> {
        Self::read_with_size(data, strings).map(|(body, _)| body)
    }

    /// Like [`MethodBody::read`], also returning the number of bytes the body occupies
    ///
    /// # Errors
    /// Same as [`MethodBody::read`]
    pub fn read_with_size(
        data: &[u8],
        strings: &impl UserStringResolver,
    ) -> Result<(MethodBody, usize)> {
        let mut offset = 0;
        let first_byte = read_le_at::<u8>(data, &mut offset)?;

        match u16::from(first_byte & 0b11) {
            format if format == MethodBodyFlags::TINY_FORMAT.bits() => {
                let code_size = usize::from(first_byte >> 2);
                let code = read_bytes_at(data, &mut offset, code_size)?;

                let body = MethodBody {
                    instructions: decode_stream(code, strings)?,
                    ..MethodBody::default()
                };
                Ok((body, offset))
            }
            format if format == MethodBodyFlags::FAT_FORMAT.bits() => {
                offset = 0;
                let first_duo = read_le_at::<u16>(data, &mut offset)?;
                let flags = MethodBodyFlags::from_bits_retain(first_duo & 0x0FFF);
                let header_size = usize::from(first_duo >> 12) * 4;
                if header_size < FAT_HEADER_SIZE {
                    return Err(malformed_error!(
                        "Fat method header declares {} bytes",
                        header_size
                    ));
                }
                if header_size > FAT_HEADER_SIZE {
                    log::warn!(
                        "Fat method header declares {} bytes, skipping the extra",
                        header_size
                    );
                }

                let max_stack = read_le_at::<u16>(data, &mut offset)?;
                let code_size = read_le_at::<u32>(data, &mut offset)? as usize;
                let local_var_sig = local_var_sig(Token::new(read_le_at::<u32>(data, &mut offset)?))?;

                offset = header_size;
                let code = read_bytes_at(data, &mut offset, code_size)?;
                let instructions = decode_stream(code, strings)?;

                let mut exception_clauses = Vec::new();
                if flags.contains(MethodBodyFlags::MORE_SECTS) {
                    offset = read_sections(data, offset, &mut exception_clauses)?;
                }

                let body = MethodBody {
                    max_stack,
                    init_locals: flags.contains(MethodBodyFlags::INIT_LOCALS),
                    local_var_sig,
                    instructions,
                    exception_clauses,
                };
                Ok((body, offset))
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {:#04x}",
                first_byte
            )),
        }
    }

    /// Size of the encoded instruction stream
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.instructions.iter().map(Instruction::size).sum()
    }

    /// True if a tiny header can describe this body
    #[must_use]
    pub fn fits_tiny(&self) -> bool {
        self.code_size() < TINY_CODE_LIMIT
            && self.max_stack <= TINY_MAX_STACK
            && self.local_var_sig.is_none()
            && self.exception_clauses.is_empty()
            && !self.init_locals
    }

    /// Encode the body
    ///
    /// `ldstr` literals are added to `strings`.
    ///
    /// # Errors
    /// Returns an error if an instruction does not encode, the locals reference is not a
    /// `StandAloneSig` row, or the clauses do not fit a section
    pub fn write(
        &self,
        strings: &mut impl UserStringEncoder,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>> {
        let code = encode_stream(&self.instructions, strings)?;
        let mut buffer = Vec::with_capacity(FAT_HEADER_SIZE + code.len());
        let mut offset = 0;

        if options.header == HeaderFormat::Auto && self.fits_tiny() {
            // fits_tiny bounds the code below 64 bytes
            write_le_at(&mut buffer, &mut offset, ((code.len() as u8) << 2) | 0b10);
            write_bytes_at(&mut buffer, &mut offset, &code);
            return Ok(buffer);
        }

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }
        if !self.exception_clauses.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }

        let local_token = match self.local_var_sig {
            Some(index) if index.kind() != TableKind::from(TableId::StandAloneSig) => {
                return Err(malformed_error!(
                    "Locals signature {} is not a StandAloneSig row",
                    index
                ))
            }
            index => TableIndex::to_one_based_token_nullable(index),
        };
        let code_size = u32::try_from(code.len())
            .map_err(|_| malformed_error!("Method code of {} bytes is too large", code.len()))?;

        write_le_at(&mut buffer, &mut offset, flags.bits() | (3 << 12));
        write_le_at(&mut buffer, &mut offset, self.max_stack);
        write_le_at(&mut buffer, &mut offset, code_size);
        write_le_at(&mut buffer, &mut offset, local_token.value());
        write_bytes_at(&mut buffer, &mut offset, &code);

        if !self.exception_clauses.is_empty() {
            pad_to(&mut buffer, &mut offset, 4);
            write_section(&self.exception_clauses, &mut buffer, &mut offset)?;
        }

        Ok(buffer)
    }

    /// Parse the locals signature this body references
    ///
    /// # Errors
    /// Returns an error if the `StandAloneSig` row does not exist or its blob is not a
    /// locals signature
    pub fn local_signature(&self, module: &Module) -> Result<Option<LocalVarSig>> {
        let Some(index) = self.local_var_sig else {
            return Ok(None);
        };

        let row = module
            .table::<StandAloneSigRow>()
            .and_then(|table| table.get_by_index(index))
            .ok_or_else(|| malformed_error!("Locals signature {} does not exist", index))?;

        parse_local_var_signature(&row.signature).map(Some)
    }
}

fn local_var_sig(token: Token) -> Result<Option<TableIndex>> {
    if token.is_null() {
        return Ok(None);
    }
    if token.table() != TableKind::from(TableId::StandAloneSig).value() || token.row() == 0 {
        return Err(malformed_error!(
            "Locals token {} is not a StandAloneSig row",
            token
        ));
    }

    Ok(Some(TableIndex::from_one_based_token(token)))
}

/// Read data sections starting at `offset`, returning the offset past the last one
fn read_sections(data: &[u8], mut offset: usize, clauses: &mut Vec<ExceptionClause>) -> Result<usize> {
    loop {
        offset = (offset + 3) & !3;
        let start = offset;

        let kind = SectionFlags::from_bits_retain(read_le_at::<u8>(data, &mut offset)?);
        let fat = kind.contains(SectionFlags::FAT_FORMAT);
        let size = if fat {
            let low = read_le_at::<u16>(data, &mut offset)?;
            let high = read_le_at::<u8>(data, &mut offset)?;
            usize::from(low) | (usize::from(high) << 16)
        } else {
            let size = read_le_at::<u8>(data, &mut offset)?;
            offset += 2;
            usize::from(size)
        };
        if size < 4 {
            return Err(malformed_error!(
                "Method data section at {:#x} has size {}",
                start,
                size
            ));
        }
        if start + size > data.len() {
            return Err(OutOfBounds);
        }

        if kind.contains(SectionFlags::EHTABLE) {
            let clause_size = if fat { FAT_CLAUSE_SIZE } else { SMALL_CLAUSE_SIZE };
            for _ in 0..(size - 4) / clause_size {
                clauses.push(ExceptionClause::read(data, &mut offset, fat)?);
            }
        } else {
            log::debug!(
                "Skipping method data section of kind {:#04x} and {} bytes",
                kind.bits(),
                size
            );
        }

        offset = start + size;
        if !kind.contains(SectionFlags::MORE_SECTS) {
            return Ok(offset);
        }
    }
}

/// Write all clauses as one section, small if every clause and the size fit
fn write_section(
    clauses: &[ExceptionClause],
    buffer: &mut Vec<u8>,
    offset: &mut usize,
) -> Result<()> {
    let small_size = 4 + clauses.len() * SMALL_CLAUSE_SIZE;
    let fat = small_size > usize::from(u8::MAX) || !clauses.iter().all(ExceptionClause::fits_small);

    if fat {
        let size = 4 + clauses.len() * FAT_CLAUSE_SIZE;
        if size > 0x00FF_FFFF {
            return Err(malformed_error!(
                "{} exception clauses do not fit a section",
                clauses.len()
            ));
        }
        let kind = SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT;
        write_le_at(buffer, offset, u32::from(kind.bits()) | ((size as u32) << 8));
    } else {
        write_le_at(buffer, offset, SectionFlags::EHTABLE.bits());
        write_le_at(buffer, offset, small_size as u8);
        write_le_at(buffer, offset, 0u16);
    }

    for clause in clauses {
        clause.write(buffer, offset, fat)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disassembler::Operand,
        metadata::{
            method::ExceptionClauseKind, signatures::TypeSignature, streams::UserStrings,
        },
        Error,
    };

    fn roundtrip(data: &[u8], options: &EncodeOptions) -> MethodBody {
        let mut strings = UserStrings::new();
        let (body, size) = MethodBody::read_with_size(data, &strings).unwrap();
        assert_eq!(size, data.len());
        assert_eq!(body.write(&mut strings, options).unwrap(), data);
        body
    }

    #[test]
    fn tiny() {
        // ldarg.0, ret
        let body = roundtrip(&[0x0A, 0x02, 0x2A], &EncodeOptions::default());
        assert_eq!(body.max_stack, 8);
        assert!(!body.init_locals);
        assert_eq!(body.instructions.len(), 2);
        assert_eq!(body.code_size(), 2);
    }

    #[test]
    fn fat() {
        #[rustfmt::skip]
        let data = [
            0x13, 0x30,             // FAT_FORMAT | INIT_LOCALS, 3 dwords
            0x05, 0x00,             // max_stack = 5
            0x02, 0x00, 0x00, 0x00, // code_size = 2
            0x02, 0x00, 0x00, 0x11, // StandAloneSig 2
            0x00, 0x2A,             // nop, ret
        ];

        let body = roundtrip(&data, &EncodeOptions::default());
        assert_eq!(body.max_stack, 5);
        assert!(body.init_locals);
        assert_eq!(
            body.local_var_sig,
            Some(TableIndex::new(TableId::StandAloneSig, 1).unwrap())
        );
    }

    #[test]
    fn small_exception_section() {
        #[rustfmt::skip]
        let data = [
            0x0B, 0x30,             // FAT_FORMAT | MORE_SECTS
            0x01, 0x00,             // max_stack = 1
            0x06, 0x00, 0x00, 0x00, // code_size = 6
            0x00, 0x00, 0x00, 0x00, // no locals
            0x00,                   // nop
            0xDE, 0x02,             // leave.s +2
            0x00,                   // nop
            0xDC,                   // endfinally
            0x2A,                   // ret
            0x00, 0x00,             // align
            0x01, 0x10, 0x00, 0x00, // EHTABLE, 16 bytes
            0x02, 0x00, 0x00, 0x00, 0x03, 0x03, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00,
        ];

        let body = roundtrip(&data, &EncodeOptions::default());
        assert_eq!(body.instructions[1].operand, Operand::BranchShort(2));
        assert_eq!(body.exception_clauses.len(), 1);
        assert_eq!(body.exception_clauses[0].kind, ExceptionClauseKind::Finally);
        assert_eq!(body.exception_clauses[0].handler_offset, 3);
    }

    #[test]
    fn header_selection() {
        let mut body = MethodBody {
            instructions: vec![Instruction::simple("ret").unwrap()],
            ..MethodBody::default()
        };
        let mut strings = UserStrings::new();

        let auto = body.write(&mut strings, &EncodeOptions::default()).unwrap();
        assert_eq!(auto, [0x06, 0x2A]);

        let forced = EncodeOptions {
            header: HeaderFormat::ForceFat,
        };
        let fat = body.write(&mut strings, &forced).unwrap();
        assert_eq!(fat.len(), FAT_HEADER_SIZE + 1);
        assert_eq!(MethodBody::read(&fat, &strings).unwrap(), body);

        body.max_stack = 9;
        let wide = body.write(&mut strings, &EncodeOptions::default()).unwrap();
        assert_eq!(wide.len(), FAT_HEADER_SIZE + 1);
        assert_eq!(MethodBody::read(&wide, &strings).unwrap().max_stack, 9);
    }

    #[test]
    fn fat_section_for_large_offsets() {
        let body = MethodBody {
            instructions: vec![Instruction::simple("ret").unwrap()],
            exception_clauses: vec![ExceptionClause {
                kind: ExceptionClauseKind::Catch(TableIndex::new(TableId::TypeRef, 0).unwrap()),
                try_offset: 0,
                try_length: 0x1_0000,
                handler_offset: 0x1_0000,
                handler_length: 4,
            }],
            ..MethodBody::default()
        };

        let mut strings = UserStrings::new();
        let bytes = body.write(&mut strings, &EncodeOptions::default()).unwrap();
        // header, code, padding to 16, then a fat section header
        assert_eq!(bytes[16], 0x41);
        assert_eq!(bytes.len(), 16 + 4 + FAT_CLAUSE_SIZE);
        assert_eq!(MethodBody::read(&bytes, &strings).unwrap(), body);
    }

    #[test]
    fn strings_go_through_the_heap() {
        let body = MethodBody {
            instructions: vec![
                Instruction::new("ldstr", Operand::String("Hello".into())).unwrap(),
                Instruction::simple("ret").unwrap(),
            ],
            ..MethodBody::default()
        };

        let mut strings = UserStrings::new();
        let bytes = body.write(&mut strings, &EncodeOptions::default()).unwrap();
        assert_eq!(strings.get(1).unwrap(), "Hello");
        assert_eq!(MethodBody::read(&bytes, &strings).unwrap(), body);
    }

    #[test]
    fn invalid() {
        let strings = UserStrings::new();

        assert!(MethodBody::read(&[], &strings).is_err());
        assert!(MethodBody::read(&[0x01, 0x2A], &strings).is_err());
        // tiny header promising 4 bytes of code
        assert!(matches!(
            MethodBody::read(&[0x12, 0x00], &strings),
            Err(Error::OutOfBounds)
        ));
        assert!(matches!(
            MethodBody::read(&[0x06, 0xA6], &strings),
            Err(Error::UnknownOpcode { opcode: 0xA6, .. })
        ));

        let mut wrong_locals = [0u8; 13];
        wrong_locals[..2].copy_from_slice(&[0x03, 0x30]);
        wrong_locals[4] = 1;
        wrong_locals[8..12].copy_from_slice(&0x0200_0001_u32.to_le_bytes());
        wrong_locals[12] = 0x2A;
        assert!(MethodBody::read(&wrong_locals, &strings).is_err());
        wrong_locals[8..12].fill(0);
        assert!(MethodBody::read(&wrong_locals, &strings).is_ok());
    }

    #[test]
    fn locals_from_module() {
        let mut module = Module::new();
        let index = module
            .table_mut::<StandAloneSigRow>()
            .unwrap()
            .push(StandAloneSigRow {
                signature: vec![0x07, 0x02, 0x08, 0x0E],
            })
            .unwrap();

        let mut body = MethodBody::default();
        assert_eq!(body.local_signature(&module).unwrap(), None);

        body.local_var_sig = Some(index);
        let locals = body.local_signature(&module).unwrap().unwrap();
        assert_eq!(locals.locals[0].base, TypeSignature::I4);
        assert_eq!(locals.locals[1].base, TypeSignature::String);

        body.local_var_sig = Some(TableIndex::new(TableId::StandAloneSig, 7).unwrap());
        assert!(body.local_signature(&module).is_err());
    }
}
