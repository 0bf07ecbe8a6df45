//! Integration tests for method bodies: headers, exception sections, locals and `ldstr`
//! literals that travel through a module's `#US` heap.

use dotcodec::metadata::{
    signatures::{
        encode_local_var_signature, SignatureLocalVariable, SignatureLocalVariables,
        TypeSignature,
    },
    tables::{MemberRefRow, StandAloneSigRow, TypeRefRow},
};
use dotcodec::prelude::*;

fn index(kind: TableId, row: u32) -> TableIndex {
    TableIndex::new(kind, row).unwrap()
}

fn module_with_references() -> Result<Module> {
    let mut module = Module::new();
    module.table_mut::<TypeRefRow>().unwrap().push(TypeRefRow {
        resolution_scope: None,
        name: "Exception".into(),
        namespace: "System".into(),
    })?;
    module.table_mut::<MemberRefRow>().unwrap().push(MemberRefRow {
        class: index(TableId::TypeRef, 0),
        name: "WriteLine".into(),
        signature: vec![0x00, 0x01, 0x01, 0x0E],
    })?;

    let locals = encode_local_var_signature(&SignatureLocalVariables {
        locals: vec![
            SignatureLocalVariable {
                base: TypeSignature::I4,
                ..SignatureLocalVariable::default()
            },
            SignatureLocalVariable {
                base: TypeSignature::String,
                ..SignatureLocalVariable::default()
            },
        ],
    })?;
    module
        .table_mut::<StandAloneSigRow>()
        .unwrap()
        .push(StandAloneSigRow { signature: locals })?;
    Ok(module)
}

fn guarded_body() -> Result<MethodBody> {
    Ok(MethodBody {
        max_stack: 2,
        init_locals: true,
        local_var_sig: Some(index(TableId::StandAloneSig, 0)),
        instructions: vec![
            Instruction::new("ldstr", Operand::String("hello".into()))?,
            Instruction::new("call", Operand::Token(index(TableId::MemberRef, 0)))?,
            Instruction::new("leave.s", Operand::BranchShort(3))?,
            Instruction::simple("pop")?,
            Instruction::new("leave.s", Operand::BranchShort(0))?,
            Instruction::simple("ret")?,
        ],
        exception_clauses: vec![ExceptionClause {
            kind: ExceptionClauseKind::Catch(index(TableId::TypeRef, 0)),
            try_offset: 0,
            try_length: 12,
            handler_offset: 12,
            handler_length: 3,
        }],
    })
}

#[test]
fn fat_body_through_module() -> Result<()> {
    let mut module = module_with_references()?;
    let body = guarded_body()?;

    let bytes = body.write(module.user_strings_mut(), &EncodeOptions::default())?;
    // 12 byte header, 16 bytes of code, one small clause section
    assert_eq!(bytes.len(), 12 + 16 + 4 + 12);
    assert_eq!(&bytes[..2], &[0x1B, 0x30]);
    assert_eq!(bytes[28], 0x01);

    // The literal went into the module heap, so the body survives a metadata round trip
    let metadata = write_module_to_vec(&module, &WriteOptions::default())?;
    let read = read_module(&metadata, &ReadOptions::strict())?;

    let (decoded, size) = MethodBody::read_with_size(&bytes, read.user_strings())?;
    assert_eq!(size, bytes.len());
    assert_eq!(decoded, body);

    let locals = decoded.local_signature(&read)?.unwrap();
    assert_eq!(locals.locals.len(), 2);
    assert_eq!(locals.locals[1].base, TypeSignature::String);
    Ok(())
}

#[test]
fn tiny_and_forced_fat() -> Result<()> {
    let mut strings = UserStrings::new();
    let body = MethodBody {
        instructions: vec![
            Instruction::simple("ldarg.0")?,
            Instruction::simple("ret")?,
        ],
        ..MethodBody::default()
    };
    assert!(body.fits_tiny());

    let tiny = body.write(&mut strings, &EncodeOptions::default())?;
    assert_eq!(tiny, [0x0Au8, 0x02, 0x2A]);
    assert_eq!(MethodBody::read(&tiny, &strings)?, body);

    let fat = body.write(
        &mut strings,
        &EncodeOptions {
            header: HeaderFormat::ForceFat,
        },
    )?;
    assert_eq!(fat.len(), 12 + 2);
    assert_eq!(MethodBody::read(&fat, &strings)?, body);
    Ok(())
}

#[test]
fn large_clauses_use_fat_sections() -> Result<()> {
    let mut strings = UserStrings::new();
    let mut instructions = vec![Instruction::simple("nop")?; 300];
    instructions.push(Instruction::simple("endfinally")?);
    instructions.push(Instruction::simple("ret")?);

    let body = MethodBody {
        instructions,
        exception_clauses: vec![ExceptionClause {
            kind: ExceptionClauseKind::Finally,
            try_offset: 0,
            try_length: 300,
            handler_offset: 300,
            handler_length: 1,
        }],
        ..MethodBody::default()
    };

    let bytes = body.write(&mut strings, &EncodeOptions::default())?;
    let section = 12 + 302;
    let section = (section + 3) & !3;
    assert_eq!(bytes[section], 0x41);
    assert_eq!(bytes.len(), section + 4 + 24);
    assert_eq!(MethodBody::read(&bytes, &strings)?, body);
    Ok(())
}

#[test]
fn malformed_bodies() {
    let strings = UserStrings::new();

    // Neither tiny nor fat
    assert!(matches!(
        MethodBody::read(&[0x00, 0x2A], &strings),
        Err(Error::Malformed { .. })
    ));
    // Tiny body claiming more code than present
    assert!(MethodBody::read(&[(4 << 2) | 0b10, 0x2A], &strings).is_err());
    // Fat header too short
    assert!(MethodBody::read(&[0x03, 0x20, 0x08, 0x00], &strings).is_err());
    // Unknown opcode in the code
    assert!(matches!(
        MethodBody::read(&[(1 << 2) | 0b10, 0x24], &strings),
        Err(Error::UnknownOpcode { opcode: 0x24, .. })
    ));
}
