//! Benchmarks for the metadata, method body and PDB codecs.
//!
//! Each codec is measured on a synthetic input of realistic shape:
//! - A module with a few hundred types, methods and member references
//! - A fat method body with an exception clause
//! - A PDB with one module of functions that carry locals and lines

extern crate dotcodec;

use criterion::{criterion_group, criterion_main, Criterion};
use dotcodec::metadata::tables::{FieldRow, MemberRefRow, MethodDefRow, TypeDefRow, TypeRefRow};
use dotcodec::pdb::{PdbFile, PdbFunction, PdbLine, PdbLines, PdbModule, PdbSlot, PdbSource};
use dotcodec::prelude::*;
use std::hint::black_box;
use uguid::Guid;

const TYPES: u32 = 200;
const MEMBERS_PER_TYPE: u32 = 4;

fn index(kind: TableId, row: u32) -> TableIndex {
    TableIndex::new(kind, row).unwrap()
}

fn synthetic_module() -> Module {
    let mut module = Module::new();

    module
        .table_mut::<TypeRefRow>()
        .unwrap()
        .push(TypeRefRow {
            resolution_scope: None,
            name: "Object".into(),
            namespace: "System".into(),
        })
        .unwrap();

    for t in 0..TYPES {
        module
            .table_mut::<TypeDefRow>()
            .unwrap()
            .push(TypeDefRow {
                name: format!("Type{t}"),
                namespace: "Bench".into(),
                extends: Some(index(TableId::TypeRef, 0)),
                field_list: index(TableId::Field, t * MEMBERS_PER_TYPE),
                method_list: index(TableId::MethodDef, t * MEMBERS_PER_TYPE),
                ..TypeDefRow::default()
            })
            .unwrap();

        for m in 0..MEMBERS_PER_TYPE {
            module
                .table_mut::<FieldRow>()
                .unwrap()
                .push(FieldRow {
                    name: format!("field{m}"),
                    signature: vec![0x06, 0x08],
                    ..FieldRow::default()
                })
                .unwrap();
            module
                .table_mut::<MethodDefRow>()
                .unwrap()
                .push(MethodDefRow {
                    rva: 0x2050 + (t * MEMBERS_PER_TYPE + m) * 16,
                    name: format!("Method{m}"),
                    signature: vec![0x20, 0x00, 0x01],
                    param_list: index(TableId::Param, 0),
                    ..MethodDefRow::default()
                })
                .unwrap();
            module
                .table_mut::<MemberRefRow>()
                .unwrap()
                .push(MemberRefRow {
                    class: index(TableId::TypeRef, 0),
                    name: format!("Ref{t}_{m}"),
                    signature: vec![0x20, 0x00, 0x01],
                })
                .unwrap();
        }
    }

    module
}

fn synthetic_body() -> MethodBody {
    let mut instructions = Vec::new();
    for i in 0..40 {
        instructions.push(Instruction::new("ldc.i4", Operand::Int32(i)).unwrap());
        instructions.push(Instruction::simple("pop").unwrap());
    }
    instructions.push(Instruction::new("leave.s", Operand::BranchShort(1)).unwrap());
    instructions.push(Instruction::simple("endfinally").unwrap());
    instructions.push(Instruction::simple("ret").unwrap());

    MethodBody {
        max_stack: 1,
        instructions,
        exception_clauses: vec![ExceptionClause {
            kind: ExceptionClauseKind::Finally,
            try_offset: 0,
            try_length: 242,
            handler_offset: 242,
            handler_length: 1,
        }],
        ..MethodBody::default()
    }
}

fn synthetic_pdb() -> PdbFile {
    let mut pdb = PdbFile::new(Guid::ZERO, 1);
    pdb.sources.push(PdbSource::new("C:\\bench\\Program.cs"));

    let mut module = PdbModule::new("Bench");
    for i in 0..500u32 {
        let mut function =
            PdbFunction::new(0x0600_0001 + i, format!("M{i}"), 1, 0x2050 + i * 32, 16);
        function.slots = vec![PdbSlot {
            slot: 0,
            name: "local".into(),
            ..PdbSlot::default()
        }];
        function.lines = vec![PdbLines {
            file: 0,
            lines: (0..4)
                .map(|l| PdbLine {
                    offset: l * 4,
                    line_begin: i * 10 + l + 1,
                    line_end: i * 10 + l + 1,
                    is_statement: true,
                    ..PdbLine::default()
                })
                .collect(),
        }];
        module.functions.push(function);
    }
    pdb.modules.push(module);
    pdb
}

fn bench_metadata(c: &mut Criterion) {
    let module = synthetic_module();
    let bytes = write_module_to_vec(&module, &WriteOptions::default()).unwrap();

    c.bench_function("metadata_write", |b| {
        b.iter(|| write_module_to_vec(black_box(&module), &WriteOptions::default()).unwrap());
    });
    c.bench_function("metadata_read", |b| {
        b.iter(|| read_module(black_box(&bytes), &ReadOptions::default()).unwrap());
    });
}

fn bench_method_body(c: &mut Criterion) {
    let body = synthetic_body();
    let mut strings = UserStrings::new();
    let bytes = body.write(&mut strings, &EncodeOptions::default()).unwrap();

    c.bench_function("method_body_write", |b| {
        b.iter(|| {
            black_box(&body)
                .write(&mut strings, &EncodeOptions::default())
                .unwrap()
        });
    });
    c.bench_function("method_body_read", |b| {
        b.iter(|| MethodBody::read(black_box(&bytes), &strings).unwrap());
    });
}

fn bench_pdb(c: &mut Criterion) {
    let pdb = synthetic_pdb();
    let bytes = pdb.to_vec().unwrap();

    c.bench_function("pdb_write", |b| {
        b.iter(|| black_box(&pdb).to_vec().unwrap());
    });
    c.bench_function("pdb_read", |b| {
        b.iter(|| PdbFile::read(black_box(&bytes), &PdbReadOptions::default()).unwrap());
    });
}

criterion_group!(benches, bench_metadata, bench_method_body, bench_pdb);
criterion_main!(benches);
