//! Every fixed table, pointer tables included, written and read back with one row each.

use dotcodec::metadata::{
    root::Root,
    tables::{
        AssemblyOsRow, AssemblyProcessorRow, AssemblyRefOsRow, AssemblyRefProcessorRow,
        AssemblyRefRow, AssemblyRow, ClassLayoutRow, ConstantRow, CustomAttributeRow,
        DeclSecurityRow, EncLogRow, EncMapRow, EventMapRow, EventPtrRow, EventRow,
        ExportedTypeRow, FieldLayoutRow, FieldMarshalRow, FieldPtrRow, FieldRow, FieldRvaRow,
        FileRow, GenericParamConstraintRow, GenericParamRow, ImplMapRow, InterfaceImplRow,
        ManifestResourceAttributes, ManifestResourceRow, MemberRefRow, MethodDefRow,
        MethodImplRow, MethodPtrRow, MethodSemanticsAttributes, MethodSemanticsRow,
        MethodSpecRow, ModuleRefRow, ModuleRow, NestedClassRow, PInvokeAttributes, ParamPtrRow,
        ParamRow, PropertyMapRow, PropertyPtrRow, PropertyRow, StandAloneSigRow,
        TypeAttributes, TypeDefRow, TypeRefRow, TypeSpecRow,
    },
};
use dotcodec::prelude::*;
use uguid::guid;

fn index(kind: TableId, row: u32) -> TableIndex {
    TableIndex::new(kind, row).unwrap()
}

fn populated_module() -> Result<Module> {
    let mut module = Module::new();

    let seed = module.table_mut::<ModuleRow>().unwrap().get_mut(0).unwrap();
    seed.name = "AllTables.dll".into();
    seed.mvid = Some(guid!("0b8e3c9a-51d2-4f60-8a7b-2c4d6e8f1a3b"));

    module.table_mut::<TypeRefRow>().unwrap().push(TypeRefRow {
        resolution_scope: Some(index(TableId::AssemblyRef, 0)),
        name: "Object".into(),
        namespace: "System".into(),
    })?;

    let types = module.table_mut::<TypeDefRow>().unwrap();
    types.push(TypeDefRow {
        name: "<Module>".into(),
        field_list: index(TableId::Field, 0),
        method_list: index(TableId::MethodDef, 0),
        ..TypeDefRow::default()
    })?;
    types.push(TypeDefRow {
        flags: TypeAttributes::PUBLIC,
        name: "Widget".into(),
        namespace: "Sample".into(),
        extends: Some(index(TableId::TypeRef, 0)),
        field_list: index(TableId::Field, 0),
        method_list: index(TableId::MethodDef, 0),
    })?;

    module.table_mut::<FieldPtrRow>().unwrap().push(FieldPtrRow {
        field: index(TableId::Field, 0),
    })?;
    module.table_mut::<FieldRow>().unwrap().push(FieldRow {
        name: "value".into(),
        signature: vec![0x06, 0x08],
        ..FieldRow::default()
    })?;

    module.table_mut::<MethodPtrRow>().unwrap().push(MethodPtrRow {
        method: index(TableId::MethodDef, 0),
    })?;
    module.table_mut::<MethodDefRow>().unwrap().push(MethodDefRow {
        rva: 0x2050,
        name: "Run".into(),
        signature: vec![0x00, 0x01, 0x01, 0x08],
        param_list: index(TableId::Param, 0),
        ..MethodDefRow::default()
    })?;

    module.table_mut::<ParamPtrRow>().unwrap().push(ParamPtrRow {
        param: index(TableId::Param, 0),
    })?;
    module.table_mut::<ParamRow>().unwrap().push(ParamRow {
        sequence: 1,
        name: "count".into(),
        ..ParamRow::default()
    })?;

    module
        .table_mut::<InterfaceImplRow>()
        .unwrap()
        .push(InterfaceImplRow {
            class: index(TableId::TypeDef, 1),
            interface: index(TableId::TypeRef, 0),
        })?;
    module.table_mut::<MemberRefRow>().unwrap().push(MemberRefRow {
        class: index(TableId::TypeRef, 0),
        name: ".ctor".into(),
        signature: vec![0x20, 0x00, 0x01],
    })?;
    module.table_mut::<ConstantRow>().unwrap().push(ConstantRow {
        element_type: 0x08,
        parent: index(TableId::Field, 0),
        value: vec![0x2A, 0x00, 0x00, 0x00],
        ..ConstantRow::default()
    })?;
    module
        .table_mut::<CustomAttributeRow>()
        .unwrap()
        .push(CustomAttributeRow {
            parent: index(TableId::TypeDef, 1),
            constructor: index(TableId::MemberRef, 0),
            value: vec![0x01, 0x00, 0x00, 0x00],
        })?;
    module
        .table_mut::<FieldMarshalRow>()
        .unwrap()
        .push(FieldMarshalRow {
            parent: index(TableId::Field, 0),
            native_type: vec![0x14],
        })?;
    module
        .table_mut::<DeclSecurityRow>()
        .unwrap()
        .push(DeclSecurityRow {
            action: 2,
            parent: index(TableId::TypeDef, 1),
            permission_set: vec![0x2E, 0x00],
        })?;
    module.table_mut::<ClassLayoutRow>().unwrap().push(ClassLayoutRow {
        packing_size: 8,
        class_size: 16,
        parent: index(TableId::TypeDef, 1),
    })?;
    module.table_mut::<FieldLayoutRow>().unwrap().push(FieldLayoutRow {
        offset: 4,
        field: index(TableId::Field, 0),
    })?;
    module
        .table_mut::<StandAloneSigRow>()
        .unwrap()
        .push(StandAloneSigRow {
            signature: vec![0x07, 0x01, 0x08],
        })?;

    module.table_mut::<EventMapRow>().unwrap().push(EventMapRow {
        parent: index(TableId::TypeDef, 1),
        event_list: index(TableId::Event, 0),
    })?;
    module.table_mut::<EventPtrRow>().unwrap().push(EventPtrRow {
        event: index(TableId::Event, 0),
    })?;
    module.table_mut::<EventRow>().unwrap().push(EventRow {
        name: "Changed".into(),
        event_type: Some(index(TableId::TypeRef, 0)),
        ..EventRow::default()
    })?;

    module.table_mut::<PropertyMapRow>().unwrap().push(PropertyMapRow {
        parent: index(TableId::TypeDef, 1),
        property_list: index(TableId::Property, 0),
    })?;
    module.table_mut::<PropertyPtrRow>().unwrap().push(PropertyPtrRow {
        property: index(TableId::Property, 0),
    })?;
    module.table_mut::<PropertyRow>().unwrap().push(PropertyRow {
        name: "Value".into(),
        signature: vec![0x28, 0x00, 0x08],
        ..PropertyRow::default()
    })?;

    module
        .table_mut::<MethodSemanticsRow>()
        .unwrap()
        .push(MethodSemanticsRow {
            semantics: MethodSemanticsAttributes::from_bits_retain(0x0002),
            method: index(TableId::MethodDef, 0),
            association: index(TableId::Property, 0),
        })?;
    module.table_mut::<MethodImplRow>().unwrap().push(MethodImplRow {
        class: index(TableId::TypeDef, 1),
        body: index(TableId::MethodDef, 0),
        declaration: index(TableId::MemberRef, 0),
    })?;
    module.table_mut::<ModuleRefRow>().unwrap().push(ModuleRefRow {
        name: "native.dll".into(),
    })?;
    module.table_mut::<TypeSpecRow>().unwrap().push(TypeSpecRow {
        signature: vec![0x1D, 0x08],
    })?;
    module.table_mut::<ImplMapRow>().unwrap().push(ImplMapRow {
        flags: PInvokeAttributes::from_bits_retain(0x0100),
        member_forwarded: index(TableId::MethodDef, 0),
        import_name: "run".into(),
        import_scope: index(TableId::ModuleRef, 0),
    })?;
    module.table_mut::<FieldRvaRow>().unwrap().push(FieldRvaRow {
        rva: 0x4000,
        field: index(TableId::Field, 0),
    })?;
    module.table_mut::<EncLogRow>().unwrap().push(EncLogRow {
        token: 0x0200_0002,
        func_code: 0,
    })?;
    module.table_mut::<EncMapRow>().unwrap().push(EncMapRow {
        token: 0x0200_0002,
    })?;

    module.table_mut::<AssemblyRow>().unwrap().push(AssemblyRow {
        hash_alg_id: 0x8004,
        major_version: 1,
        minor_version: 2,
        build_number: 3,
        revision_number: 4,
        name: "AllTables".into(),
        ..AssemblyRow::default()
    })?;
    module
        .table_mut::<AssemblyProcessorRow>()
        .unwrap()
        .push(AssemblyProcessorRow { processor: 0x014C })?;
    module.table_mut::<AssemblyOsRow>().unwrap().push(AssemblyOsRow {
        os_platform_id: 2,
        os_major_version: 6,
        os_minor_version: 1,
    })?;
    module.table_mut::<AssemblyRefRow>().unwrap().push(AssemblyRefRow {
        major_version: 4,
        public_key_or_token: vec![0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89],
        name: "mscorlib".into(),
        ..AssemblyRefRow::default()
    })?;
    module
        .table_mut::<AssemblyRefProcessorRow>()
        .unwrap()
        .push(AssemblyRefProcessorRow {
            processor: 0x014C,
            assembly_ref: index(TableId::AssemblyRef, 0),
        })?;
    module
        .table_mut::<AssemblyRefOsRow>()
        .unwrap()
        .push(AssemblyRefOsRow {
            os_platform_id: 2,
            os_major_version: 6,
            os_minor_version: 1,
            assembly_ref: index(TableId::AssemblyRef, 0),
        })?;
    module.table_mut::<FileRow>().unwrap().push(FileRow {
        name: "extra.netmodule".into(),
        hash_value: vec![0xAA; 20],
        ..FileRow::default()
    })?;
    module
        .table_mut::<ExportedTypeRow>()
        .unwrap()
        .push(ExportedTypeRow {
            flags: TypeAttributes::PUBLIC,
            type_def_id: 0x0200_0002,
            name: "Forwarded".into(),
            namespace: "Sample".into(),
            implementation: index(TableId::AssemblyRef, 0),
        })?;
    module
        .table_mut::<ManifestResourceRow>()
        .unwrap()
        .push(ManifestResourceRow {
            offset: 0,
            flags: ManifestResourceAttributes::from_bits_retain(0x0001),
            name: "data.bin".into(),
            implementation: None,
        })?;

    module.table_mut::<NestedClassRow>().unwrap().push(NestedClassRow {
        nested_class: index(TableId::TypeDef, 1),
        enclosing_class: index(TableId::TypeDef, 0),
    })?;
    module
        .table_mut::<GenericParamRow>()
        .unwrap()
        .push(GenericParamRow {
            number: 0,
            owner: index(TableId::TypeDef, 1),
            name: "T".into(),
            ..GenericParamRow::default()
        })?;
    module.table_mut::<MethodSpecRow>().unwrap().push(MethodSpecRow {
        method: index(TableId::MethodDef, 0),
        instantiation: vec![0x0A, 0x01, 0x08],
    })?;
    module
        .table_mut::<GenericParamConstraintRow>()
        .unwrap()
        .push(GenericParamConstraintRow {
            owner: index(TableId::GenericParam, 0),
            constraint: index(TableId::TypeRef, 0),
        })?;

    Ok(module)
}

fn assert_tables_match(expected: &Module, actual: &Module) {
    for table in expected.all_tables() {
        let other = actual.get_by_table(table.kind()).unwrap();
        assert_eq!(other.len(), table.len(), "row count of {}", table.kind());
        assert!(table.table_eq(other), "rows of {}", table.kind());
    }
}

#[test]
fn every_fixed_table_round_trips() -> Result<()> {
    let module = populated_module()?;
    assert_eq!(module.all_tables().count(), 0x2D);
    assert!(module.all_tables().all(|table| !table.is_empty()));

    let bytes = write_module_to_vec(&module, &WriteOptions::preserve_order())?;
    let read = read_module(&bytes, &ReadOptions::strict())?;
    assert_tables_match(&module, &read);
    assert_eq!(read, module);

    let seed = read.table::<ModuleRow>().unwrap().get(0).unwrap();
    assert_eq!(seed.name, "AllTables.dll");
    assert_eq!(
        seed.mvid,
        Some(guid!("0b8e3c9a-51d2-4f60-8a7b-2c4d6e8f1a3b"))
    );
    Ok(())
}

#[test]
fn every_fixed_table_round_trips_sorted() -> Result<()> {
    // One row per table, so sorting keeps every row where it is
    let module = populated_module()?;
    let bytes = write_module_to_vec(&module, &WriteOptions::default())?;
    let read = read_module(&bytes, &ReadOptions::strict())?;
    assert_tables_match(&module, &read);
    assert_eq!(read, module);
    Ok(())
}

#[test]
fn pointer_tables_use_uncompressed_stream() -> Result<()> {
    let module = populated_module()?;
    let bytes = write_module_to_vec(&module, &WriteOptions::preserve_order())?;

    let root = Root::read(&bytes)?;
    assert!(root.stream("#-").is_some());
    assert!(root.stream("#~").is_none());

    // Without pointer rows the compressed name comes back
    let mut compressed = module.clone();
    compressed.table_mut::<FieldPtrRow>().unwrap().rows_mut().clear();
    compressed.table_mut::<MethodPtrRow>().unwrap().rows_mut().clear();
    compressed.table_mut::<ParamPtrRow>().unwrap().rows_mut().clear();
    compressed.table_mut::<EventPtrRow>().unwrap().rows_mut().clear();
    compressed.table_mut::<PropertyPtrRow>().unwrap().rows_mut().clear();

    let bytes = write_module_to_vec(&compressed, &WriteOptions::preserve_order())?;
    let root = Root::read(&bytes)?;
    assert!(root.stream("#~").is_some());
    assert!(root.stream("#-").is_none());
    assert_eq!(read_module(&bytes, &ReadOptions::strict())?, compressed);
    Ok(())
}
