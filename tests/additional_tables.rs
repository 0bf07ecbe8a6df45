//! Integration tests for caller-defined tables beyond the ECMA-335 set.

use dotcodec::metadata::tables::{FieldRow, HeapKind, MethodDefRow, ModuleRefRow, TypeDefRow};
use dotcodec::prelude::*;

dotcodec::metadata_row! {
    /// Annotates a method with a short note
    pub struct NoteRow {
        /// Annotated method
        method: TableIndex = ColumnKind::table(TableId::MethodDef),
        /// Note text
        text: String = ColumnKind::Heap(HeapKind::String),
        /// Priority
        priority: u16 = ColumnKind::Constant(2),
    }
}

dotcodec::metadata_row! {
    /// Points at a row of the note table
    pub struct NoteLinkRow {
        /// The note
        note: TableIndex = ColumnKind::Table(TableKind(0x2D)),
        /// Payload
        data: Vec<u8> = ColumnKind::Heap(HeapKind::Blob),
    }
}

dotcodec::metadata_row! {
    /// A weighted label
    pub struct TagRow {
        /// Weight
        weight: u32 = ColumnKind::Constant(4),
        /// Label text
        label: String = ColumnKind::Heap(HeapKind::String),
    }
}

const NOTES: u8 = 0x2D;
const LINKS: u8 = 0x50;

fn index(kind: impl Into<TableKind>, row: u32) -> TableIndex {
    TableIndex::new(kind, row).unwrap()
}

fn registrations() -> Vec<TableRegistration> {
    vec![
        TableRegistration::sorted::<NoteRow>(NOTES, 0).unwrap(),
        TableRegistration::new::<NoteLinkRow>(LINKS).unwrap(),
    ]
}

fn annotated_module() -> Result<Module> {
    let mut module = Module::with_tables(&registrations())?;

    module.table_mut::<TypeDefRow>().unwrap().push(TypeDefRow {
        name: "<Module>".into(),
        field_list: index(TableId::Field, 0),
        method_list: index(TableId::MethodDef, 0),
        ..TypeDefRow::default()
    })?;
    for name in ["First", "Second"] {
        module.table_mut::<MethodDefRow>().unwrap().push(MethodDefRow {
            name: name.into(),
            signature: vec![0x00, 0x00, 0x01],
            param_list: index(TableId::Param, 0),
            ..MethodDefRow::default()
        })?;
    }

    // Notes start out of key order
    let notes = module.additional_mut::<NoteRow>(NOTES).unwrap();
    notes.push(NoteRow {
        method: index(TableId::MethodDef, 1),
        text: "second".into(),
        priority: 2,
    })?;
    notes.push(NoteRow {
        method: index(TableId::MethodDef, 0),
        text: "first".into(),
        priority: 1,
    })?;

    module
        .additional_mut::<NoteLinkRow>(LINKS)
        .unwrap()
        .push(NoteLinkRow {
            note: index(NOTES, 1),
            data: vec![0xCA, 0xFE],
        })?;
    Ok(module)
}

#[test]
fn round_trip_preserving_order() -> Result<()> {
    let module = annotated_module()?;
    let bytes = write_module_to_vec(&module, &WriteOptions::preserve_order())?;

    let read = read_module(&bytes, &ReadOptions::with_tables(&registrations()))?;
    assert_eq!(read, module);
    assert_eq!(read.get_additional_table(NOTES).map(|t| t.len()), Some(2));
    assert_eq!(read.get_additional_table(LINKS).map(|t| t.len()), Some(1));
    Ok(())
}

fn tag(weight: u32, label: &str) -> TagRow {
    TagRow {
        weight,
        label: label.into(),
    }
}

#[test]
fn two_column_table_through_codec() -> Result<()> {
    // In the valid vector, on the extension bit itself and at the top of the extension block
    for kind in [0x2D, 0x3F, 0xFF] {
        let registrations = [TableRegistration::new::<TagRow>(kind)?];
        let options = ReadOptions::with_tables(&registrations);
        let mut module = Module::with_tables(&registrations)?;
        module.additional_mut::<TagRow>(kind).unwrap().push(tag(1, "alpha"))?;

        let bytes = write_module_to_vec(&module, &WriteOptions::default())?;
        let read = read_module(&bytes, &options)?;
        assert_eq!(read, module);
        assert_eq!(write_module_to_vec(&read, &WriteOptions::default())?, bytes);

        // A new row survives the next round trip
        module.additional_mut::<TagRow>(kind).unwrap().push(tag(2, "beta"))?;
        let bytes = write_module_to_vec(&module, &WriteOptions::default())?;
        let grown = read_module(&bytes, &options)?;
        assert_eq!(grown, module);
        assert_ne!(grown, read);
        assert_eq!(
            grown.additional::<TagRow>(kind).unwrap().get(1),
            Some(&tag(2, "beta"))
        );

        // Clearing the table makes the modules differ
        let mut cleared = grown.clone();
        cleared.additional_mut::<TagRow>(kind).unwrap().rows_mut().clear();
        assert_ne!(cleared, grown);
        let bytes = write_module_to_vec(&cleared, &WriteOptions::default())?;
        let reread = read_module(&bytes, &options)?;
        assert_eq!(reread, cleared);
        assert!(reread.get_additional_table(kind).unwrap().is_empty());
    }
    Ok(())
}

#[test]
fn sorted_with_references_remapped() -> Result<()> {
    let module = annotated_module()?;
    let bytes = write_module_to_vec(&module, &WriteOptions::default())?;
    let read = read_module(&bytes, &ReadOptions::with_tables(&registrations()))?;

    let notes = read.additional::<NoteRow>(NOTES).unwrap();
    let texts: Vec<&str> = notes.iter().map(|row| row.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);

    // The link followed "first" to its new position
    let link = read.additional::<NoteLinkRow>(LINKS).unwrap().get(0).unwrap();
    assert_eq!(link.note, index(NOTES, 0));
    assert_eq!(link.data, vec![0xCA, 0xFE]);
    Ok(())
}

#[test]
fn unregistered_tables_fail() -> Result<()> {
    let module = annotated_module()?;
    let bytes = write_module_to_vec(&module, &WriteOptions::default())?;

    assert!(read_module(&bytes, &ReadOptions::default()).is_err());

    let only_notes = [TableRegistration::sorted::<NoteRow>(NOTES, 0)?];
    assert!(read_module(&bytes, &ReadOptions::with_tables(&only_notes)).is_err());
    Ok(())
}

#[test]
fn registration_rules() -> Result<()> {
    assert!(matches!(
        TableRegistration::new::<ModuleRefRow>(0x02),
        Err(Error::TableKindCollision(0x02))
    ));

    let duplicate = [
        TableRegistration::new::<NoteRow>(0x60)?,
        TableRegistration::new::<NoteLinkRow>(0x60)?,
    ];
    assert!(Module::with_tables(&duplicate).is_err());

    // Tables can change while the module is empty, not after rows exist
    let mut module = Module::new();
    module.register_table(TableRegistration::new::<NoteRow>(0x61)?)?;
    module.unregister_table(0x61)?;
    module.table_mut::<FieldRow>().unwrap().push(FieldRow::default())?;
    assert!(matches!(
        module.register_table(TableRegistration::new::<NoteRow>(0x61)?),
        Err(Error::TablesPopulated)
    ));
    Ok(())
}
