//! Row types of the fixed ECMA-335 tables and the engine that stores them.
//!
//! Every fixed table has a row struct declared with [`crate::metadata_row`], grouped by area:
//! module and type definitions, attached data, members and interop, the assembly manifest and
//! generics. Additional tables reuse the exact same machinery through [`TableRegistration`].
//!
//! # Examples
//!
//! ```rust
//! use dotcodec::metadata::tables::{ModuleRefRow, TableId};
//! use dotcodec::metadata::Module;
//!
//! let mut module = Module::new();
//! let refs = module.table_mut::<ModuleRefRow>().unwrap();
//! let index = refs.push(ModuleRefRow { name: "kernel32.dll".into() })?;
//! assert_eq!(index.kind(), TableId::ModuleRef.into());
//! assert_eq!(index.to_one_based_token().value(), 0x1A00_0001);
//! # Ok::<(), dotcodec::Error>(())
//! ```

mod assembly;
mod attributes;
mod generics;
mod members;
mod typedefs;
mod types;

pub use assembly::*;
pub use attributes::*;
pub use generics::*;
pub use members::*;
pub use typedefs::*;
pub use types::*;

pub(crate) const STRING: ColumnKind = ColumnKind::Heap(HeapKind::String);
pub(crate) const GUID: ColumnKind = ColumnKind::Heap(HeapKind::Guid);
pub(crate) const BLOB: ColumnKind = ColumnKind::Heap(HeapKind::Blob);
pub(crate) const U8: ColumnKind = ColumnKind::Constant(1);
pub(crate) const U16: ColumnKind = ColumnKind::Constant(2);
pub(crate) const U32: ColumnKind = ColumnKind::Constant(4);

/// Column a fixed table is sorted by, for the tables ECMA-335 II.22 requires to be sorted
#[must_use]
pub fn fixed_sort_key(id: TableId) -> Option<usize> {
    match id {
        TableId::InterfaceImpl
        | TableId::CustomAttribute
        | TableId::FieldMarshal
        | TableId::MethodImpl
        | TableId::NestedClass
        | TableId::GenericParamConstraint => Some(0),
        TableId::DeclSecurity | TableId::FieldLayout | TableId::ImplMap | TableId::FieldRVA => {
            Some(1)
        }
        TableId::Constant
        | TableId::ClassLayout
        | TableId::MethodSemantics
        | TableId::GenericParam => Some(2),
        _ => None,
    }
}

fn boxed<R: Row>(id: TableId) -> Box<dyn Table> {
    match fixed_sort_key(id) {
        Some(key) => Box::new(MetadataTable::<R>::with_sort_key(id.into(), key)),
        None => Box::new(MetadataTable::<R>::new(id.into())),
    }
}

/// Create the empty table for fixed table `id`
#[must_use]
pub fn create_fixed_table(id: TableId) -> Box<dyn Table> {
    match id {
        TableId::Module => boxed::<ModuleRow>(id),
        TableId::TypeRef => boxed::<TypeRefRow>(id),
        TableId::TypeDef => boxed::<TypeDefRow>(id),
        TableId::FieldPtr => boxed::<FieldPtrRow>(id),
        TableId::Field => boxed::<FieldRow>(id),
        TableId::MethodPtr => boxed::<MethodPtrRow>(id),
        TableId::MethodDef => boxed::<MethodDefRow>(id),
        TableId::ParamPtr => boxed::<ParamPtrRow>(id),
        TableId::Param => boxed::<ParamRow>(id),
        TableId::InterfaceImpl => boxed::<InterfaceImplRow>(id),
        TableId::MemberRef => boxed::<MemberRefRow>(id),
        TableId::Constant => boxed::<ConstantRow>(id),
        TableId::CustomAttribute => boxed::<CustomAttributeRow>(id),
        TableId::FieldMarshal => boxed::<FieldMarshalRow>(id),
        TableId::DeclSecurity => boxed::<DeclSecurityRow>(id),
        TableId::ClassLayout => boxed::<ClassLayoutRow>(id),
        TableId::FieldLayout => boxed::<FieldLayoutRow>(id),
        TableId::StandAloneSig => boxed::<StandAloneSigRow>(id),
        TableId::EventMap => boxed::<EventMapRow>(id),
        TableId::EventPtr => boxed::<EventPtrRow>(id),
        TableId::Event => boxed::<EventRow>(id),
        TableId::PropertyMap => boxed::<PropertyMapRow>(id),
        TableId::PropertyPtr => boxed::<PropertyPtrRow>(id),
        TableId::Property => boxed::<PropertyRow>(id),
        TableId::MethodSemantics => boxed::<MethodSemanticsRow>(id),
        TableId::MethodImpl => boxed::<MethodImplRow>(id),
        TableId::ModuleRef => boxed::<ModuleRefRow>(id),
        TableId::TypeSpec => boxed::<TypeSpecRow>(id),
        TableId::ImplMap => boxed::<ImplMapRow>(id),
        TableId::FieldRVA => boxed::<FieldRvaRow>(id),
        TableId::EncLog => boxed::<EncLogRow>(id),
        TableId::EncMap => boxed::<EncMapRow>(id),
        TableId::Assembly => boxed::<AssemblyRow>(id),
        TableId::AssemblyProcessor => boxed::<AssemblyProcessorRow>(id),
        TableId::AssemblyOS => boxed::<AssemblyOsRow>(id),
        TableId::AssemblyRef => boxed::<AssemblyRefRow>(id),
        TableId::AssemblyRefProcessor => boxed::<AssemblyRefProcessorRow>(id),
        TableId::AssemblyRefOS => boxed::<AssemblyRefOsRow>(id),
        TableId::File => boxed::<FileRow>(id),
        TableId::ExportedType => boxed::<ExportedTypeRow>(id),
        TableId::ManifestResource => boxed::<ManifestResourceRow>(id),
        TableId::NestedClass => boxed::<NestedClassRow>(id),
        TableId::GenericParam => boxed::<GenericParamRow>(id),
        TableId::MethodSpec => boxed::<MethodSpecRow>(id),
        TableId::GenericParamConstraint => boxed::<GenericParamConstraintRow>(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::TableKind;
    use strum::IntoEnumIterator;

    #[test]
    fn factory_matches_kind() {
        for id in TableId::iter() {
            let table = create_fixed_table(id);
            assert_eq!(table.kind(), TableKind::from(id));
            assert!(table.is_empty());
            assert_eq!(table.sort_key(), fixed_sort_key(id));
            assert_eq!(table.column_kinds().len(), table.column_names().len());
        }
    }

    #[test]
    fn sort_keys_point_at_references() {
        for id in TableId::iter() {
            if let Some(key) = fixed_sort_key(id) {
                let kinds = create_fixed_table(id).column_kinds();
                assert!(
                    matches!(kinds[key], ColumnKind::Table(_) | ColumnKind::Coded(_)),
                    "{:?} is keyed on a non-reference column",
                    id
                );
            }
        }
    }

    #[test]
    fn column_counts() {
        assert_eq!(create_fixed_table(TableId::Module).column_kinds().len(), 5);
        assert_eq!(create_fixed_table(TableId::TypeDef).column_kinds().len(), 6);
        assert_eq!(create_fixed_table(TableId::MethodDef).column_kinds().len(), 6);
        assert_eq!(create_fixed_table(TableId::Assembly).column_kinds().len(), 9);
        assert_eq!(create_fixed_table(TableId::AssemblyRef).column_kinds().len(), 9);
        assert_eq!(create_fixed_table(TableId::Constant).column_kinds().len(), 4);
        assert_eq!(create_fixed_table(TableId::EncMap).column_kinds().len(), 1);
    }

    #[test]
    fn flags_keep_unknown_bits() {
        let value = ColumnValue::Constant(0x8000_0001);
        let flags = TypeAttributes::from_value(value.clone()).unwrap();
        assert!(flags.contains(TypeAttributes::PUBLIC));
        assert_eq!(flags.to_value(), value);
        assert!(FieldAttributes::from_value(ColumnValue::Constant(0x1_0000)).is_err());
    }
}
