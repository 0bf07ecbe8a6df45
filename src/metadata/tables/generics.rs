//! Nesting and generics rows.

use bitflags::bitflags;

use crate::{
    metadata::{
        tables::{ColumnKind, CodedIndexType, TableId, BLOB, STRING, U16},
        token::TableIndex,
    },
    metadata_row,
};

bitflags! {
    /// `GenericParam.Flags` (ECMA-335 II.23.1.7)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GenericParamAttributes: u16 {
        /// Covariant
        const COVARIANT = 0x0001;
        /// Contravariant
        const CONTRAVARIANT = 0x0002;
        /// Must be a reference type
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        /// Must be a non-nullable value type
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        /// Must have a public default constructor
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

impl_column_flags!(GenericParamAttributes => u16);

metadata_row! {
    /// Links a nested type to its enclosing type
    pub struct NestedClassRow => NestedClass {
        /// The nested type
        nested_class: TableIndex = ColumnKind::table(TableId::TypeDef),
        /// The enclosing type
        enclosing_class: TableIndex = ColumnKind::table(TableId::TypeDef),
    }
}

metadata_row! {
    /// A generic parameter of a type or method
    pub struct GenericParamRow => GenericParam {
        /// Zero-based position in the owner's parameter list
        number: u16 = U16,
        /// Variance and constraint flags
        flags: GenericParamAttributes = U16,
        /// Owning type or method
        owner: TableIndex = ColumnKind::Coded(CodedIndexType::TypeOrMethodDef),
        /// Parameter name
        name: String = STRING,
    }
}

metadata_row! {
    /// An instantiation of a generic method
    pub struct MethodSpecRow => MethodSpec {
        /// The generic method
        method: TableIndex = ColumnKind::Coded(CodedIndexType::MethodDefOrRef),
        /// `MethodSpec` signature blob with the type arguments
        instantiation: Vec<u8> = BLOB,
    }
}

metadata_row! {
    /// A constraint on a generic parameter
    pub struct GenericParamConstraintRow => GenericParamConstraint {
        /// Constrained parameter
        owner: TableIndex = ColumnKind::table(TableId::GenericParam),
        /// Required base type or interface
        constraint: TableIndex = ColumnKind::Coded(CodedIndexType::TypeDefOrRef),
    }
}
