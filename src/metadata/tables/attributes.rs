//! Rows attaching data to other rows: constants, attributes, marshalling, security, layout.
//!
//! All keyed tables here except `StandAloneSig` are written sorted by their parent column.

use crate::{
    metadata::{
        tables::{ColumnKind, CodedIndexType, TableId, BLOB, U16, U32, U8},
        token::TableIndex,
    },
    metadata_row,
};

/// `DeclSecurity.Action` values (ECMA-335 II.22.11)
pub mod security_action {
    /// Caller must hold the permission
    pub const DEMAND: u16 = 0x0002;
    /// Grants the permission for the callee chain
    pub const ASSERT: u16 = 0x0003;
    /// Denies the permission
    pub const DENY: u16 = 0x0004;
    /// Checked at link time
    pub const LINK_DEMAND: u16 = 0x0006;
    /// Checked on derivation
    pub const INHERITANCE_DEMAND: u16 = 0x0007;
    /// Minimum permissions the assembly requires
    pub const REQUEST_MINIMUM: u16 = 0x0008;
}

metadata_row! {
    /// Compile time constant of a field, parameter or property
    pub struct ConstantRow => Constant {
        /// `ELEMENT_TYPE_*` of the value
        element_type: u8 = U8,
        /// Padding byte, always zero
        padding: u8 = U8,
        /// Owning field, parameter or property
        parent: TableIndex = ColumnKind::Coded(CodedIndexType::HasConstant),
        /// Encoded value
        value: Vec<u8> = BLOB,
    }
}

metadata_row! {
    /// A custom attribute applied to a row
    pub struct CustomAttributeRow => CustomAttribute {
        /// Row the attribute is applied to
        parent: TableIndex = ColumnKind::Coded(CodedIndexType::HasCustomAttribute),
        /// Attribute constructor
        constructor: TableIndex = ColumnKind::Coded(CodedIndexType::CustomAttributeType),
        /// Encoded constructor arguments and named arguments
        value: Vec<u8> = BLOB,
    }
}

metadata_row! {
    /// Native marshalling description of a field or parameter
    pub struct FieldMarshalRow => FieldMarshal {
        /// Field or parameter
        parent: TableIndex = ColumnKind::Coded(CodedIndexType::HasFieldMarshal),
        /// `MarshalSpec` blob
        native_type: Vec<u8> = BLOB,
    }
}

metadata_row! {
    /// A declarative security permission set
    pub struct DeclSecurityRow => DeclSecurity {
        /// One of [`security_action`]
        action: u16 = U16,
        /// Type, method or assembly
        parent: TableIndex = ColumnKind::Coded(CodedIndexType::HasDeclSecurity),
        /// Serialized permission set
        permission_set: Vec<u8> = BLOB,
    }
}

metadata_row! {
    /// Explicit size and packing of a type
    pub struct ClassLayoutRow => ClassLayout {
        /// Field alignment, a power of two up to 128
        packing_size: u16 = U16,
        /// Total size of the type
        class_size: u32 = U32,
        /// The type
        parent: TableIndex = ColumnKind::table(TableId::TypeDef),
    }
}

metadata_row! {
    /// Explicit offset of a field
    pub struct FieldLayoutRow => FieldLayout {
        /// Byte offset within the type
        offset: u32 = U32,
        /// The field
        field: TableIndex = ColumnKind::table(TableId::Field),
    }
}

metadata_row! {
    /// A signature not attached to a member, most often a method's locals
    pub struct StandAloneSigRow => StandAloneSig {
        /// Signature blob
        signature: Vec<u8> = BLOB,
    }
}
