//! Rows describing the module, its types and their members.

use bitflags::bitflags;
use uguid::Guid;

use crate::{
    metadata::{
        tables::{ColumnKind, CodedIndexType, TableId, BLOB, GUID, STRING, U16, U32},
        token::TableIndex,
    },
    metadata_row,
};

bitflags! {
    /// `TypeDef.Flags` and `ExportedType.Flags` (ECMA-335 II.23.1.15)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeAttributes: u32 {
        /// Visible outside the assembly
        const PUBLIC = 0x0000_0001;
        /// Nested, visible wherever the enclosing type is
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested, private to the enclosing type
        const NESTED_PRIVATE = 0x0000_0003;
        /// Mask of the visibility bits
        const VISIBILITY_MASK = 0x0000_0007;
        /// Fields are laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Field offsets are given explicitly
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type is abstract
        const ABSTRACT = 0x0000_0080;
        /// Type can not be derived from
        const SEALED = 0x0000_0100;
        /// Name is special to tools
        const SPECIAL_NAME = 0x0000_0400;
        /// Imported from a COM type library
        const IMPORT = 0x0000_1000;
        /// Type is serializable
        const SERIALIZABLE = 0x0000_2000;
        /// Strings are marshalled as UTF-16
        const UNICODE_CLASS = 0x0001_0000;
        /// String marshalling is platform dependent
        const AUTO_CLASS = 0x0002_0000;
        /// Static initializer may run before first static field access
        const BEFORE_FIELD_INIT = 0x0010_0000;
        /// Name is special to the runtime
        const RT_SPECIAL_NAME = 0x0000_0800;
        /// Type has security declarations
        const HAS_SECURITY = 0x0004_0000;
        /// `ExportedType` forwards to another assembly
        const IS_TYPE_FORWARDER = 0x0020_0000;
    }
}

bitflags! {
    /// `Field.Flags` (ECMA-335 II.23.1.5)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types within the assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible within the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible by sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types and within the assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Mask of the access bits
        const ACCESS_MASK = 0x0007;
        /// Static field
        const STATIC = 0x0010;
        /// Only assignable during initialization
        const INIT_ONLY = 0x0020;
        /// Compile time constant
        const LITERAL = 0x0040;
        /// Not serialized
        const NOT_SERIALIZED = 0x0080;
        /// Has an RVA
        const HAS_FIELD_RVA = 0x0100;
        /// Name is special to tools
        const SPECIAL_NAME = 0x0200;
        /// Name is special to the runtime
        const RT_SPECIAL_NAME = 0x0400;
        /// Has marshalling information
        const HAS_FIELD_MARSHAL = 0x1000;
        /// Implemented through P/Invoke
        const PINVOKE_IMPL = 0x2000;
        /// Has a default value
        const HAS_DEFAULT = 0x8000;
    }
}

bitflags! {
    /// `MethodDef.Flags` (ECMA-335 II.23.1.10)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible within the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible by sub-types
        const FAMILY = 0x0004;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Mask of the access bits
        const MEMBER_ACCESS_MASK = 0x0007;
        /// Static method
        const STATIC = 0x0010;
        /// Can not be overridden
        const FINAL = 0x0020;
        /// Virtual method
        const VIRTUAL = 0x0040;
        /// Hides by name and signature
        const HIDE_BY_SIG = 0x0080;
        /// Always gets a new vtable slot
        const NEW_SLOT = 0x0100;
        /// Abstract method
        const ABSTRACT = 0x0400;
        /// Name is special to tools
        const SPECIAL_NAME = 0x0800;
        /// Implemented through P/Invoke
        const PINVOKE_IMPL = 0x2000;
        /// Name is special to the runtime
        const RT_SPECIAL_NAME = 0x1000;
        /// Has security declarations
        const HAS_SECURITY = 0x4000;
    }
}

bitflags! {
    /// `MethodDef.ImplFlags` (ECMA-335 II.23.1.11)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodImplAttributes: u16 {
        /// Native code
        const NATIVE = 0x0001;
        /// Optimized IL
        const OPTIL = 0x0002;
        /// Provided by the runtime
        const RUNTIME = 0x0003;
        /// Unmanaged code
        const UNMANAGED = 0x0004;
        /// Must not be inlined
        const NO_INLINING = 0x0008;
        /// Defined for forwarding references
        const FORWARD_REF = 0x0010;
        /// Single threaded through the body
        const SYNCHRONIZED = 0x0020;
        /// Signature is exported as declared
        const PRESERVE_SIG = 0x0080;
        /// Internal call
        const INTERNAL_CALL = 0x1000;
        /// Must not be optimized
        const NO_OPTIMIZATION = 0x0040;
        /// Should be inlined
        const AGGRESSIVE_INLINING = 0x0100;
    }
}

bitflags! {
    /// `Param.Flags` (ECMA-335 II.23.1.13)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ParamAttributes: u16 {
        /// Input parameter
        const IN = 0x0001;
        /// Output parameter
        const OUT = 0x0002;
        /// Optional parameter
        const OPTIONAL = 0x0010;
        /// Has a default value
        const HAS_DEFAULT = 0x1000;
        /// Has marshalling information
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

impl_column_flags!(
    TypeAttributes => u32,
    FieldAttributes => u16,
    MethodAttributes => u16,
    MethodImplAttributes => u16,
    ParamAttributes => u16,
);

metadata_row! {
    /// The single row of the `Module` table
    pub struct ModuleRow => Module {
        /// Reserved, always zero
        generation: u16 = U16,
        /// Module file name
        name: String = STRING,
        /// Module version id, distinguishes two builds of the same module
        mvid: Option<Guid> = GUID,
        /// Edit-and-continue id
        enc_id: Option<Guid> = GUID,
        /// Edit-and-continue base id
        enc_base_id: Option<Guid> = GUID,
    }
}

metadata_row! {
    /// A reference to a type in another scope
    pub struct TypeRefRow => TypeRef {
        /// Module, module ref, assembly ref or enclosing type ref; null for exported types
        resolution_scope: Option<TableIndex> = ColumnKind::Coded(CodedIndexType::ResolutionScope),
        /// Type name
        name: String = STRING,
        /// Namespace
        namespace: String = STRING,
    }
}

metadata_row! {
    /// A type defined in this module.
    ///
    /// `field_list` and `method_list` start this type's contiguous runs in the `Field` and
    /// `MethodDef` tables; see [`crate::metadata::Module::run_range`].
    pub struct TypeDefRow => TypeDef {
        /// Type flags
        flags: TypeAttributes = U32,
        /// Type name
        name: String = STRING,
        /// Namespace
        namespace: String = STRING,
        /// Base type, null for interfaces and `System.Object`
        extends: Option<TableIndex> = ColumnKind::Coded(CodedIndexType::TypeDefOrRef),
        /// First field of this type
        field_list: TableIndex = ColumnKind::table(TableId::Field),
        /// First method of this type
        method_list: TableIndex = ColumnKind::table(TableId::MethodDef),
    }
}

metadata_row! {
    /// Indirection into the `Field` table
    pub struct FieldPtrRow => FieldPtr {
        /// The field
        field: TableIndex = ColumnKind::table(TableId::Field),
    }
}

metadata_row! {
    /// A field definition
    pub struct FieldRow => Field {
        /// Field flags
        flags: FieldAttributes = U16,
        /// Field name
        name: String = STRING,
        /// `FieldSig` blob
        signature: Vec<u8> = BLOB,
    }
}

metadata_row! {
    /// Indirection into the `MethodDef` table
    pub struct MethodPtrRow => MethodPtr {
        /// The method
        method: TableIndex = ColumnKind::table(TableId::MethodDef),
    }
}

metadata_row! {
    /// A method definition
    pub struct MethodDefRow => MethodDef {
        /// RVA of the method body, zero for abstract and runtime methods
        rva: u32 = U32,
        /// Implementation flags
        impl_flags: MethodImplAttributes = U16,
        /// Method flags
        flags: MethodAttributes = U16,
        /// Method name
        name: String = STRING,
        /// `MethodDefSig` blob
        signature: Vec<u8> = BLOB,
        /// First parameter of this method
        param_list: TableIndex = ColumnKind::table(TableId::Param),
    }
}

metadata_row! {
    /// Indirection into the `Param` table
    pub struct ParamPtrRow => ParamPtr {
        /// The parameter
        param: TableIndex = ColumnKind::table(TableId::Param),
    }
}

metadata_row! {
    /// A parameter definition; sequence `0` describes the return value
    pub struct ParamRow => Param {
        /// Parameter flags
        flags: ParamAttributes = U16,
        /// Position in the signature
        sequence: u16 = U16,
        /// Parameter name
        name: String = STRING,
    }
}

metadata_row! {
    /// An interface implemented by a type
    pub struct InterfaceImplRow => InterfaceImpl {
        /// Implementing type
        class: TableIndex = ColumnKind::table(TableId::TypeDef),
        /// Implemented interface
        interface: TableIndex = ColumnKind::Coded(CodedIndexType::TypeDefOrRef),
    }
}

metadata_row! {
    /// A reference to a field or method of another type
    pub struct MemberRefRow => MemberRef {
        /// Declaring type, module ref or vararg method definition
        class: TableIndex = ColumnKind::Coded(CodedIndexType::MemberRefParent),
        /// Member name
        name: String = STRING,
        /// Member signature blob
        signature: Vec<u8> = BLOB,
    }
}
