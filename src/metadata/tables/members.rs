//! Events, properties, method associations, module references and interop rows.

use bitflags::bitflags;

use crate::{
    metadata::{
        tables::{ColumnKind, CodedIndexType, TableId, BLOB, STRING, U16, U32},
        token::TableIndex,
    },
    metadata_row,
};

bitflags! {
    /// `Event.EventFlags` (ECMA-335 II.23.1.4)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventAttributes: u16 {
        /// Name is special to tools
        const SPECIAL_NAME = 0x0200;
        /// Name is special to the runtime
        const RT_SPECIAL_NAME = 0x0400;
    }
}

bitflags! {
    /// `Property.Flags` (ECMA-335 II.23.1.14)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyAttributes: u16 {
        /// Name is special to tools
        const SPECIAL_NAME = 0x0200;
        /// Name is special to the runtime
        const RT_SPECIAL_NAME = 0x0400;
        /// Has a default value
        const HAS_DEFAULT = 0x1000;
    }
}

bitflags! {
    /// `MethodSemantics.Semantics` (ECMA-335 II.23.1.12)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodSemanticsAttributes: u16 {
        /// Property setter
        const SETTER = 0x0001;
        /// Property getter
        const GETTER = 0x0002;
        /// Other accessor
        const OTHER = 0x0004;
        /// Event `add` accessor
        const ADD_ON = 0x0008;
        /// Event `remove` accessor
        const REMOVE_ON = 0x0010;
        /// Event `raise` accessor
        const FIRE = 0x0020;
    }
}

bitflags! {
    /// `ImplMap.MappingFlags` (ECMA-335 II.23.1.8)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PInvokeAttributes: u16 {
        /// Use the member name as given
        const NO_MANGLE = 0x0001;
        /// Marshal strings as ANSI
        const CHAR_SET_ANSI = 0x0002;
        /// Marshal strings as UTF-16
        const CHAR_SET_UNICODE = 0x0004;
        /// Platform dependent string marshalling
        const CHAR_SET_AUTO = 0x0006;
        /// Preserve `GetLastError`
        const SUPPORTS_LAST_ERROR = 0x0040;
        /// Platform default calling convention
        const CALL_CONV_WINAPI = 0x0100;
        /// `cdecl`
        const CALL_CONV_CDECL = 0x0200;
        /// `stdcall`
        const CALL_CONV_STDCALL = 0x0300;
        /// `thiscall`
        const CALL_CONV_THISCALL = 0x0400;
        /// `fastcall`
        const CALL_CONV_FASTCALL = 0x0500;
    }
}

impl_column_flags!(
    EventAttributes => u16,
    PropertyAttributes => u16,
    MethodSemanticsAttributes => u16,
    PInvokeAttributes => u16,
);

metadata_row! {
    /// Starts the contiguous run of events owned by a type
    pub struct EventMapRow => EventMap {
        /// Owning type
        parent: TableIndex = ColumnKind::table(TableId::TypeDef),
        /// First event of the type
        event_list: TableIndex = ColumnKind::table(TableId::Event),
    }
}

metadata_row! {
    /// Indirection into the `Event` table
    pub struct EventPtrRow => EventPtr {
        /// The event
        event: TableIndex = ColumnKind::table(TableId::Event),
    }
}

metadata_row! {
    /// An event definition
    pub struct EventRow => Event {
        /// Event flags
        flags: EventAttributes = U16,
        /// Event name
        name: String = STRING,
        /// Delegate type of the event
        event_type: Option<TableIndex> = ColumnKind::Coded(CodedIndexType::TypeDefOrRef),
    }
}

metadata_row! {
    /// Starts the contiguous run of properties owned by a type
    pub struct PropertyMapRow => PropertyMap {
        /// Owning type
        parent: TableIndex = ColumnKind::table(TableId::TypeDef),
        /// First property of the type
        property_list: TableIndex = ColumnKind::table(TableId::Property),
    }
}

metadata_row! {
    /// Indirection into the `Property` table
    pub struct PropertyPtrRow => PropertyPtr {
        /// The property
        property: TableIndex = ColumnKind::table(TableId::Property),
    }
}

metadata_row! {
    /// A property definition
    pub struct PropertyRow => Property {
        /// Property flags
        flags: PropertyAttributes = U16,
        /// Property name
        name: String = STRING,
        /// `PropertySig` blob
        signature: Vec<u8> = BLOB,
    }
}

metadata_row! {
    /// Links an accessor method to its event or property
    pub struct MethodSemanticsRow => MethodSemantics {
        /// Accessor role
        semantics: MethodSemanticsAttributes = U16,
        /// Accessor method
        method: TableIndex = ColumnKind::table(TableId::MethodDef),
        /// Event or property
        association: TableIndex = ColumnKind::Coded(CodedIndexType::HasSemantics),
    }
}

metadata_row! {
    /// An explicit override of an interface or base method
    pub struct MethodImplRow => MethodImpl {
        /// Type containing the override
        class: TableIndex = ColumnKind::table(TableId::TypeDef),
        /// Implementing method
        body: TableIndex = ColumnKind::Coded(CodedIndexType::MethodDefOrRef),
        /// Overridden method
        declaration: TableIndex = ColumnKind::Coded(CodedIndexType::MethodDefOrRef),
    }
}

metadata_row! {
    /// A reference to another module of the assembly or a native library
    pub struct ModuleRefRow => ModuleRef {
        /// Module file name
        name: String = STRING,
    }
}

metadata_row! {
    /// A type specification (generic instantiation, array, pointer, ...)
    pub struct TypeSpecRow => TypeSpec {
        /// `TypeSpec` signature blob
        signature: Vec<u8> = BLOB,
    }
}

metadata_row! {
    /// P/Invoke target of a field or method
    pub struct ImplMapRow => ImplMap {
        /// Mapping flags
        flags: PInvokeAttributes = U16,
        /// Forwarded field or method
        member_forwarded: TableIndex = ColumnKind::Coded(CodedIndexType::MemberForwarded),
        /// Name of the native export
        import_name: String = STRING,
        /// Native library
        import_scope: TableIndex = ColumnKind::table(TableId::ModuleRef),
    }
}

metadata_row! {
    /// Initial data of a static field
    pub struct FieldRvaRow => FieldRVA {
        /// RVA of the data
        rva: u32 = U32,
        /// The field
        field: TableIndex = ColumnKind::table(TableId::Field),
    }
}

metadata_row! {
    /// An edit-and-continue log entry
    pub struct EncLogRow => EncLog {
        /// Token of the changed row
        token: u32 = U32,
        /// Kind of change
        func_code: u32 = U32,
    }
}

metadata_row! {
    /// An edit-and-continue token mapping
    pub struct EncMapRow => EncMap {
        /// Mapped token
        token: u32 = U32,
    }
}
