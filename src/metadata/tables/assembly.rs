//! Assembly manifest rows.

use bitflags::bitflags;

use crate::{
    metadata::{
        tables::{ColumnKind, CodedIndexType, TableId, TypeAttributes, BLOB, STRING, U16, U32},
        token::TableIndex,
    },
    metadata_row,
};

bitflags! {
    /// `Assembly.Flags` and `AssemblyRef.Flags` (ECMA-335 II.23.1.2)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AssemblyFlags: u32 {
        /// The public key column holds the full key rather than a token
        const PUBLIC_KEY = 0x0001;
        /// Can be retargeted to another implementation
        const RETARGETABLE = 0x0100;
        /// Just-in-time tracking is disabled
        const DISABLE_JIT_COMPILE_OPTIMIZER = 0x4000;
        /// Just-in-time tracking is enabled
        const ENABLE_JIT_COMPILE_TRACKING = 0x8000;
    }
}

bitflags! {
    /// `File.Flags` (ECMA-335 II.23.1.6)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileAttributes: u32 {
        /// The file holds no metadata
        const CONTAINS_NO_METADATA = 0x0001;
    }
}

bitflags! {
    /// `ManifestResource.Flags` (ECMA-335 II.23.1.9)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ManifestResourceAttributes: u32 {
        /// Exported from the assembly
        const PUBLIC = 0x0001;
        /// Private to the assembly
        const PRIVATE = 0x0002;
    }
}

impl_column_flags!(
    AssemblyFlags => u32,
    FileAttributes => u32,
    ManifestResourceAttributes => u32,
);

/// `Assembly.HashAlgId` values
pub mod hash_algorithm {
    /// No hash
    pub const NONE: u32 = 0x0000;
    /// MD5
    pub const MD5: u32 = 0x8003;
    /// SHA-1
    pub const SHA1: u32 = 0x8004;
}

metadata_row! {
    /// The assembly manifest
    pub struct AssemblyRow => Assembly {
        /// One of [`hash_algorithm`]
        hash_alg_id: u32 = U32,
        /// Major version
        major_version: u16 = U16,
        /// Minor version
        minor_version: u16 = U16,
        /// Build number
        build_number: u16 = U16,
        /// Revision number
        revision_number: u16 = U16,
        /// Assembly flags
        flags: AssemblyFlags = U32,
        /// Full public key, empty when unsigned
        public_key: Vec<u8> = BLOB,
        /// Simple name
        name: String = STRING,
        /// Culture, empty for neutral
        culture: String = STRING,
    }
}

metadata_row! {
    /// Processor the assembly targets, ignored by the runtime
    pub struct AssemblyProcessorRow => AssemblyProcessor {
        /// Processor id
        processor: u32 = U32,
    }
}

metadata_row! {
    /// Operating system the assembly targets, ignored by the runtime
    pub struct AssemblyOsRow => AssemblyOS {
        /// Platform id
        os_platform_id: u32 = U32,
        /// Major OS version
        os_major_version: u32 = U32,
        /// Minor OS version
        os_minor_version: u32 = U32,
    }
}

metadata_row! {
    /// A referenced assembly
    pub struct AssemblyRefRow => AssemblyRef {
        /// Major version
        major_version: u16 = U16,
        /// Minor version
        minor_version: u16 = U16,
        /// Build number
        build_number: u16 = U16,
        /// Revision number
        revision_number: u16 = U16,
        /// Reference flags
        flags: AssemblyFlags = U32,
        /// Public key or its 8 byte token, see [`AssemblyFlags::PUBLIC_KEY`]
        public_key_or_token: Vec<u8> = BLOB,
        /// Simple name
        name: String = STRING,
        /// Culture
        culture: String = STRING,
        /// Hash of the referenced assembly
        hash_value: Vec<u8> = BLOB,
    }
}

metadata_row! {
    /// Processor of a referenced assembly, ignored by the runtime
    pub struct AssemblyRefProcessorRow => AssemblyRefProcessor {
        /// Processor id
        processor: u32 = U32,
        /// The reference
        assembly_ref: TableIndex = ColumnKind::table(TableId::AssemblyRef),
    }
}

metadata_row! {
    /// Operating system of a referenced assembly, ignored by the runtime
    pub struct AssemblyRefOsRow => AssemblyRefOS {
        /// Platform id
        os_platform_id: u32 = U32,
        /// Major OS version
        os_major_version: u32 = U32,
        /// Minor OS version
        os_minor_version: u32 = U32,
        /// The reference
        assembly_ref: TableIndex = ColumnKind::table(TableId::AssemblyRef),
    }
}

metadata_row! {
    /// Another file of a multi-file assembly
    pub struct FileRow => File {
        /// File flags
        flags: FileAttributes = U32,
        /// File name
        name: String = STRING,
        /// Hash of the file contents
        hash_value: Vec<u8> = BLOB,
    }
}

metadata_row! {
    /// A type exported from another module or forwarded to another assembly
    pub struct ExportedTypeRow => ExportedType {
        /// Type flags
        flags: TypeAttributes = U32,
        /// `TypeDef` row hint in the implementing module
        type_def_id: u32 = U32,
        /// Type name
        name: String = STRING,
        /// Namespace
        namespace: String = STRING,
        /// File, assembly ref or enclosing exported type
        implementation: TableIndex = ColumnKind::Coded(CodedIndexType::Implementation),
    }
}

metadata_row! {
    /// A manifest resource
    pub struct ManifestResourceRow => ManifestResource {
        /// Offset into the resources section or the implementing file
        offset: u32 = U32,
        /// Resource flags
        flags: ManifestResourceAttributes = U32,
        /// Resource name
        name: String = STRING,
        /// File or assembly ref holding the data; null when embedded
        implementation: Option<TableIndex> = ColumnKind::Coded(CodedIndexType::Implementation),
    }
}
