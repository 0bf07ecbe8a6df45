//! # dotcodec Prelude
//!
//! The types and functions most code needs, for a single glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotcodec operations
pub use crate::Error;

/// The result type used throughout dotcodec
pub use crate::Result;

/// Bounds-checked cursor over a byte slice
pub use crate::file::parser::Parser;

// ================================================================================================
// Metadata
// ================================================================================================

/// The metadata model and its codecs
pub use crate::metadata::{
    read_module, write_module, write_module_to_vec, MetadataHeader, Module, ReadOptions,
    WriteOptions,
};

/// Tokens and zero-based table indexes
pub use crate::metadata::token::{TableIndex, TableKind, Token};

/// The table schema engine
pub use crate::metadata::tables::{
    CodedIndexType, Column, ColumnKind, ColumnValue, FixedRow, MetadataTable, Row, Table, TableId,
    TableRegistration,
};

/// Heaps
pub use crate::metadata::streams::{Blob, GuidHeap, Strings, UserStrings};

/// Access to managed PE images
pub use crate::metadata::image::{CliImage, ImageComparer};

// ================================================================================================
// Method Bodies and Instructions
// ================================================================================================

/// Method bodies and exception clauses
pub use crate::metadata::method::{
    EncodeOptions, ExceptionClause, ExceptionClauseKind, HeaderFormat, MethodBody,
};

/// CIL instructions
pub use crate::disassembler::{
    decode_stream, encode_stream, FlowType, Instruction, Operand, OperandType,
};

// ================================================================================================
// Program Databases
// ================================================================================================

/// The PDB model and its reader
pub use crate::pdb::{
    PdbFile, PdbFunction, PdbLine, PdbLines, PdbModule, PdbReadOptions, PdbReader, PdbScope,
    PdbSlot, PdbSource,
};
