//! Managed PDB files in the MSF 7.0 container.
//!
//! [`PdbFile`] is the whole debug information of an assembly: modules with their functions,
//! locals, scopes, sequence points and custom debug information, the source documents with
//! checksums and optionally embedded content, and the token remapping table. It reads from
//! and writes to the multi-stream file format that the native debugging tools understand.
//!
//! The lower layers are public for tools that need stream-level access: [`msf`] for the
//! paged container, [`info`], [`dbi`], [`names`] and [`gsi`] for the individual streams.
//!
//! # Example
//!
//! ```rust
//! use dotcodec::pdb::{PdbFile, PdbFunction, PdbModule, PdbReadOptions};
//! use uguid::guid;
//!
//! let mut pdb = PdbFile::new(guid!("01234567-89ab-cdef-0123-456789abcdef"), 1);
//! let mut module = PdbModule::new("Hello");
//! module.functions.push(PdbFunction::new(0x0600_0001, "Main", 1, 0x2050, 12));
//! pdb.modules.push(module);
//!
//! let bytes = pdb.to_vec()?;
//! assert_eq!(PdbFile::read(&bytes, &PdbReadOptions::strict())?, pdb);
//! # Ok::<(), dotcodec::Error>(())
//! ```

pub mod dbi;
pub mod gsi;
mod hash;
mod hashtable;
pub mod info;
mod lines;
mod model;
mod modi;
pub mod msf;
mod namemap;
pub mod names;
mod oem;
mod options;
mod reader;
mod sources;
mod writer;

pub use hash::{hash_v1, hash_v1_bucket};
pub use lines::{PdbLine, PdbLines, MAX_LINE_DELTA};
pub use model::{PdbFile, PdbFunction, PdbModule, PdbScope, PdbSlot};
pub use modi::{
    C13_SIGNATURE, S_BLOCK32, S_END, S_GMANPROC, S_LMANPROC, S_MANSLOT, S_OEM, S_TOKENREF,
    S_UNAMESPACE,
};
pub use namemap::NamedStreamMap;
pub use oem::{
    AsyncMethodInfo, AsyncStep, CustomDebugInfo, HoistedLocalScope, ASYNC_METHOD_INFO_NAME,
    MANAGED_OEM_GUID, MD2_NAME,
};
pub use options::PdbReadOptions;
pub use reader::PdbReader;
pub use sources::{
    ChecksumKind, PdbSource, SourceHeaderBlock, SourceHeaderEntry, DOCUMENT_TYPE_TEXT,
    LANGUAGE_CSHARP, LANGUAGE_VISUAL_BASIC, VENDOR_MICROSOFT,
};
pub use writer::PdbWriterState;
