//! Metadata streams.
//!
//! The metadata root lists up to five streams, each located by a [`StreamHeader`]:
//!
//! - **`#~`** / **`#-`** - The tables stream, optimized or unoptimized ([`TablesHeader`])
//! - **`#Strings`** - Zero terminated UTF-8 identifiers ([`Strings`], [`StringsBuilder`])
//! - **`#US`** - UTF-16 literals loaded by `ldstr` ([`UserStrings`])
//! - **`#GUID`** - 16 byte GUIDs ([`GuidHeap`], [`GuidBuilder`])
//! - **`#Blob`** - Length prefixed binary data ([`Blob`], [`BlobBuilder`])
//!
//! Readers are borrowed views over the stream bytes; builders deduplicate values while the
//! writer interns them and produce the padded stream bytes at the end.
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 24.2 - Metadata physical layout

mod blob;
mod guid;
mod streamheader;
mod strings;
mod tablesheader;
mod userstrings;

pub use blob::{Blob, BlobBuilder};
pub use guid::{GuidBuilder, GuidHeap};
pub use streamheader::{StreamHeader, KNOWN_STREAMS};
pub use strings::{Strings, StringsBuilder};
pub use tablesheader::{HeapSizes, TablesHeader, EXTENSION_BIT};
pub use userstrings::UserStrings;
