//! ECMA-335 metadata: the table model, its physical layout and the codecs around it.
//!
//! # Key Components
//!
//! - [`module`] - [`Module`], the in-memory model of every table of one module
//! - [`tables`] - Row types of the fixed tables and the column-schema engine
//! - [`token`] - Tokens and zero-based table indexes
//! - [`root`] / [`streams`] - The `BSJB` root, stream headers and heaps
//! - [`reader`] / [`writer`] - Metadata blob deserialization and serialization
//! - [`signatures`] - Method, field, property, locals and type specification blobs
//! - [`method`] - Method body headers, code and exception sections
//! - [`image`] - CLI header and metadata access inside a PE image
//!
//! # Examples
//!
//! ```rust
//! use dotcodec::metadata::{read_module, write_module_to_vec, Module, ReadOptions, WriteOptions};
//!
//! let module = Module::new();
//! let bytes = write_module_to_vec(&module, &WriteOptions::default())?;
//! let read_back = read_module(&bytes, &ReadOptions::default())?;
//! assert_eq!(module, read_back);
//! # Ok::<(), dotcodec::Error>(())
//! ```

/// Implementation of the CLI header of a managed image
pub mod cor20header;
/// Access to the CLI header, metadata and method bodies of a PE image
pub mod image;
/// Implementation of method bodies and exception sections
pub mod method;
/// The in-memory metadata model
pub mod module;
/// Options for reading and writing metadata
pub mod options;
/// Metadata blob deserialization
pub mod reader;
/// Implementation of the root metadata structure
pub mod root;
/// Implementation of method and type signatures
pub mod signatures;
/// Implementation of all metadata streams (tables, heaps, etc.)
pub mod streams;
/// Implementation of the .NET metadata tables
pub mod tables;
/// Commonly used metadata token type
pub mod token;
/// Metadata blob serialization
pub mod writer;

pub use module::{MetadataHeader, Module};
pub use options::{ReadOptions, WriteOptions};
pub use reader::read_module;
pub use writer::{write_module, write_module_to_vec};
