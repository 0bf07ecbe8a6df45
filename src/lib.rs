// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # dotcodec
//!
//! A reader and writer for the binary formats behind a .NET module: ECMA-335 metadata,
//! IL method bodies and the MSF 7.0 program database that carries their debug symbols.
//!
//! Every codec works on byte slices and in-memory models. Reading a blob and writing the
//! resulting model back produces a blob that reads to an equal model; with sorting disabled
//! and the original heaps retained the bytes are identical.
//!
//! ## Features
//!
//! - **Metadata** - The `BSJB` root, the `#~`/`#-` table stream with every ECMA-335 table,
//!   the `#Strings`, `#US`, `#GUID` and `#Blob` heaps, and additional user-defined tables
//! - **Signatures** - Method, field, property, local variable and type specification blobs
//! - **Method bodies** - Tiny and fat headers, small and fat exception sections
//! - **Instructions** - The complete CIL opcode set, with resolved tokens and strings
//! - **Program databases** - MSF containers, the PDB info, DBI, module, global symbol,
//!   `/names` and source streams, line numbers and managed custom debug information
//! - **Images** - Locating the CLI header, metadata and method bodies in a PE file
//!
//! ## Quick Start
//!
//! ```rust
//! use dotcodec::prelude::*;
//!
//! let mut module = Module::new();
//! module.header_mut().version = "v4.0.30319".to_string();
//!
//! let bytes = write_module_to_vec(&module, &WriteOptions::default())?;
//! let read_back = read_module(&bytes, &ReadOptions::default())?;
//! assert_eq!(read_back.header().version, "v4.0.30319");
//! # Ok::<(), dotcodec::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. Structural damage in an input is reported
//! as [`Error::Malformed`] with the location in this crate that detected it, reads past the
//! end of a buffer as [`Error::OutOfBounds`], and PDB stream problems as [`Error::Pdb`]
//! naming the stream.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Low-level byte access: little-endian helpers, the cursor [`file::parser::Parser`] and
/// the [`file::bitset::BitSet`] used by the PDB streams
pub mod file;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and functions.
///
/// # Example
///
/// ```rust
/// use dotcodec::prelude::*;
///
/// let body = MethodBody {
///     instructions: vec![Instruction::simple("ret")?],
///     ..MethodBody::default()
/// };
/// let bytes = body.write(&mut UserStrings::new(), &EncodeOptions::default())?;
/// assert_eq!(bytes, [0x06, 0x2A]);
/// # Ok::<(), dotcodec::Error>(())
/// ```
pub mod prelude;

/// CIL instructions based on ECMA-335
///
/// Decoding turns an IL byte stream into [`disassembler::Instruction`] values with resolved
/// operands, and encoding turns them back into bytes.
///
/// # Examples
///
/// ```rust
/// use dotcodec::{disassembler::decode_stream, metadata::streams::UserStrings};
///
/// let bytecode = [0x00, 0x2A]; // nop, ret
/// let instructions = decode_stream(&bytecode, &UserStrings::new())?;
/// assert_eq!(instructions[0].mnemonic(), "nop");
/// # Ok::<(), dotcodec::Error>(())
/// ```
pub mod disassembler;

/// Definitions, reading and writing of CIL metadata based on ECMA-335
///
/// The in-memory model is [`metadata::Module`]; [`metadata::read_module`] and
/// [`metadata::write_module`] convert it from and to a metadata blob.
pub mod metadata;

/// Reading and writing of MSF 7.0 program databases for managed code
///
/// See [`pdb::PdbFile`] for the model and [`pdb::PdbReader`] for stream-level access.
pub mod pdb;

/// `dotcodec` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotcodec` Error type
///
/// # Examples
///
/// ```rust
/// use dotcodec::{metadata::{read_module, ReadOptions}, Error};
///
/// match read_module(&[0u8; 4], &ReadOptions::default()) {
///     Ok(_) => unreachable!(),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;
