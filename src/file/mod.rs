//! Byte-level building blocks shared by every codec.
//!
//! - [`io`] - Little-endian reads and writes at explicit offsets, strings and padding
//! - [`parser`] - A bounds-checked cursor over a byte slice
//! - [`bitset`] - The word-packed bit vector of the PDB hash tables

pub mod bitset;
pub mod io;
pub mod parser;
