//! Header and section flags of method bodies, encoder options, and the `#US` seams used
//! while decoding and encoding `ldstr` operands.

use bitflags::bitflags;

use crate::{metadata::streams::UserStrings, Result};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags in the first byte (tiny) or first 12 bits (fat) of a method header
    pub struct MethodBodyFlags: u16 {
        /// Tiny method header format
        const TINY_FORMAT = 0x2;
        /// Fat method header format
        const FAT_FORMAT = 0x3;
        /// Fat header only, data sections follow the code
        const MORE_SECTS = 0x8;
        /// Zero-initialize all locals
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags that a method body section can have
    pub struct SectionFlags: u8 {
        /// The section holds exception handling clauses
        const EHTABLE = 0x1;
        /// Reserved, shall be 0
        const OPT_ILTABLE = 0x2;
        /// Fat section: 24-bit size and 24-byte clauses
        const FAT_FORMAT = 0x40;
        /// Another section follows
        const MORE_SECTS = 0x80;
    }
}

/// Header format choice when encoding a body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderFormat {
    /// Tiny whenever the body qualifies, fat otherwise
    #[default]
    Auto,
    /// Always a 12-byte fat header
    ForceFat,
}

/// Options for [`super::MethodBody::write`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeOptions {
    /// Header format choice
    pub header: HeaderFormat,
}

/// Looks up `ldstr` literals while decoding
pub trait UserStringResolver {
    /// The string at `offset` in the `#US` heap
    ///
    /// # Errors
    /// Returns an error if `offset` does not start an entry
    fn resolve(&self, offset: u32) -> Result<String>;
}

/// Stores `ldstr` literals while encoding
pub trait UserStringEncoder {
    /// The `#US` offset of `value`, adding it if needed
    ///
    /// # Errors
    /// Returns an error if the heap cannot take the string
    fn encode(&mut self, value: &str) -> Result<u32>;
}

impl UserStringResolver for UserStrings {
    fn resolve(&self, offset: u32) -> Result<String> {
        self.get(offset as usize)
    }
}

impl UserStringEncoder for UserStrings {
    fn encode(&mut self, value: &str) -> Result<u32> {
        self.add(value)
    }
}
