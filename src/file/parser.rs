//! Cursor based parser over a borrowed byte slice.
//!
//! [`crate::file::parser::Parser`] wraps the free functions of [`crate::file::io`] with an
//! internal position, which reads more naturally for sequential formats such as IL code,
//! signature blobs and PDB symbol records. It additionally understands the ECMA-335 compressed
//! integer and `TypeDefOrRefOrSpecEncoded` forms used inside signatures.
//!
//! # Examples
//!
//! ```rust
//! use dotcodec::file::parser::Parser;
//!
//! let data = [0x07, 0xAE, 0x57, 0x01, 0x00];
//! let mut parser = Parser::new(&data);
//! assert_eq!(parser.read_compressed_uint()?, 7);
//! assert_eq!(parser.read_compressed_uint()?, 0x2E57);
//! assert_eq!(parser.read_le::<u16>()?, 1);
//! assert!(!parser.has_more_data());
//! # Ok::<(), dotcodec::Error>(())
//! ```

use crate::{
    file::io::{
        read_bytes_at, read_compressed_uint_at, read_cstring_at, read_guid_at, read_le_at,
        CilIO, TextEncoding,
    },
    metadata::{tables::TableId, token::TableIndex},
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked reader with an internal cursor.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a parser positioned at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the underlying data is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True if the cursor has not reached the end yet
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Bytes left after the cursor
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Current cursor position
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The underlying data
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Move the cursor to an absolute position
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Move the cursor forward by `step` bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if this would move past the end
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        self.seek(self.position.saturating_add(step))
    }

    /// Move the cursor to the next multiple of `alignment`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the aligned position is past the end
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        self.seek(crate::file::io::align_up(self.position, alignment))
    }

    /// Look at the next byte without consuming it
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of data
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Read a little-endian value
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at(self.data, &mut self.position)
    }

    /// Borrow the next `length` bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        read_bytes_at(self.data, &mut self.position, length)
    }

    /// Read a 16 byte GUID
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes
    pub fn read_guid(&mut self) -> Result<uguid::Guid> {
        read_guid_at(self.data, &mut self.position)
    }

    /// Read a zero terminated string
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] without terminator, or
    /// [`crate::Error::Malformed`] for invalid text
    pub fn read_cstring(&mut self, encoding: TextEncoding) -> Result<String> {
        read_cstring_at(self.data, &mut self.position, encoding)
    }

    /// Read an ECMA-335 compressed unsigned integer (II.23.2)
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data or [`crate::Error::Malformed`]
    /// for the reserved prefix
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        read_compressed_uint_at(self.data, &mut self.position)
    }

    /// Read an ECMA-335 compressed signed integer (II.23.2)
    ///
    /// The value is stored rotated left by one bit within the width selected by the encoding,
    /// with the sign in the lowest bit.
    ///
    /// # Errors
    /// Same as [`Parser::read_compressed_uint`]
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        let start = self.position;
        let raw = self.read_compressed_uint()?;
        let width_bits = match self.position - start {
            1 => 7,
            2 => 14,
            _ => 29,
        };

        let magnitude = (raw >> 1) as i32;
        if raw & 1 == 0 {
            Ok(magnitude)
        } else {
            Ok(magnitude - (1 << (width_bits - 1)))
        }
    }

    /// Read a `TypeDefOrRefOrSpecEncoded` value as used in signatures
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for the unused tag `3` or a null row
    pub fn read_compressed_token(&mut self) -> Result<TableIndex> {
        let encoded = self.read_compressed_uint()?;

        let table = match encoded & 0x3 {
            0x0 => TableId::TypeDef,
            0x1 => TableId::TypeRef,
            0x2 => TableId::TypeSpec,
            _ => {
                return Err(malformed_error!(
                    "Invalid compressed token - {:#x}",
                    encoded
                ))
            }
        };

        let row = encoded >> 2;
        if row == 0 {
            return Err(malformed_error!("Compressed token references row 0"));
        }

        TableIndex::new(table, row - 1)
    }
}
