//! String Heap (`#Strings`)
//!
//! Identifier strings (type, member and namespace names) stored as zero terminated UTF-8.
//! Offset `0` always holds the empty string.
//!
//! # Reference
//! - [ECMA-335 II.24.2.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::{collections::HashMap, ffi::CStr};

use crate::{file::io::align4, Error::OutOfBounds, Result};

/// Read view over a `#Strings` heap
///
/// # Examples
///
/// ```rust
/// use dotcodec::metadata::streams::Strings;
/// let data = &[0u8, b'H', b'e', b'l', b'l', b'o', 0u8];
/// let strings = Strings::from(data)?;
/// assert_eq!(strings.get(1)?, "Hello");
/// assert_eq!(strings.get(3)?, "llo");
/// # Ok::<(), dotcodec::Error>(())
/// ```
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Create a `Strings` view over `data`; an empty slice is accepted as a heap holding only
    /// the empty string
    ///
    /// # Errors
    /// Returns an error if the heap does not start with the empty string
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if !data.is_empty() && data[0] != 0 {
            return Err(malformed_error!("#Strings heap does not start with a null byte"));
        }

        Ok(Strings { data })
    }

    /// The string starting at `index`. Offsets may point into the middle of another string
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds or the string is not valid UTF-8
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index == 0 {
            return Ok("");
        }
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        CStr::from_bytes_until_nul(&self.data[index..])
            .ok()
            .and_then(|s| s.to_str().ok())
            .ok_or_else(|| malformed_error!("Invalid string at index - {}", index))
    }

    /// Size of the heap in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the heap has no bytes at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Builds a `#Strings` heap, storing every distinct string once
#[derive(Debug)]
pub struct StringsBuilder {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl Default for StringsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringsBuilder {
    /// A heap holding only the empty string
    #[must_use]
    pub fn new() -> Self {
        StringsBuilder {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }

    /// Offset of `value`, appending it if it is not stored yet
    ///
    /// # Errors
    /// Returns an error if `value` contains a null character
    pub fn intern(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(offset) = self.offsets.get(value) {
            return Ok(*offset);
        }
        if value.contains('\0') {
            return Err(malformed_error!(
                "Identifier '{}' contains a null character",
                value.escape_debug()
            ));
        }

        let offset = u32::try_from(self.data.len())
            .map_err(|_| malformed_error!("#Strings heap exceeds 4GB"))?;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.offsets.insert(value.to_string(), offset);
        Ok(offset)
    }

    /// Unpadded size of the heap
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if only the empty string is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 1
    }

    /// The heap bytes, zero padded to a multiple of 4
    #[must_use]
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.resize(align4(self.data.len()), 0);
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x3c, 0x4d, 0x61, 0x69, 0x6e, 0x3e, 0x24, 0x00,
            0x3c, 0x4d, 0x6f, 0x64, 0x75, 0x6c, 0x65, 0x3e, 0x00,
            0x53, 0x79, 0x73, 0x74, 0x65, 0x6d, 0x2e, 0x43, 0x6f, 0x6e, 0x73, 0x6f, 0x6c, 0x65, 0x00,
        ];

        let view = Strings::from(&data).unwrap();
        assert_eq!(view.get(0).unwrap(), "");
        assert_eq!(view.get(1).unwrap(), "<Main>$");
        assert_eq!(view.get(9).unwrap(), "<Module>");
        assert_eq!(view.get(18).unwrap(), "System.Console");
        assert_eq!(view.get(25).unwrap(), "Console");
        assert!(view.get(data.len()).is_err());
    }

    #[test]
    fn unterminated() {
        let view = Strings::from(&[0, b'a', b'b']).unwrap();
        assert!(view.get(1).is_err());
        assert!(Strings::from(&[1, 0]).is_err());
        assert_eq!(Strings::from(&[]).unwrap().get(0).unwrap(), "");
    }

    #[test]
    fn builder_dedupes() {
        let mut builder = StringsBuilder::new();
        assert_eq!(builder.intern("").unwrap(), 0);
        assert_eq!(builder.intern("Foo").unwrap(), 1);
        assert_eq!(builder.intern("Bar").unwrap(), 5);
        assert_eq!(builder.intern("Foo").unwrap(), 1);
        assert!(builder.intern("a\0b").is_err());

        let bytes = builder.into_bytes();
        assert_eq!(bytes.len(), 12);
        let view = Strings::from(&bytes).unwrap();
        assert_eq!(view.get(5).unwrap(), "Bar");
    }
}
