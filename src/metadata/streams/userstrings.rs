//! User String Heap (`#US`)
//!
//! String literals loaded by `ldstr`, stored as UTF-16 with a compressed length prefix and a
//! trailing flag byte. Unlike the other heaps the `#US` heap is never referenced from table
//! columns of the fixed tables, only from IL, so a [`crate::metadata::Module`] keeps it as an
//! owned, appendable byte heap.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::{align4, read_bytes_at, read_compressed_uint_at, write_compressed_uint_at},
    Error::OutOfBounds,
    Result,
};

/// Largest offset an `ldstr` token can carry
const MAX_OFFSET: usize = 0x00FF_FFFF;

/// An owned `#US` heap
///
/// # Examples
///
/// ```rust
/// use dotcodec::metadata::streams::UserStrings;
///
/// let mut heap = UserStrings::new();
/// let offset = heap.add("Hello")?;
/// assert_eq!(offset, 1);
/// assert_eq!(heap.get(offset as usize)?, "Hello");
/// # Ok::<(), dotcodec::Error>(())
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct UserStrings {
    data: Vec<u8>,
}

impl Default for UserStrings {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UserStrings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserStrings")
            .field("size", &self.data.len())
            .finish()
    }
}

/// Terminal byte of an entry: `1` if any character needs more than 8-bit handling
fn terminal_byte(units: &[u16]) -> u8 {
    let special = units.iter().any(|unit| {
        let low = unit & 0xFF;
        *unit > 0xFF
            || (0x01..=0x08).contains(&low)
            || (0x0E..=0x1F).contains(&low)
            || low == 0x27
            || low == 0x2D
            || low == 0x7F
    });
    u8::from(special)
}

impl UserStrings {
    /// A heap holding only the empty entry
    #[must_use]
    pub fn new() -> Self {
        UserStrings { data: vec![0] }
    }

    /// Take a copy of the heap bytes `data`
    ///
    /// # Errors
    /// Returns an error if the heap does not start with the empty entry
    pub fn from(data: &[u8]) -> Result<UserStrings> {
        if data.is_empty() {
            return Ok(Self::new());
        }
        if data[0] != 0 {
            return Err(malformed_error!("#US heap does not start with a null byte"));
        }

        Ok(UserStrings {
            data: data.to_vec(),
        })
    }

    /// The string at `offset`
    ///
    /// # Errors
    /// Returns an error if the offset is out of bounds or the entry is not valid UTF-16
    pub fn get(&self, offset: usize) -> Result<String> {
        if offset >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut position = offset;
        let length = read_compressed_uint_at(&self.data, &mut position)? as usize;
        if length == 0 {
            return Ok(String::new());
        }
        if length % 2 != 1 {
            return Err(malformed_error!(
                "#US entry at {:#x} has even length {}",
                offset,
                length
            ));
        }

        let bytes = read_bytes_at(&self.data, &mut position, length - 1)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units)
            .map_err(|_| malformed_error!("Invalid UTF-16 in #US entry at {:#x}", offset))
    }

    /// Append `value` and return its offset
    ///
    /// An existing entry with the same contents is reused.
    ///
    /// # Errors
    /// Returns an error if the offset would not fit an `ldstr` token
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(offset) = self.find(value) {
            return Ok(offset);
        }

        let offset = self.data.len();
        if offset > MAX_OFFSET {
            return Err(malformed_error!(
                "#US heap is full, offset {:#x} does not fit a token",
                offset
            ));
        }

        let units: Vec<u16> = value.encode_utf16().collect();
        let length = u32::try_from(units.len() * 2 + 1)
            .map_err(|_| malformed_error!("User string of {} characters is too long", units.len()))?;

        let mut position = offset;
        write_compressed_uint_at(&mut self.data, &mut position, length)?;
        self.data
            .extend(units.iter().flat_map(|unit| unit.to_le_bytes()));
        self.data.push(terminal_byte(&units));
        Ok(offset as u32)
    }

    fn find(&self, value: &str) -> Option<u32> {
        self.iter()
            .find(|entry| matches!(entry, Ok((_, s)) if s == value))
            .and_then(|entry| entry.ok())
            .map(|(offset, _)| offset as u32)
    }

    /// Iterate over all entries as `(offset, string)`, skipping padding
    pub fn iter(&self) -> impl Iterator<Item = Result<(usize, String)>> + '_ {
        let mut position = 1;
        std::iter::from_fn(move || {
            while position < self.data.len() {
                let offset = position;
                let length = match read_compressed_uint_at(&self.data, &mut position) {
                    Ok(length) => length as usize,
                    Err(error) => {
                        position = self.data.len();
                        return Some(Err(error));
                    }
                };
                if length == 0 {
                    continue;
                }

                position += length;
                return Some(self.get(offset).map(|s| (offset, s)));
            }
            None
        })
    }

    /// Decode every entry, failing on the first malformed one
    ///
    /// # Errors
    /// Returns the first decode error
    pub fn validate(&self) -> Result<()> {
        for entry in self.iter() {
            entry?;
        }
        Ok(())
    }

    /// The raw heap bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The heap bytes, zero padded to a multiple of 4
    #[must_use]
    pub fn to_padded_bytes(&self) -> Vec<u8> {
        let mut bytes = self.data.clone();
        bytes.resize(align4(bytes.len()), 0);
        bytes
    }

    /// Size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the heap holds nothing but the empty entry
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }
}
