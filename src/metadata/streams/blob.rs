//! Blob Heap (`#Blob`)
//!
//! Signatures, custom attribute values, public keys and other binary data, each entry
//! prefixed by its ECMA compressed length. Offset `0` always holds the empty blob.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::collections::HashMap;

use crate::{
    file::{
        io::{align4, write_compressed_uint_at},
        parser::Parser,
    },
    Error::OutOfBounds,
    Result,
};

/// Read view over a `#Blob` heap
///
/// # Examples
///
/// ```rust
/// use dotcodec::metadata::streams::Blob;
/// let data = &[0u8, 0x03, 0x41, 0x42, 0x43];
/// let blob = Blob::from(data)?;
/// assert_eq!(blob.get(1)?, &[0x41, 0x42, 0x43]);
/// # Ok::<(), dotcodec::Error>(())
/// ```
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Create a `Blob` view over `data`; an empty slice is a heap with only the empty blob
    ///
    /// # Errors
    /// Returns an error if the heap does not start with the empty blob
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if !data.is_empty() && data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// The blob at offset `index`
    ///
    /// # Errors
    /// Returns an error if the index or the encoded length runs past the heap
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index == 0 {
            return Ok(&[]);
        }
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        let data_start = index + parser.pos();
        let Some(data_end) = data_start.checked_add(len) else {
            return Err(OutOfBounds);
        };
        if data_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[data_start..data_end])
    }
}

/// Builds a `#Blob` heap, storing every distinct blob once
#[derive(Debug)]
pub struct BlobBuilder {
    data: Vec<u8>,
    offsets: HashMap<Vec<u8>, u32>,
}

impl Default for BlobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobBuilder {
    /// A heap holding only the empty blob
    #[must_use]
    pub fn new() -> Self {
        BlobBuilder {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }

    /// Offset of `value`, appending it if it is not stored yet
    ///
    /// # Errors
    /// Returns an error if `value` is too long for a compressed length prefix
    pub fn intern(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(offset) = self.offsets.get(value) {
            return Ok(*offset);
        }

        let offset = u32::try_from(self.data.len())
            .map_err(|_| malformed_error!("#Blob heap exceeds 4GB"))?;
        let length = u32::try_from(value.len())
            .map_err(|_| malformed_error!("Blob of {} bytes is too large", value.len()))?;

        let mut position = self.data.len();
        write_compressed_uint_at(&mut self.data, &mut position, length)?;
        self.data.extend_from_slice(value);
        self.offsets.insert(value.to_vec(), offset);
        Ok(offset)
    }

    /// Unpadded size of the heap
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if only the empty blob is stored
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
        let data = [0u8, 0x03, 0x41, 0x42, 0x43, 0x01, 0xFF];
        let blob = Blob::from(&data).unwrap();
        assert_eq!(blob.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(blob.get(1).unwrap(), &[0x41, 0x42, 0x43]);
        assert_eq!(blob.get(5).unwrap(), &[0xFF]);
        assert!(blob.get(7).is_err());
    }

    #[test]
    fn truncated() {
        let data = [0u8, 0x05, 0x41];
        let blob = Blob::from(&data).unwrap();
        assert!(matches!(blob.get(1), Err(crate::Error::OutOfBounds)));
    }

    #[test]
    fn builder_long_prefix() {
        let mut builder = BlobBuilder::new();
        let small = builder.intern(&[1, 2]).unwrap();
        let large = builder.intern(&[7u8; 200]).unwrap();
        assert_eq!(small, 1);
        assert_eq!(large, 4);
        assert_eq!(builder.intern(&[1, 2]).unwrap(), small);

        let bytes = builder.into_bytes();
        let view = Blob::from(&bytes).unwrap();
        assert_eq!(view.get(large as usize).unwrap().len(), 200);
        assert_eq!(&bytes[4..6], &[0x80, 200]);
    }
}
