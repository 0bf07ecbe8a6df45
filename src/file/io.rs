//! Little-endian primitive reading and writing for metadata, IL and PDB data.
//!
//! Every codec in this crate reads through the functions in this module with an explicit
//! cursor (`&mut usize`) that is advanced past the bytes consumed. Reads are bounds-checked
//! and fail with [`crate::Error::OutOfBounds`]; writes go into a `Vec<u8>` that grows
//! transparently when the cursor moves past its current length.
//!
//! # Key Components
//!
//! - [`crate::file::io::CilIO`] - Conversion between primitive types and their byte arrays
//! - [`crate::file::io::read_le_at`] / [`crate::file::io::write_le_at`] - Cursor based access
//! - [`crate::file::io::read_le_at_dyn`] / [`crate::file::io::write_le_at_dyn`] - 2 or 4 byte
//!   indexes, as used by the metadata tables
//! - [`crate::file::io::read_guid_at`] / [`crate::file::io::write_guid_at`] - 16 byte GUIDs
//! - [`crate::file::io::read_cstring_at`] / [`crate::file::io::write_cstring_at`] - zero
//!   terminated strings in a [`crate::file::io::TextEncoding`]
//! - [`crate::file::io::align_up`] - cursor alignment
//!
//! # Examples
//!
//! ```rust
//! use dotcodec::file::io::{read_le_at, write_le_at};
//!
//! let mut buffer = Vec::new();
//! let mut offset = 0;
//! write_le_at(&mut buffer, &mut offset, 0x1234_u16);
//! write_le_at(&mut buffer, &mut offset, 0xDEAD_BEEF_u32);
//! assert_eq!(buffer.len(), 6);
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u16>(&buffer, &mut offset)?, 0x1234);
//! assert_eq!(read_le_at::<u32>(&buffer, &mut offset)?, 0xDEAD_BEEF);
//! # Ok::<(), dotcodec::Error>(())
//! ```

use uguid::Guid;
use widestring::U16String;

use crate::{Error::OutOfBounds, Result};

/// Trait for types that can be converted from and to a fixed size little-endian byte array.
pub trait CilIO: Sized + Copy {
    /// Byte array type matching the size of `Self`
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read `Self` from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Convert `Self` into little-endian bytes
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),*) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Text encodings understood by the string helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8, used by `#Strings` and most PDB names
    Utf8,
    /// 7-bit ASCII, rejects any byte above `0x7F`
    Ascii,
    /// UTF-16 little-endian, used by `#US` and a few OEM records
    Utf16Le,
}

impl TextEncoding {
    /// Size of the string terminator in this encoding
    #[must_use]
    pub fn terminator_len(self) -> usize {
        match self {
            TextEncoding::Utf8 | TextEncoding::Ascii => 1,
            TextEncoding::Utf16Le => 2,
        }
    }

    /// Decode `bytes` (without terminator) into a `String`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the bytes are not valid in this encoding
    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|_| malformed_error!("Invalid UTF-8 string data")),
            TextEncoding::Ascii => {
                if !bytes.is_ascii() {
                    return Err(malformed_error!("Non ASCII byte in ASCII string"));
                }
                Ok(bytes.iter().map(|b| char::from(*b)).collect())
            }
            TextEncoding::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(malformed_error!(
                        "UTF-16 string has odd length {}",
                        bytes.len()
                    ));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                U16String::from_vec(units)
                    .to_string()
                    .map_err(|_| malformed_error!("Invalid UTF-16 string data"))
            }
        }
    }

    /// Encode `value` into bytes (without terminator)
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` can not be represented
    pub fn encode(self, value: &str) -> Result<Vec<u8>> {
        match self {
            TextEncoding::Utf8 => Ok(value.as_bytes().to_vec()),
            TextEncoding::Ascii => {
                if !value.is_ascii() {
                    return Err(malformed_error!("'{}' is not an ASCII string", value));
                }
                Ok(value.as_bytes().to_vec())
            }
            TextEncoding::Utf16Le => Ok(U16String::from_str(value)
                .into_vec()
                .into_iter()
                .flat_map(u16::to_le_bytes)
                .collect()),
        }
    }
}

/// Reads a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value of type `T` at `offset` and advances the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Reads either a 2-byte or 4-byte index, widened to `u32`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

/// Borrows `len` bytes at `offset` and advances the offset past them.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes
pub fn read_bytes_at<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let Some(end) = offset.checked_add(len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let slice = &data[*offset..end];
    *offset = end;
    Ok(slice)
}

/// Reads a 16 byte GUID in its on-disk (mixed endian) layout.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes
pub fn read_guid_at(data: &[u8], offset: &mut usize) -> Result<Guid> {
    let bytes = read_bytes_at(data, offset, 16)?;
    let mut raw = [0u8; 16];
    raw.copy_from_slice(bytes);
    Ok(Guid::from_bytes(raw))
}

/// Reads a zero terminated string and advances the offset past the terminator.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if no terminator is found, or
/// [`crate::Error::Malformed`] if the string is invalid in `encoding`
pub fn read_cstring_at(data: &[u8], offset: &mut usize, encoding: TextEncoding) -> Result<String> {
    if *offset > data.len() {
        return Err(OutOfBounds);
    }

    let step = encoding.terminator_len();
    let mut end = *offset;
    loop {
        if end + step > data.len() {
            return Err(OutOfBounds);
        }
        if data[end..end + step].iter().all(|b| *b == 0) {
            break;
        }
        end += step;
    }

    let value = encoding.decode(&data[*offset..end])?;
    *offset = end + step;
    Ok(value)
}

/// Reads a string prefixed with its byte length as an ECMA-335 compressed integer.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] on truncated data or [`crate::Error::Malformed`]
/// for invalid length prefixes or text
pub fn read_prefixed_string_at(
    data: &[u8],
    offset: &mut usize,
    encoding: TextEncoding,
) -> Result<String> {
    let len = read_compressed_uint_at(data, offset)? as usize;
    let bytes = read_bytes_at(data, offset, len)?;
    encoding.decode(bytes)
}

/// Reads an ECMA-335 compressed unsigned integer (1, 2 or 4 bytes).
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] on truncated data or [`crate::Error::Malformed`]
/// if the leading byte uses the reserved `111xxxxx` pattern
pub fn read_compressed_uint_at(data: &[u8], offset: &mut usize) -> Result<u32> {
    let first = read_le_at::<u8>(data, offset)?;
    if first & 0x80 == 0 {
        Ok(u32::from(first))
    } else if first & 0xC0 == 0x80 {
        let second = read_le_at::<u8>(data, offset)?;
        Ok((u32::from(first & 0x3F) << 8) | u32::from(second))
    } else if first & 0xE0 == 0xC0 {
        let rest = read_bytes_at(data, offset, 3)?;
        Ok((u32::from(first & 0x1F) << 24)
            | (u32::from(rest[0]) << 16)
            | (u32::from(rest[1]) << 8)
            | u32::from(rest[2]))
    } else {
        Err(malformed_error!(
            "Invalid compressed integer prefix - {:#04x}",
            first
        ))
    }
}

fn ensure_len(buffer: &mut Vec<u8>, end: usize) {
    if buffer.len() < end {
        buffer.resize(end, 0);
    }
}

/// Writes `value` at `offset`, growing `buffer` as needed, and advances the offset.
pub fn write_le_at<T: CilIO>(buffer: &mut Vec<u8>, offset: &mut usize, value: T) {
    let bytes = value.to_le_bytes();
    write_bytes_at(buffer, offset, bytes.as_ref());
}

/// Writes a 2 or 4 byte index at `offset`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a narrow write would truncate `value`
pub fn write_le_at_dyn(
    buffer: &mut Vec<u8>,
    offset: &mut usize,
    value: u32,
    is_large: bool,
) -> Result<()> {
    if is_large {
        write_le_at(buffer, offset, value);
    } else {
        let Ok(narrow) = u16::try_from(value) else {
            return Err(malformed_error!(
                "Value {:#x} does not fit a 2 byte index",
                value
            ));
        };
        write_le_at(buffer, offset, narrow);
    }

    Ok(())
}

/// Copies `bytes` to `offset`, growing `buffer` as needed, and advances the offset.
pub fn write_bytes_at(buffer: &mut Vec<u8>, offset: &mut usize, bytes: &[u8]) {
    let end = *offset + bytes.len();
    ensure_len(buffer, end);
    buffer[*offset..end].copy_from_slice(bytes);
    *offset = end;
}

/// Writes a GUID in its on-disk layout.
pub fn write_guid_at(buffer: &mut Vec<u8>, offset: &mut usize, guid: &Guid) {
    write_bytes_at(buffer, offset, &guid.to_bytes());
}

/// Writes `value` followed by a terminator in the given encoding.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `value` can not be represented in `encoding`
pub fn write_cstring_at(
    buffer: &mut Vec<u8>,
    offset: &mut usize,
    value: &str,
    encoding: TextEncoding,
) -> Result<()> {
    let bytes = encoding.encode(value)?;
    write_bytes_at(buffer, offset, &bytes);
    let terminator = [0u8; 2];
    write_bytes_at(buffer, offset, &terminator[..encoding.terminator_len()]);
    Ok(())
}

/// Writes `value` prefixed with its byte length as a compressed integer.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `value` can not be represented or is too long
pub fn write_prefixed_string_at(
    buffer: &mut Vec<u8>,
    offset: &mut usize,
    value: &str,
    encoding: TextEncoding,
) -> Result<()> {
    let bytes = encoding.encode(value)?;
    write_compressed_uint_at(buffer, offset, bytes.len() as u32)?;
    write_bytes_at(buffer, offset, &bytes);
    Ok(())
}

/// Writes an ECMA-335 compressed unsigned integer.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for values above `0x1FFF_FFFF`
pub fn write_compressed_uint_at(buffer: &mut Vec<u8>, offset: &mut usize, value: u32) -> Result<()> {
    match value {
        0..=0x7F => write_le_at(buffer, offset, value as u8),
        0x80..=0x3FFF => {
            write_bytes_at(buffer, offset, &[0x80 | (value >> 8) as u8, value as u8]);
        }
        0x4000..=0x1FFF_FFFF => write_bytes_at(
            buffer,
            offset,
            &[
                0xC0 | (value >> 24) as u8,
                (value >> 16) as u8,
                (value >> 8) as u8,
                value as u8,
            ],
        ),
        _ => {
            return Err(malformed_error!(
                "Value {:#x} is too large for a compressed integer",
                value
            ))
        }
    }

    Ok(())
}

/// Rounds `value` up to the next multiple of `alignment` (a power of two).
#[must_use]
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Rounds `value` up to the next multiple of 4.
#[must_use]
pub fn align4(value: usize) -> usize {
    align_up(value, 4)
}

/// Pads `buffer` with zeros until `offset` is a multiple of `alignment`.
pub fn pad_to(buffer: &mut Vec<u8>, offset: &mut usize, alignment: usize) {
    let end = align_up(*offset, alignment);
    ensure_len(buffer, end);
    buffer[*offset..end].fill(0);
    *offset = end;
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_integers() {
        assert_eq!(read_le::<u8>(&TEST_BUFFER).unwrap(), 0x01);
        assert_eq!(read_le::<i16>(&TEST_BUFFER).unwrap(), 0x0201);
        assert_eq!(read_le::<u32>(&TEST_BUFFER).unwrap(), 0x0403_0201);
        assert_eq!(read_le::<u64>(&TEST_BUFFER).unwrap(), 0x0807_0605_0403_0201);
    }

    #[test]
    fn read_le_floats() {
        let mut buffer = Vec::new();
        let mut offset = 0;
        write_le_at(&mut buffer, &mut offset, 1.5_f32);
        write_le_at(&mut buffer, &mut offset, -2.25_f64);

        let mut offset = 0;
        assert_eq!(read_le_at::<f32>(&buffer, &mut offset).unwrap(), 1.5);
        assert_eq!(read_le_at::<f64>(&buffer, &mut offset).unwrap(), -2.25);
        assert_eq!(offset, 12);
    }

    #[test]
    fn read_sequential() {
        let mut offset = 2;
        assert_eq!(read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap(), 0x0403);
        assert_eq!(offset, 4);
        assert_eq!(read_le_at_dyn(&TEST_BUFFER, &mut offset, true).unwrap(), 0x0807_0605);
        assert_eq!(offset, 8);
    }

    #[test]
    fn read_errors() {
        let mut offset = 6;
        assert!(matches!(
            read_le_at::<u32>(&TEST_BUFFER, &mut offset),
            Err(OutOfBounds)
        ));
        assert_eq!(offset, 6);

        let mut offset = usize::MAX;
        assert!(read_le_at::<u8>(&TEST_BUFFER, &mut offset).is_err());
        assert!(read_bytes_at(&TEST_BUFFER, &mut 4, 5).is_err());
    }

    #[test]
    fn write_grows_buffer() {
        let mut buffer = vec![0xFF; 2];
        let mut offset = 1;
        write_le_at(&mut buffer, &mut offset, 0x1122_3344_u32);
        assert_eq!(buffer, [0xFF, 0x44, 0x33, 0x22, 0x11]);
        assert_eq!(offset, 5);
    }

    #[test]
    fn write_dyn() {
        let mut buffer = Vec::new();
        let mut offset = 0;
        write_le_at_dyn(&mut buffer, &mut offset, 0x1234, false).unwrap();
        write_le_at_dyn(&mut buffer, &mut offset, 0x1_0000, true).unwrap();
        assert_eq!(buffer, [0x34, 0x12, 0x00, 0x00, 0x01, 0x00]);

        assert!(write_le_at_dyn(&mut buffer, &mut offset, 0x1_0000, false).is_err());
    }

    #[test]
    fn compressed_uint() {
        for (value, encoded) in [
            (0x03_u32, vec![0x03]),
            (0x7F, vec![0x7F]),
            (0x80, vec![0x80, 0x80]),
            (0x2E57, vec![0xAE, 0x57]),
            (0x3FFF, vec![0xBF, 0xFF]),
            (0x4000, vec![0xC0, 0x00, 0x40, 0x00]),
            (0x1FFF_FFFF, vec![0xDF, 0xFF, 0xFF, 0xFF]),
        ] {
            let mut buffer = Vec::new();
            write_compressed_uint_at(&mut buffer, &mut 0, value).unwrap();
            assert_eq!(buffer, encoded);
            assert_eq!(read_compressed_uint_at(&encoded, &mut 0).unwrap(), value);
        }

        assert!(write_compressed_uint_at(&mut Vec::new(), &mut 0, 0x2000_0000).is_err());
        assert!(read_compressed_uint_at(&[0xE0], &mut 0).is_err());
    }

    #[test]
    fn cstrings() {
        let mut buffer = Vec::new();
        let mut offset = 0;
        write_cstring_at(&mut buffer, &mut offset, "MD2", TextEncoding::Utf16Le).unwrap();
        write_cstring_at(&mut buffer, &mut offset, "System", TextEncoding::Utf8).unwrap();
        assert_eq!(offset, 8 + 7);

        let mut offset = 0;
        assert_eq!(
            read_cstring_at(&buffer, &mut offset, TextEncoding::Utf16Le).unwrap(),
            "MD2"
        );
        assert_eq!(
            read_cstring_at(&buffer, &mut offset, TextEncoding::Ascii).unwrap(),
            "System"
        );
        assert_eq!(offset, buffer.len());

        assert!(read_cstring_at(b"abc", &mut 0, TextEncoding::Utf8).is_err());
        assert!(TextEncoding::Ascii.encode("ü").is_err());
    }

    #[test]
    fn prefixed_strings() {
        let mut buffer = Vec::new();
        let mut offset = 0;
        write_prefixed_string_at(&mut buffer, &mut offset, "Hi", TextEncoding::Utf16Le).unwrap();
        assert_eq!(buffer, [0x04, b'H', 0x00, b'i', 0x00]);
        assert_eq!(
            read_prefixed_string_at(&buffer, &mut 0, TextEncoding::Utf16Le).unwrap(),
            "Hi"
        );
    }

    #[test]
    fn guids() {
        let guid = Guid::from_bytes([
            0xC9, 0x3F, 0xEA, 0xC6, 0xB3, 0x59, 0xD6, 0x49, 0xBC, 0x25, 0x09, 0x02, 0xBB, 0xAB,
            0xB4, 0x60,
        ]);
        let mut buffer = Vec::new();
        write_guid_at(&mut buffer, &mut 0, &guid);
        assert_eq!(buffer.len(), 16);
        assert_eq!(read_guid_at(&buffer, &mut 0).unwrap(), guid);
    }

    #[test]
    fn alignment() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(8), 8);
        assert_eq!(align_up(4097, 4096), 8192);

        let mut buffer = vec![1, 2, 3];
        let mut offset = 3;
        pad_to(&mut buffer, &mut offset, 4);
        assert_eq!(buffer, [1, 2, 3, 0]);
        assert_eq!(offset, 4);
    }
}
