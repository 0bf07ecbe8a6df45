//! Metadata root header and stream directory.
//!
//! The root is the entry point of the metadata blob: a `BSJB` signature, the runtime version
//! string and the headers of every stream that follows.
//!
//! # Example
//!
//! ```rust
//! use dotcodec::metadata::root::Root;
//! let root = Root::read(&[
//!            0x42, 0x53, 0x4A, 0x42,
//!            0x01, 0x00,
//!            0x01, 0x00,
//!            0x00, 0x00, 0x00, 0x00,
//!            0x04, 0x00, 0x00, 0x00,
//!            b'v', b'4', b'.', 0x00,
//!            0x00, 0x00,
//!            0x01, 0x00,
//!            0x24, 0x00, 0x00, 0x00,
//!            0x04, 0x00, 0x00, 0x00,
//!            0x23, 0x7E, 0x00, 0x00,
//!            0x00, 0x00, 0x00, 0x00,
//!        ])?;
//! assert_eq!(root.version, "v4.");
//! assert_eq!(root.stream_headers[0].name, "#~");
//! # Ok::<(), dotcodec::Error>(())
//! ```
//!
//! # References
//!
//! - [ECMA-335 II.24.2.1: Metadata root](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::{align4, read_bytes_at, read_le_at, write_bytes_at, write_le_at},
    metadata::streams::StreamHeader,
    Error::OutOfBounds,
    Result,
};

/// Magic signature of the metadata root, `BSJB`
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Longest version string the root may carry, including padding
const MAX_VERSION_LENGTH: u32 = 255;

/// The metadata root
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Root {
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Reserved, 0
    pub reserved: u32,
    /// Runtime version string, e.g. `v4.0.30319`
    pub version: String,
    /// Reserved, 0
    pub flags: u16,
    /// Headers of the streams that follow
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parse the root at the start of `data`
    ///
    /// Every stream must lie within `data`, and no stream name may appear twice.
    ///
    /// # Errors
    /// Returns an error for a bad signature, truncated data or inconsistent stream headers
    pub fn read(data: &[u8]) -> Result<Root> {
        let mut offset = 0;
        let signature = read_le_at::<u32>(data, &mut offset)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {:#010x}",
                signature
            ));
        }

        let major_version = read_le_at::<u16>(data, &mut offset)?;
        let minor_version = read_le_at::<u16>(data, &mut offset)?;
        let reserved = read_le_at::<u32>(data, &mut offset)?;

        let version_length = read_le_at::<u32>(data, &mut offset)?;
        if version_length > MAX_VERSION_LENGTH {
            return Err(malformed_error!(
                "Version string length {} exceeds {}",
                version_length,
                MAX_VERSION_LENGTH
            ));
        }
        let version_bytes = read_bytes_at(data, &mut offset, version_length as usize)?;
        let end = version_bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(version_bytes.len());
        let version = String::from_utf8_lossy(&version_bytes[..end]).into_owned();

        let flags = read_le_at::<u16>(data, &mut offset)?;
        let stream_count = read_le_at::<u16>(data, &mut offset)?;
        if stream_count == 0 {
            return Err(malformed_error!("Metadata root lists no streams"));
        }

        let mut stream_headers: Vec<StreamHeader> = Vec::with_capacity(usize::from(stream_count));
        for _ in 0..stream_count {
            let header = StreamHeader::read(data, &mut offset)?;
            match header.offset.checked_add(header.size) {
                Some(end) if end as usize <= data.len() => {}
                Some(_) => return Err(OutOfBounds),
                None => {
                    return Err(malformed_error!(
                        "Stream offset and size cause integer overflow - {} + {}",
                        header.offset,
                        header.size
                    ))
                }
            }
            if stream_headers.iter().any(|h| h.name == header.name) {
                return Err(malformed_error!("Duplicate stream - {}", header.name));
            }

            stream_headers.push(header);
        }

        Ok(Root {
            major_version,
            minor_version,
            reserved,
            version,
            flags,
            stream_headers,
        })
    }

    /// Find a stream header by name
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|h| h.name == name)
    }

    /// Bytes the root occupies on disk, stream headers included
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        20 + align4(self.version.len() + 1)
            + self
                .stream_headers
                .iter()
                .map(StreamHeader::encoded_size)
                .sum::<usize>()
    }

    /// Write the root and its stream headers at `offset`
    ///
    /// # Errors
    /// Returns an error if the version string is too long
    pub fn write(&self, buffer: &mut Vec<u8>, offset: &mut usize) -> Result<()> {
        let padded = align4(self.version.len() + 1);
        if padded > MAX_VERSION_LENGTH as usize {
            return Err(malformed_error!(
                "Version string '{}' is too long",
                self.version
            ));
        }
        let stream_count = u16::try_from(self.stream_headers.len())
            .map_err(|_| malformed_error!("Too many streams"))?;

        write_le_at(buffer, offset, CIL_HEADER_MAGIC);
        write_le_at(buffer, offset, self.major_version);
        write_le_at(buffer, offset, self.minor_version);
        write_le_at(buffer, offset, self.reserved);
        write_le_at(buffer, offset, padded as u32);

        let mut version = self.version.as_bytes().to_vec();
        version.resize(padded, 0);
        write_bytes_at(buffer, offset, &version);

        write_le_at(buffer, offset, self.flags);
        write_le_at(buffer, offset, stream_count);
        for header in &self.stream_headers {
            header.write(buffer, offset);
        }

        Ok(())
    }
}
