//! Stream headers of the metadata root.
//!
//! # Reference
//! - [ECMA-335 II.24.2.2](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::{align4, read_bytes_at, read_le_at, write_bytes_at, write_le_at},
    Result,
};

/// Names of the streams this crate understands
pub const KNOWN_STREAMS: [&str; 6] = ["#~", "#-", "#Strings", "#US", "#GUID", "#Blob"];

/// Position, size and name of one metadata stream.
///
/// The name is stored zero terminated and padded to a multiple of 4, so a header is not of
/// fixed size.
///
/// # Examples
///
/// ```rust
/// use dotcodec::metadata::streams::StreamHeader;
/// let data = [0x6C, 0, 0, 0, 0xA4, 0x45, 0, 0, b'#', b'~', 0, 0];
/// let mut offset = 0;
/// let header = StreamHeader::read(&data, &mut offset)?;
/// assert_eq!(header.name, "#~");
/// assert_eq!(offset, 12);
/// # Ok::<(), dotcodec::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the metadata root
    pub offset: u32,
    /// Size of this stream in bytes, a multiple of 4
    pub size: u32,
    /// Name of the stream, at most 32 characters including the terminator
    pub name: String,
}

impl StreamHeader {
    /// Read a header at `offset`, advancing past its padded name
    ///
    /// # Errors
    /// Returns an error on truncated data, an unterminated or unknown name
    pub fn read(data: &[u8], offset: &mut usize) -> Result<StreamHeader> {
        let stream_offset = read_le_at::<u32>(data, offset)?;
        let size = read_le_at::<u32>(data, offset)?;

        let name_start = *offset;
        let window = &data[name_start..data.len().min(name_start + 32)];
        let Some(len) = window.iter().position(|b| *b == 0) else {
            return Err(malformed_error!(
                "Stream header name at {:#x} is not terminated within 32 bytes",
                name_start
            ));
        };

        let name = String::from_utf8_lossy(&window[..len]).into_owned();
        if !KNOWN_STREAMS.contains(&name.as_str()) {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        let mut end = name_start;
        read_bytes_at(data, &mut end, align4(len + 1))?;
        *offset = end;

        Ok(StreamHeader {
            offset: stream_offset,
            size,
            name,
        })
    }

    /// Bytes this header occupies on disk
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        8 + align4(self.name.len() + 1)
    }

    /// Write the header at `offset`
    pub fn write(&self, buffer: &mut Vec<u8>, offset: &mut usize) {
        write_le_at(buffer, offset, self.offset);
        write_le_at(buffer, offset, self.size);
        let mut name = self.name.as_bytes().to_vec();
        name.resize(align4(name.len() + 1), 0);
        write_bytes_at(buffer, offset, &name);
    }
}
