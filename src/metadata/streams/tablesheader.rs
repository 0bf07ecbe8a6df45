//! Header of the `#~` / `#-` tables stream.
//!
//! ```text
//! u32  reserved
//! u8   major version (2)
//! u8   minor version (0)
//! u8   heap sizes
//! u8   reserved (1)
//! u64  valid     - bit n set if table n has rows
//! u64  sorted    - bit n set if table n is sorted
//! u32  rows[]    - one per valid bit, ascending
//! u32  (kind << 24 | rows)[n]  - only with valid bit 0x3F, n is the last entry of rows[]
//! u32  extra                   - only with HeapSizes::EXTRA_DATA
//! ```
//!
//! Table kinds from `0x3F` up do not fit the 64-bit `valid` vector. Valid bit `0x3F` marks
//! the extension block instead: its `rows[]` slot holds the number of entries, and each
//! entry packs a kind and its row count. A table of kind `0x3F` itself is listed there too.
//! No heap-size bit is involved, so `DELTA_ONLY` and `EXTRA_DATA` keep their runtime
//! meaning.
//!
//! # Reference
//! - [ECMA-335 II.24.2.6](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::{
    file::io::{read_le_at, write_le_at},
    metadata::token::MAX_ROW,
    Error, Result,
};

/// Valid bit that announces the extension block instead of a table
pub const EXTENSION_BIT: usize = 0x3F;

bitflags! {
    /// `HeapSizes` byte of the tables stream header
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HeapSizes: u8 {
        /// `#Strings` offsets are 4 bytes
        const LARGE_STRINGS = 0x01;
        /// `#GUID` indexes are 4 bytes
        const LARGE_GUID = 0x02;
        /// `#Blob` offsets are 4 bytes
        const LARGE_BLOB = 0x04;
        /// Set by some compilers on unoptimized metadata
        const PADDING_BIT = 0x08;
        /// Only delta tables are present (edit-and-continue), no payload
        const DELTA_ONLY = 0x20;
        /// A 4 byte extra value follows the row counts
        const EXTRA_DATA = 0x40;
        /// Deleted names are marked (edit-and-continue)
        const HAS_DELETE = 0x80;
    }
}

impl HeapSizes {
    /// Flags that carry no width or layout meaning and pass through a round trip unchanged
    pub const PRESERVED: HeapSizes = HeapSizes::PADDING_BIT
        .union(HeapSizes::DELTA_ONLY)
        .union(HeapSizes::HAS_DELETE);
}

/// Parsed header of a tables stream
#[derive(Debug, Clone, PartialEq)]
pub struct TablesHeader {
    /// Reserved, normally zero
    pub reserved: u32,
    /// Major version of the table schema, 2
    pub major_version: u8,
    /// Minor version of the table schema, 0
    pub minor_version: u8,
    /// Heap width and layout flags
    pub heap_sizes: HeapSizes,
    /// Reserved, normally one
    pub reserved2: u8,
    /// Bit vector of tables `0x00..0x3F` that have rows, plus [`EXTENSION_BIT`]
    pub valid: u64,
    /// Bit vector of tables that are sorted
    pub sorted: u64,
    /// Row count per table kind, 256 entries
    pub row_counts: Vec<u32>,
    /// Value announced by [`HeapSizes::EXTRA_DATA`]
    pub extra_data: Option<u32>,
}

impl Default for TablesHeader {
    fn default() -> Self {
        TablesHeader {
            reserved: 0,
            major_version: 2,
            minor_version: 0,
            heap_sizes: HeapSizes::empty(),
            reserved2: 1,
            valid: 0,
            sorted: 0,
            row_counts: vec![0; 256],
            extra_data: None,
        }
    }
}

impl TablesHeader {
    /// Read the header from the start of the tables stream; `offset` ends at the first row
    ///
    /// # Errors
    /// Returns an error on truncated data or row counts beyond the 24-bit index space
    pub fn read(data: &[u8], offset: &mut usize) -> Result<TablesHeader> {
        let mut header = TablesHeader {
            reserved: read_le_at(data, offset)?,
            major_version: read_le_at(data, offset)?,
            minor_version: read_le_at(data, offset)?,
            heap_sizes: HeapSizes::from_bits_retain(read_le_at(data, offset)?),
            reserved2: read_le_at(data, offset)?,
            valid: read_le_at(data, offset)?,
            sorted: read_le_at(data, offset)?,
            ..TablesHeader::default()
        };

        let mut extended = 0;
        for kind in 0..64 {
            if header.valid & (1u64 << kind) != 0 {
                let rows = read_le_at::<u32>(data, offset)?;
                if kind == EXTENSION_BIT {
                    extended = rows;
                } else {
                    header.row_counts[kind] = rows;
                }
            }
        }

        for _ in 0..extended {
            let entry = read_le_at::<u32>(data, offset)?;
            let kind = (entry >> 24) as usize;
            if kind < EXTENSION_BIT {
                return Err(malformed_error!(
                    "Extended table block names kind {:#04x}, which belongs in the valid vector",
                    kind
                ));
            }
            if header.row_counts[kind] != 0 {
                return Err(malformed_error!(
                    "Extended table block lists kind {:#04x} twice",
                    kind
                ));
            }
            header.row_counts[kind] = entry & MAX_ROW;
        }

        if header.heap_sizes.contains(HeapSizes::EXTRA_DATA) {
            header.extra_data = Some(read_le_at::<u32>(data, offset)?);
        }

        for (kind, rows) in header.row_counts.iter().enumerate() {
            if *rows > MAX_ROW {
                return Err(Error::CapacityExceeded {
                    table: kind as u8,
                    rows: *rows as usize,
                });
            }
        }

        Ok(header)
    }

    /// Set the row count of `kind`, keeping the valid vector and its extension bit consistent
    ///
    /// # Errors
    /// Returns [`crate::Error::CapacityExceeded`] above `0x00FF_FFFF` rows
    pub fn set_rows(&mut self, kind: u8, rows: usize) -> Result<()> {
        if rows > MAX_ROW as usize {
            return Err(Error::CapacityExceeded { table: kind, rows });
        }

        self.row_counts[usize::from(kind)] = rows as u32;
        if usize::from(kind) < EXTENSION_BIT {
            self.set_valid(usize::from(kind), rows > 0);
        }

        let extended = self.row_counts[EXTENSION_BIT..].iter().any(|rows| *rows > 0);
        self.set_valid(EXTENSION_BIT, extended);
        Ok(())
    }

    fn set_valid(&mut self, bit: usize, present: bool) {
        if present {
            self.valid |= 1u64 << bit;
        } else {
            self.valid &= !(1u64 << bit);
        }
    }

    /// Write the header at `offset`
    pub fn write(&self, buffer: &mut Vec<u8>, offset: &mut usize) {
        let mut heap_sizes = self.heap_sizes;
        heap_sizes.set(HeapSizes::EXTRA_DATA, self.extra_data.is_some());

        write_le_at(buffer, offset, self.reserved);
        write_le_at(buffer, offset, self.major_version);
        write_le_at(buffer, offset, self.minor_version);
        write_le_at(buffer, offset, heap_sizes.bits());
        write_le_at(buffer, offset, self.reserved2);
        write_le_at(buffer, offset, self.valid);
        write_le_at(buffer, offset, self.sorted);

        let extended: Vec<(usize, u32)> = self
            .row_counts
            .iter()
            .copied()
            .enumerate()
            .skip(EXTENSION_BIT)
            .filter(|(_, rows)| *rows > 0)
            .collect();

        for kind in 0..EXTENSION_BIT {
            if self.valid & (1u64 << kind) != 0 {
                write_le_at(buffer, offset, self.row_counts[kind]);
            }
        }
        if self.valid & (1u64 << EXTENSION_BIT) != 0 {
            write_le_at(buffer, offset, extended.len() as u32);
            for (kind, rows) in extended {
                write_le_at(buffer, offset, ((kind as u32) << 24) | rows);
            }
        }

        if let Some(extra) = self.extra_data {
            write_le_at(buffer, offset, extra);
        }
    }
}
