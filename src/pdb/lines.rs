//! C13 line information of a module stream.
//!
//! A sequence of subsections, each `u32 kind, u32 size`, payload padded to four bytes. The
//! file checksum subsection lists the documents the module's lines point into; every lines
//! subsection covers one function and groups its lines into blocks per document.

use crate::{
    file::io::{align4, pad_to, read_bytes_at, read_le_at, write_bytes_at, write_le_at},
    pdb::sources::ChecksumKind,
    Result,
};

/// Subsection of line numbers
pub const DEBUG_S_LINES: u32 = 0xF2;
/// Subsection of file checksums
pub const DEBUG_S_FILECHKSMS: u32 = 0xF4;
/// Lines subsection flag announcing a column array per block
pub const CV_LINES_HAVE_COLUMNS: u16 = 0x0001;

/// Largest `line_end - line_begin` a line entry can hold
pub const MAX_LINE_DELTA: u32 = 0x7F;
const MAX_LINE: u32 = 0x00FF_FFFF;
const STATEMENT_FLAG: u32 = 0x8000_0000;

/// One sequence point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PdbLine {
    /// IL offset relative to the function start
    pub offset: u32,
    /// First line
    pub line_begin: u32,
    /// Last line
    pub line_end: u32,
    /// First column, 0 when unknown
    pub column_begin: u16,
    /// Column after the last one, 0 when unknown
    pub column_end: u16,
    /// Statement rather than expression
    pub is_statement: bool,
}

impl PdbLine {
    fn flags(&self) -> Result<u32> {
        if self.line_begin > MAX_LINE {
            return Err(malformed_error!("Line {} exceeds 24 bits", self.line_begin));
        }
        let delta = self
            .line_end
            .checked_sub(self.line_begin)
            .filter(|&delta| delta <= MAX_LINE_DELTA)
            .ok_or_else(|| {
                malformed_error!(
                    "Line span {}..{} can not be encoded",
                    self.line_begin,
                    self.line_end
                )
            })?;

        let statement = if self.is_statement { STATEMENT_FLAG } else { 0 };
        Ok(self.line_begin | delta << 24 | statement)
    }

    fn from_flags(offset: u32, flags: u32) -> Self {
        let line_begin = flags & MAX_LINE;
        PdbLine {
            offset,
            line_begin,
            line_end: line_begin + (flags >> 24 & MAX_LINE_DELTA),
            column_begin: 0,
            column_end: 0,
            is_statement: flags & STATEMENT_FLAG != 0,
        }
    }
}

/// The lines of one function in one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdbLines {
    /// Index into [`crate::pdb::PdbFile::sources`]
    pub file: usize,
    /// Sequence points in offset order
    pub lines: Vec<PdbLine>,
}

/// An entry of the file checksum subsection
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileChecksum {
    pub name_index: u32,
    pub kind: ChecksumKind,
    pub checksum: Vec<u8>,
}

/// A block of lines in one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LineBlock {
    /// Offset of the document's entry in the file checksum subsection
    pub checksum_offset: u32,
    pub lines: Vec<PdbLine>,
}

/// A lines subsection
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LineSection {
    pub offset: u32,
    pub segment: u16,
    pub code_size: u32,
    pub blocks: Vec<LineBlock>,
}

impl LineSection {
    fn has_columns(&self) -> bool {
        self.blocks
            .iter()
            .flat_map(|block| &block.lines)
            .any(|line| line.column_begin != 0 || line.column_end != 0)
    }

    fn read(data: &[u8], stream: &str) -> Result<Self> {
        let mut offset = 0;
        let start = read_le_at::<u32>(data, &mut offset)?;
        let segment = read_le_at::<u16>(data, &mut offset)?;
        let flags = read_le_at::<u16>(data, &mut offset)?;
        let code_size = read_le_at::<u32>(data, &mut offset)?;
        let columns = flags & CV_LINES_HAVE_COLUMNS != 0;

        let mut blocks = Vec::new();
        while offset < data.len() {
            let block_start = offset;
            let checksum_offset = read_le_at::<u32>(data, &mut offset)?;
            let count = read_le_at::<u32>(data, &mut offset)? as usize;
            let block_size = read_le_at::<u32>(data, &mut offset)? as usize;

            let entry_size = if columns { 12 } else { 8 };
            if block_size != 12 + count.saturating_mul(entry_size) {
                return Err(pdb_error!(
                    stream,
                    "line block of {} entries declares {} bytes",
                    count,
                    block_size
                ));
            }
            if block_start + block_size > data.len() {
                return Err(pdb_error!(stream, "line block runs past its subsection"));
            }

            let mut lines = Vec::with_capacity(count);
            for _ in 0..count {
                let line_offset = read_le_at::<u32>(data, &mut offset)?;
                let line_flags = read_le_at::<u32>(data, &mut offset)?;
                lines.push(PdbLine::from_flags(line_offset, line_flags));
            }
            if columns {
                for line in &mut lines {
                    line.column_begin = read_le_at::<u16>(data, &mut offset)?;
                    line.column_end = read_le_at::<u16>(data, &mut offset)?;
                }
            }
            blocks.push(LineBlock {
                checksum_offset,
                lines,
            });
        }

        Ok(LineSection {
            offset: start,
            segment,
            code_size,
            blocks,
        })
    }

    fn write(&self, data: &mut Vec<u8>, offset: &mut usize) -> Result<()> {
        let columns = self.has_columns();
        write_le_at(data, offset, self.offset);
        write_le_at(data, offset, self.segment);
        write_le_at(data, offset, if columns { CV_LINES_HAVE_COLUMNS } else { 0 });
        write_le_at(data, offset, self.code_size);

        for block in &self.blocks {
            let entry_size = if columns { 12 } else { 8 };
            write_le_at(data, offset, block.checksum_offset);
            write_le_at(data, offset, block.lines.len() as u32);
            write_le_at(data, offset, (12 + entry_size * block.lines.len()) as u32);
            for line in &block.lines {
                write_le_at(data, offset, line.offset);
                write_le_at(data, offset, line.flags()?);
            }
            if columns {
                for line in &block.lines {
                    write_le_at(data, offset, line.column_begin);
                    write_le_at(data, offset, line.column_end);
                }
            }
        }
        Ok(())
    }
}

/// All C13 subsections of a module this crate reads and writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct C13Lines {
    /// Entries with their offset in the checksum subsection
    pub checksums: Vec<(u32, FileChecksum)>,
    pub sections: Vec<LineSection>,
}

fn checksum_entry_size(entry: &FileChecksum) -> usize {
    align4(6 + entry.checksum.len())
}

impl C13Lines {
    /// Offset of the checksum entry for `entry`'s document, adding it on first use
    pub fn add_checksum(&mut self, entry: FileChecksum) -> u32 {
        if let Some((offset, _)) = self
            .checksums
            .iter()
            .find(|(_, existing)| existing.name_index == entry.name_index)
        {
            return *offset;
        }

        let offset = self
            .checksums
            .last()
            .map_or(0, |(offset, last)| *offset + checksum_entry_size(last) as u32);
        self.checksums.push((offset, entry));
        offset
    }

    /// The checksum entry at `offset`
    pub fn checksum_at(&self, offset: u32) -> Option<&FileChecksum> {
        self.checksums
            .iter()
            .find(|(at, _)| *at == offset)
            .map(|(_, entry)| entry)
    }

    /// Parse the subsections of the module named `stream`
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] for subsections that exceed the data, and in `strict`
    /// mode for subsections of other kinds
    pub fn read(data: &[u8], stream: &str, strict: bool) -> Result<Self> {
        let mut lines = C13Lines::default();
        let mut offset = 0;

        while offset + 8 <= data.len() {
            let kind = read_le_at::<u32>(data, &mut offset)?;
            let size = read_le_at::<u32>(data, &mut offset)? as usize;
            let payload = read_bytes_at(data, &mut offset, size).map_err(|_| {
                pdb_error!(stream, "C13 subsection {:#x} of {} bytes is truncated", kind, size)
            })?;
            offset = align4(offset).min(data.len());

            match kind {
                DEBUG_S_FILECHKSMS => lines.read_checksums(payload)?,
                DEBUG_S_LINES => lines.sections.push(LineSection::read(payload, stream)?),
                _ if strict => {
                    return Err(pdb_error!(stream, "unsupported C13 subsection {:#x}", kind))
                }
                _ => log::debug!("skipping C13 subsection {:#x} of {} bytes", kind, size),
            }
        }

        Ok(lines)
    }

    fn read_checksums(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let start = offset as u32;
            let name_index = read_le_at::<u32>(data, &mut offset)?;
            let length = read_le_at::<u8>(data, &mut offset)?;
            let kind = ChecksumKind::from_code(read_le_at::<u8>(data, &mut offset)?)?;
            let checksum = read_bytes_at(data, &mut offset, usize::from(length))?.to_vec();
            offset = align4(offset);

            self.checksums.push((
                start,
                FileChecksum {
                    name_index,
                    kind,
                    checksum,
                },
            ));
        }
        Ok(())
    }

    /// Serialize the checksum subsection followed by every lines subsection
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for line numbers that do not fit a line entry
    pub fn write(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut offset = 0;

        if !self.checksums.is_empty() {
            let mut payload = Vec::new();
            let mut payload_offset = 0;
            for (_, entry) in &self.checksums {
                let length = u8::try_from(entry.checksum.len())
                    .map_err(|_| malformed_error!("Checksum of {} bytes", entry.checksum.len()))?;
                write_le_at(&mut payload, &mut payload_offset, entry.name_index);
                write_le_at(&mut payload, &mut payload_offset, length);
                write_le_at(&mut payload, &mut payload_offset, entry.kind.code());
                write_bytes_at(&mut payload, &mut payload_offset, &entry.checksum);
                pad_to(&mut payload, &mut payload_offset, 4);
            }
            Self::write_subsection(&mut data, &mut offset, DEBUG_S_FILECHKSMS, &payload);
        }

        for section in &self.sections {
            let mut payload = Vec::new();
            section.write(&mut payload, &mut 0)?;
            Self::write_subsection(&mut data, &mut offset, DEBUG_S_LINES, &payload);
        }

        Ok(data)
    }

    fn write_subsection(data: &mut Vec<u8>, offset: &mut usize, kind: u32, payload: &[u8]) {
        write_le_at(data, offset, kind);
        write_le_at(data, offset, payload.len() as u32);
        write_bytes_at(data, offset, payload);
        pad_to(data, offset, 4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(offset: u32, begin: u32, end: u32) -> PdbLine {
        PdbLine {
            offset,
            line_begin: begin,
            line_end: end,
            is_statement: true,
            ..PdbLine::default()
        }
    }

    #[test]
    fn line_flags() {
        assert_eq!(line(0, 12, 14).flags().unwrap(), 0x8200_000C);
        assert_eq!(PdbLine::from_flags(4, 0x8200_000C), line(4, 12, 14));

        let hidden = PdbLine {
            line_begin: 0xFE_EFEE,
            line_end: 0xFE_EFEE,
            ..PdbLine::default()
        };
        assert_eq!(hidden.flags().unwrap(), 0x00FE_EFEE);

        assert!(line(0, 1, 0x81).flags().is_err());
        assert!(line(0, 5, 4).flags().is_err());
        assert!(line(0, 0x100_0000, 0x100_0000).flags().is_err());
    }

    #[test]
    fn round_trip_with_columns() {
        let mut c13 = C13Lines::default();
        let first = c13.add_checksum(FileChecksum {
            name_index: 1,
            kind: ChecksumKind::Sha1,
            checksum: vec![0x11; 20],
        });
        let second = c13.add_checksum(FileChecksum {
            name_index: 9,
            kind: ChecksumKind::None,
            checksum: Vec::new(),
        });
        assert_eq!((first, second), (0, 28));
        assert_eq!(c13.add_checksum(FileChecksum {
            name_index: 1,
            kind: ChecksumKind::Sha1,
            checksum: vec![0x11; 20],
        }), 0);

        let mut with_columns = line(6, 3, 3);
        with_columns.column_begin = 9;
        with_columns.column_end = 30;
        c13.sections.push(LineSection {
            offset: 0x50,
            segment: 1,
            code_size: 0x20,
            blocks: vec![
                LineBlock {
                    checksum_offset: first,
                    lines: vec![line(0, 1, 1), with_columns],
                },
                LineBlock {
                    checksum_offset: second,
                    lines: vec![line(0x10, 40, 41)],
                },
            ],
        });
        c13.sections.push(LineSection {
            offset: 0x70,
            segment: 1,
            code_size: 2,
            blocks: vec![LineBlock {
                checksum_offset: second,
                lines: vec![line(0, 50, 50)],
            }],
        });

        let data = c13.write().unwrap();
        assert_eq!(&data[..4], &DEBUG_S_FILECHKSMS.to_le_bytes());
        assert_eq!(&data[4..8], &36u32.to_le_bytes());
        assert_eq!(&data[44..48], &DEBUG_S_LINES.to_le_bytes());
        // flags of the first lines subsection announce columns
        assert_eq!(&data[58..60], &CV_LINES_HAVE_COLUMNS.to_le_bytes());

        let read = C13Lines::read(&data, "Sample", true).unwrap();
        assert_eq!(read, c13);
        assert_eq!(read.checksum_at(28).map(|entry| entry.name_index), Some(9));
        assert_eq!(read.checksum_at(4), None);
    }

    #[test]
    fn unknown_subsections() {
        let mut data = vec![0xF5, 0, 0, 0, 2, 0, 0, 0, 0xAA, 0xBB, 0, 0];
        data.extend(C13Lines::default().write().unwrap());
        assert!(matches!(
            C13Lines::read(&data, "Sample", true),
            Err(crate::Error::Pdb { .. })
        ));
        assert_eq!(C13Lines::read(&data, "Sample", false).unwrap(), C13Lines::default());
    }

    #[test]
    fn bad_blocks() {
        // block declaring 64 bytes for one line
        let mut payload = vec![0; 12];
        payload.extend([0, 0, 0, 0, 1, 0, 0, 0, 64, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]);
        let mut data = Vec::new();
        C13Lines::write_subsection(&mut data, &mut 0, DEBUG_S_LINES, &payload);
        assert!(C13Lines::read(&data, "Sample", false).is_err());

        let too_wide = FileChecksum {
            name_index: 1,
            kind: ChecksumKind::Sha256,
            checksum: vec![0; 300],
        };
        let mut c13 = C13Lines::default();
        c13.add_checksum(too_wide);
        assert!(c13.write().is_err());
    }
}
