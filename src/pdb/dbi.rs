//! The DBI stream (stream 3): module list, section contributions, source file lists and the
//! optional debug header naming auxiliary streams.
//!
//! ```text
//! header (64 bytes)
//! module info substream        one ModuleInfo per module
//! section contribution substream
//! section map substream
//! file info substream
//! type server map substream
//! EC substream
//! debug header                 up to 11 stream numbers
//! ```

use crate::{
    file::io::{
        pad_to, read_bytes_at, read_cstring_at, read_le_at, write_cstring_at, write_le_at,
        TextEncoding,
    },
    Result,
};

/// `NewDBIHdr` version written by current tooling (V70)
pub const DBI_VERSION: u32 = 19990903;

/// Version word that opens the section contribution substream (V60)
pub const SECTION_CONTRIBUTION_VERSION: u32 = 0xEFFE_0000 + 19970605;

/// Stream number meaning "no stream"
pub const NIL_STREAM: u16 = 0xFFFF;

/// Machine type of managed PDBs (x86)
pub const MACHINE_X86: u16 = 0x14C;

/// Bytes of the DBI header
const HEADER_SIZE: usize = 64;

/// Slots of the debug header
const DEBUG_HEADER_SLOTS: usize = 11;

/// The DBI header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbiHeader {
    /// Format version
    pub version: u32,
    /// Age of the PDB when the DBI stream was written
    pub age: u32,
    /// Global symbol index stream
    pub global_symbols: u16,
    /// Version of the tool that built the PDB
    pub build_number: u16,
    /// Public symbol index stream
    pub public_symbols: u16,
    /// Build version of that tool
    pub pdb_dll_version: u16,
    /// Symbol record stream
    pub symbol_records: u16,
    /// Rebuild number of that tool
    pub pdb_dll_rbld: u16,
    /// Flags: incremental link, stripped, C types
    pub flags: u16,
    /// Target machine
    pub machine: u16,
}

impl Default for DbiHeader {
    fn default() -> Self {
        DbiHeader {
            version: DBI_VERSION,
            age: 1,
            global_symbols: NIL_STREAM,
            build_number: 0x8E00,
            public_symbols: NIL_STREAM,
            pdb_dll_version: 0,
            symbol_records: NIL_STREAM,
            pdb_dll_rbld: 0,
            flags: 0,
            machine: MACHINE_X86,
        }
    }
}

/// One section contribution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionContribution {
    /// Section number
    pub section: u16,
    /// Offset in the section
    pub offset: u32,
    /// Bytes contributed
    pub size: u32,
    /// Section characteristics
    pub characteristics: u32,
    /// Contributing module
    pub module: u16,
    /// CRC of the data
    pub data_crc: u32,
    /// CRC of the relocations
    pub reloc_crc: u32,
}

impl SectionContribution {
    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        let section = read_le_at::<u16>(data, offset)?;
        let _pad = read_le_at::<u16>(data, offset)?;
        let start = read_le_at::<u32>(data, offset)?;
        let size = read_le_at::<u32>(data, offset)?;
        let characteristics = read_le_at::<u32>(data, offset)?;
        let module = read_le_at::<u16>(data, offset)?;
        let _pad = read_le_at::<u16>(data, offset)?;
        Ok(SectionContribution {
            section,
            offset: start,
            size,
            characteristics,
            module,
            data_crc: read_le_at::<u32>(data, offset)?,
            reloc_crc: read_le_at::<u32>(data, offset)?,
        })
    }

    fn write(&self, data: &mut Vec<u8>, offset: &mut usize) {
        write_le_at(data, offset, self.section);
        write_le_at(data, offset, 0u16);
        write_le_at(data, offset, self.offset);
        write_le_at(data, offset, self.size);
        write_le_at(data, offset, self.characteristics);
        write_le_at(data, offset, self.module);
        write_le_at(data, offset, 0u16);
        write_le_at(data, offset, self.data_crc);
        write_le_at(data, offset, self.reloc_crc);
    }
}

/// One entry of the module info substream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// First section contribution of the module
    pub section: SectionContribution,
    /// Written, EC enabled and type server index bits
    pub flags: u16,
    /// Module stream, [`NIL_STREAM`] if none
    pub stream: u16,
    /// Bytes of symbol records in the module stream, including the signature
    pub symbols_size: u32,
    /// Bytes of C11 line information
    pub c11_lines_size: u32,
    /// Bytes of C13 line information
    pub c13_lines_size: u32,
    /// Number of contributing source files
    pub source_file_count: u16,
    /// `/names` index of the primary source file
    pub source_file_name_index: u32,
    /// `/names` index of the compiler PDB path
    pub pdb_file_path_index: u32,
    /// Module name
    pub module_name: String,
    /// Object file name
    pub object_name: String,
}

impl ModuleInfo {
    /// An empty module entry
    #[must_use]
    pub fn new(module_name: impl Into<String>, object_name: impl Into<String>) -> Self {
        ModuleInfo {
            section: SectionContribution::default(),
            flags: 0,
            stream: NIL_STREAM,
            symbols_size: 0,
            c11_lines_size: 0,
            c13_lines_size: 0,
            source_file_count: 0,
            source_file_name_index: 0,
            pdb_file_path_index: 0,
            module_name: module_name.into(),
            object_name: object_name.into(),
        }
    }

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        let _opened = read_le_at::<u32>(data, offset)?;
        let section = SectionContribution::read(data, offset)?;
        let flags = read_le_at::<u16>(data, offset)?;
        let stream = read_le_at::<u16>(data, offset)?;
        let symbols_size = read_le_at::<u32>(data, offset)?;
        let c11_lines_size = read_le_at::<u32>(data, offset)?;
        let c13_lines_size = read_le_at::<u32>(data, offset)?;
        let source_file_count = read_le_at::<u16>(data, offset)?;
        let _pad = read_le_at::<u16>(data, offset)?;
        let _file_name_offsets = read_le_at::<u32>(data, offset)?;
        let source_file_name_index = read_le_at::<u32>(data, offset)?;
        let pdb_file_path_index = read_le_at::<u32>(data, offset)?;
        let module_name = read_cstring_at(data, offset, TextEncoding::Utf8)?;
        let object_name = read_cstring_at(data, offset, TextEncoding::Utf8)?;
        *offset = crate::file::io::align4(*offset);

        Ok(ModuleInfo {
            section,
            flags,
            stream,
            symbols_size,
            c11_lines_size,
            c13_lines_size,
            source_file_count,
            source_file_name_index,
            pdb_file_path_index,
            module_name,
            object_name,
        })
    }

    fn write(&self, data: &mut Vec<u8>, offset: &mut usize) -> Result<()> {
        write_le_at(data, offset, 0u32);
        self.section.write(data, offset);
        write_le_at(data, offset, self.flags);
        write_le_at(data, offset, self.stream);
        write_le_at(data, offset, self.symbols_size);
        write_le_at(data, offset, self.c11_lines_size);
        write_le_at(data, offset, self.c13_lines_size);
        write_le_at(data, offset, self.source_file_count);
        write_le_at(data, offset, 0u16);
        write_le_at(data, offset, 0u32);
        write_le_at(data, offset, self.source_file_name_index);
        write_le_at(data, offset, self.pdb_file_path_index);
        write_cstring_at(data, offset, &self.module_name, TextEncoding::Utf8)?;
        write_cstring_at(data, offset, &self.object_name, TextEncoding::Utf8)?;
        pad_to(data, offset, 4);
        Ok(())
    }
}

/// Stream numbers of the optional debug header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugHeader {
    /// FPO, exception, fixup, omap to/from source, section headers, token/RID map, xdata,
    /// pdata, new FPO and original section headers, in that order
    pub streams: [u16; DEBUG_HEADER_SLOTS],
}

impl Default for DebugHeader {
    fn default() -> Self {
        DebugHeader {
            streams: [NIL_STREAM; DEBUG_HEADER_SLOTS],
        }
    }
}

impl DebugHeader {
    /// Slot of the token/RID map stream
    pub const TOKEN_RID_MAP: usize = 6;

    /// The token/RID map stream, if present
    #[must_use]
    pub fn token_rid_map(&self) -> Option<u16> {
        Some(self.streams[Self::TOKEN_RID_MAP]).filter(|&stream| stream != NIL_STREAM)
    }

    fn read(data: &[u8]) -> Result<Self> {
        if data.len() % 2 != 0 {
            return Err(pdb_error!("DBI", "debug header of odd size {}", data.len()));
        }

        // short headers leave the remaining slots empty
        let mut header = DebugHeader::default();
        let mut offset = 0;
        for slot in header.streams.iter_mut().take(data.len() / 2) {
            *slot = read_le_at::<u16>(data, &mut offset)?;
        }
        Ok(header)
    }
}

/// The whole DBI stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbiStream {
    /// Header fields that are not substream sizes
    pub header: DbiHeader,
    /// Modules in order
    pub modules: Vec<ModuleInfo>,
    /// Section contributions
    pub section_contributions: Vec<SectionContribution>,
    /// Source file names per module
    pub source_files: Vec<Vec<String>>,
    /// Auxiliary streams
    pub debug_header: DebugHeader,
}

fn substream<'a>(data: &'a [u8], offset: &mut usize, size: u32, name: &str) -> Result<&'a [u8]> {
    read_bytes_at(data, offset, size as usize)
        .map_err(|_| pdb_error!("DBI", "{} substream of {} bytes is truncated", name, size))
}

impl DbiStream {
    /// Parse the stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] for an old header format or substreams that exceed
    /// the stream
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let signature = read_le_at::<i32>(data, &mut offset)?;
        if signature != -1 {
            return Err(pdb_error!("DBI", "unsupported pre-V41 header"));
        }

        let mut header = DbiHeader {
            version: read_le_at::<u32>(data, &mut offset)?,
            age: read_le_at::<u32>(data, &mut offset)?,
            global_symbols: read_le_at::<u16>(data, &mut offset)?,
            build_number: read_le_at::<u16>(data, &mut offset)?,
            public_symbols: read_le_at::<u16>(data, &mut offset)?,
            pdb_dll_version: read_le_at::<u16>(data, &mut offset)?,
            symbol_records: read_le_at::<u16>(data, &mut offset)?,
            pdb_dll_rbld: read_le_at::<u16>(data, &mut offset)?,
            ..DbiHeader::default()
        };
        let module_info_size = read_le_at::<u32>(data, &mut offset)?;
        let section_contribution_size = read_le_at::<u32>(data, &mut offset)?;
        let section_map_size = read_le_at::<u32>(data, &mut offset)?;
        let file_info_size = read_le_at::<u32>(data, &mut offset)?;
        let type_server_map_size = read_le_at::<u32>(data, &mut offset)?;
        let _mfc_type_server = read_le_at::<u32>(data, &mut offset)?;
        let debug_header_size = read_le_at::<u32>(data, &mut offset)?;
        let ec_info_size = read_le_at::<u32>(data, &mut offset)?;
        header.flags = read_le_at::<u16>(data, &mut offset)?;
        header.machine = read_le_at::<u16>(data, &mut offset)?;
        let _reserved = read_le_at::<u32>(data, &mut offset)?;

        let module_data = substream(data, &mut offset, module_info_size, "module info")?;
        let mut modules = Vec::new();
        let mut module_offset = 0;
        while module_offset < module_data.len() {
            modules.push(ModuleInfo::read(module_data, &mut module_offset)?);
        }

        let contribution_data =
            substream(data, &mut offset, section_contribution_size, "section contribution")?;
        let section_contributions = Self::read_contributions(contribution_data)?;

        substream(data, &mut offset, section_map_size, "section map")?;
        let file_data = substream(data, &mut offset, file_info_size, "file info")?;
        let source_files = Self::read_file_info(file_data, modules.len())?;
        substream(data, &mut offset, type_server_map_size, "type server map")?;
        substream(data, &mut offset, ec_info_size, "EC")?;
        let debug_header =
            DebugHeader::read(substream(data, &mut offset, debug_header_size, "debug header")?)?;

        log::debug!("DBI: {} modules", modules.len());
        Ok(DbiStream {
            header,
            modules,
            section_contributions,
            source_files,
            debug_header,
        })
    }

    fn read_contributions(data: &[u8]) -> Result<Vec<SectionContribution>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let mut offset = 0;
        let version = read_le_at::<u32>(data, &mut offset)?;
        if version != SECTION_CONTRIBUTION_VERSION {
            return Err(pdb_error!(
                "DBI",
                "unsupported section contribution version {:#x}",
                version
            ));
        }

        let mut contributions = Vec::with_capacity((data.len() - offset) / 28);
        while offset < data.len() {
            contributions.push(SectionContribution::read(data, &mut offset)?);
        }
        Ok(contributions)
    }

    fn read_file_info(data: &[u8], module_count: usize) -> Result<Vec<Vec<String>>> {
        if data.is_empty() {
            return Ok(vec![Vec::new(); module_count]);
        }

        let mut offset = 0;
        let modules = read_le_at::<u16>(data, &mut offset)? as usize;
        let _file_count = read_le_at::<u16>(data, &mut offset)?;
        if modules != module_count {
            return Err(pdb_error!(
                "DBI",
                "file info lists {} modules, the module list {}",
                modules,
                module_count
            ));
        }

        let mut starts = Vec::with_capacity(modules);
        for _ in 0..modules {
            starts.push(read_le_at::<u16>(data, &mut offset)? as usize);
        }
        let mut counts = Vec::with_capacity(modules);
        for _ in 0..modules {
            counts.push(read_le_at::<u16>(data, &mut offset)? as usize);
        }

        // the 16-bit total overflows in large programs, so sum the per-module counts
        let total: usize = counts.iter().sum();
        let mut name_offsets = Vec::with_capacity(total);
        for _ in 0..total {
            name_offsets.push(read_le_at::<u32>(data, &mut offset)? as usize);
        }
        let names = &data[offset..];

        let mut files = Vec::with_capacity(modules);
        for (start, count) in starts.into_iter().zip(counts) {
            let slice = name_offsets.get(start..start + count).ok_or_else(|| {
                pdb_error!("DBI", "file info range {}..{} is out of bounds", start, start + count)
            })?;
            let mut module_files = Vec::with_capacity(count);
            for &name_offset in slice {
                let mut at = name_offset;
                module_files.push(read_cstring_at(names, &mut at, TextEncoding::Utf8)?);
            }
            files.push(module_files);
        }
        Ok(files)
    }

    /// Serialize the stream, computing every substream size
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the file lists do not match the modules or
    /// exceed the 16-bit counts of the file info substream
    pub fn write(&self) -> Result<Vec<u8>> {
        let mut modules = Vec::new();
        let mut offset = 0;
        for module in &self.modules {
            module.write(&mut modules, &mut offset)?;
        }

        let mut contributions = Vec::new();
        let mut offset = 0;
        write_le_at(&mut contributions, &mut offset, SECTION_CONTRIBUTION_VERSION);
        for contribution in &self.section_contributions {
            contribution.write(&mut contributions, &mut offset);
        }

        // an empty section map: no segments
        let section_map = [0u8; 4];
        let file_info = self.write_file_info()?;

        let mut debug_header = Vec::new();
        let mut offset = 0;
        for stream in self.debug_header.streams {
            write_le_at(&mut debug_header, &mut offset, stream);
        }

        let mut data = Vec::with_capacity(
            HEADER_SIZE + modules.len() + contributions.len() + file_info.len() + debug_header.len() + 4,
        );
        let mut offset = 0;
        let header = &self.header;
        write_le_at(&mut data, &mut offset, -1i32);
        write_le_at(&mut data, &mut offset, header.version);
        write_le_at(&mut data, &mut offset, header.age);
        write_le_at(&mut data, &mut offset, header.global_symbols);
        write_le_at(&mut data, &mut offset, header.build_number);
        write_le_at(&mut data, &mut offset, header.public_symbols);
        write_le_at(&mut data, &mut offset, header.pdb_dll_version);
        write_le_at(&mut data, &mut offset, header.symbol_records);
        write_le_at(&mut data, &mut offset, header.pdb_dll_rbld);
        write_le_at(&mut data, &mut offset, modules.len() as u32);
        write_le_at(&mut data, &mut offset, contributions.len() as u32);
        write_le_at(&mut data, &mut offset, section_map.len() as u32);
        write_le_at(&mut data, &mut offset, file_info.len() as u32);
        write_le_at(&mut data, &mut offset, 0u32);
        write_le_at(&mut data, &mut offset, 0u32);
        write_le_at(&mut data, &mut offset, debug_header.len() as u32);
        write_le_at(&mut data, &mut offset, 0u32);
        write_le_at(&mut data, &mut offset, header.flags);
        write_le_at(&mut data, &mut offset, header.machine);
        write_le_at(&mut data, &mut offset, 0u32);

        for part in [&modules[..], &contributions, &section_map, &file_info, &debug_header] {
            crate::file::io::write_bytes_at(&mut data, &mut offset, part);
        }
        Ok(data)
    }

    fn write_file_info(&self) -> Result<Vec<u8>> {
        if self.source_files.len() != self.modules.len() {
            return Err(malformed_error!(
                "{} file lists for {} modules",
                self.source_files.len(),
                self.modules.len()
            ));
        }
        let too_many = |what: &str| malformed_error!("Too many {} for the DBI file info", what);
        let modules = u16::try_from(self.modules.len()).map_err(|_| too_many("modules"))?;
        let total: usize = self.source_files.iter().map(Vec::len).sum();

        let mut names = Vec::new();
        let mut name_offsets = Vec::with_capacity(total);
        let mut names_offset = 0;
        for name in self.source_files.iter().flatten() {
            name_offsets.push(names_offset as u32);
            write_cstring_at(&mut names, &mut names_offset, name, TextEncoding::Utf8)?;
        }

        let mut data = Vec::new();
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, modules);
        write_le_at(&mut data, &mut offset, total as u16);
        let mut start = 0usize;
        for files in &self.source_files {
            write_le_at(
                &mut data,
                &mut offset,
                u16::try_from(start).map_err(|_| too_many("source files"))?,
            );
            start += files.len();
        }
        for files in &self.source_files {
            write_le_at(
                &mut data,
                &mut offset,
                u16::try_from(files.len()).map_err(|_| too_many("source files"))?,
            );
        }
        for name_offset in name_offsets {
            write_le_at(&mut data, &mut offset, name_offset);
        }
        crate::file::io::write_bytes_at(&mut data, &mut offset, &names);
        pad_to(&mut data, &mut offset, 4);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DbiStream {
        let mut first = ModuleInfo::new("Program", "Program.obj");
        first.stream = 12;
        first.symbols_size = 300;
        first.c13_lines_size = 96;
        first.source_file_count = 2;
        first.section = SectionContribution {
            section: 1,
            offset: 0x2050,
            size: 0x40,
            characteristics: 0x6000_0020,
            module: 0,
            ..SectionContribution::default()
        };

        let mut debug_header = DebugHeader::default();
        debug_header.streams[DebugHeader::TOKEN_RID_MAP] = 15;

        DbiStream {
            header: DbiHeader {
                global_symbols: 10,
                public_symbols: 11,
                symbol_records: 9,
                ..DbiHeader::default()
            },
            section_contributions: vec![first.section],
            modules: vec![first, ModuleInfo::new("Empty", "")],
            source_files: vec![vec!["a.cs".into(), "b.cs".into()], Vec::new()],
            debug_header,
        }
    }

    #[test]
    fn round_trip() {
        let dbi = sample();
        let data = dbi.write().unwrap();
        assert_eq!(&data[..4], &[0xFF; 4]);
        assert_eq!(&data[4..8], &DBI_VERSION.to_le_bytes());

        let read = DbiStream::read(&data).unwrap();
        assert_eq!(read, dbi);
        assert_eq!(read.debug_header.token_rid_map(), Some(15));
    }

    #[test]
    fn module_entries_are_aligned() {
        let mut data = Vec::new();
        let mut offset = 0;
        ModuleInfo::new("ab", "c").write(&mut data, &mut offset).unwrap();
        // 64 fixed bytes, "ab\0c\0" padded to 8
        assert_eq!(data.len(), 72);
    }

    #[test]
    fn short_debug_header() {
        let header = DebugHeader::read(&[0x05, 0x00, 0xFF, 0xFF]).unwrap();
        assert_eq!(header.streams[0], 5);
        assert_eq!(header.streams[1], NIL_STREAM);
        assert_eq!(header.token_rid_map(), None);
        assert!(DebugHeader::read(&[0x05]).is_err());
    }

    #[test]
    fn truncated() {
        let data = sample().write().unwrap();
        assert!(matches!(
            DbiStream::read(&data[..100]),
            Err(crate::Error::Pdb { .. })
        ));

        let mut old = data;
        old[..4].copy_from_slice(&0u32.to_le_bytes());
        assert!(DbiStream::read(&old).is_err());
    }

    #[test]
    fn mismatched_file_lists() {
        let mut dbi = sample();
        dbi.source_files.pop();
        assert!(dbi.write().is_err());
    }
}
