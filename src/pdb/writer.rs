//! Writing a [`PdbFile`].
//!
//! Fixed streams come first: 0 (old directory), 1 (info), 2 (TPI), 3 (DBI) and 4 (IPI). The
//! info and DBI streams are reserved up front and filled last, once every other stream has
//! its index. Sources, module streams, global symbols, the token map and `/names` follow in
//! that order.

use std::{io::Write, path::Path};

use crate::{
    file::io::write_le_at,
    pdb::{
        dbi::{DbiHeader, DbiStream, DebugHeader, ModuleInfo, SectionContribution},
        gsi::{write_public_symbols, GlobalSymbols, TokenRef},
        info::{PdbInfo, FEATURE_VC140},
        lines::{C13Lines, FileChecksum, LineBlock, LineSection},
        model::{PdbFile, PdbModule},
        modi::write_symbols,
        msf::{MsfWriter, DEFAULT_PAGE_SIZE},
        namemap::NamedStreamMap,
        names::NamesBuilder,
        sources::{SourceHeaderBlock, SourceHeaderEntry},
    },
    Result,
};

/// Version of an empty TPI or IPI stream (V80)
const TPI_VERSION: u32 = 20040203;
const TPI_HEADER_SIZE: u32 = 56;
const FIRST_TYPE_INDEX: u32 = 0x1000;

/// Characteristics of the code section contributions
const CODE_SECTION: u32 = 0x6000_0020;

fn stream_number(index: u32) -> Result<u16> {
    u16::try_from(index).map_err(|_| malformed_error!("PDB needs more than 65535 streams"))
}

/// Header of a type stream without records
fn empty_type_stream() -> Vec<u8> {
    let mut data = Vec::with_capacity(TPI_HEADER_SIZE as usize);
    let mut offset = 0;
    write_le_at(&mut data, &mut offset, TPI_VERSION);
    write_le_at(&mut data, &mut offset, TPI_HEADER_SIZE);
    write_le_at(&mut data, &mut offset, FIRST_TYPE_INDEX);
    write_le_at(&mut data, &mut offset, FIRST_TYPE_INDEX);
    write_le_at(&mut data, &mut offset, 0u32); // record bytes
    write_le_at(&mut data, &mut offset, 0xFFFFu16); // hash stream
    write_le_at(&mut data, &mut offset, 0xFFFFu16); // auxiliary hash stream
    write_le_at(&mut data, &mut offset, 4u32); // hash key size
    write_le_at(&mut data, &mut offset, 0x3FFFFu32); // hash buckets
    for _ in 0..6 {
        write_le_at(&mut data, &mut offset, 0u32); // hash value, index and adjustment buffers
    }
    data
}

/// Everything the writer accumulates while laying out a PDB
pub struct PdbWriterState {
    msf: MsfWriter,
    names: NamesBuilder,
    named_streams: NamedStreamMap,
    /// `/names` index of every source, by source index
    source_names: Vec<u32>,
    dbi: DbiStream,
    info_stream: u32,
    dbi_stream: u32,
}

impl PdbWriterState {
    /// A state with the fixed streams laid out
    ///
    /// # Errors
    /// Only fails if the default page size were invalid
    pub fn new() -> Result<Self> {
        let mut msf = MsfWriter::new(DEFAULT_PAGE_SIZE)?;
        msf.reserve_stream();
        let info_stream = msf.reserve_stream();
        msf.add_stream(&empty_type_stream())?;
        let dbi_stream = msf.reserve_stream();
        msf.add_stream(&empty_type_stream())?;

        Ok(PdbWriterState {
            msf,
            names: NamesBuilder::new(),
            named_streams: NamedStreamMap::new(),
            source_names: Vec::new(),
            dbi: DbiStream::default(),
            info_stream,
            dbi_stream,
        })
    }

    /// Lay out `pdb` and return the file
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for anything the formats can not express: line
    /// blocks naming unknown sources, duplicate source names, scopes out of pre-order, lines
    /// that do not fit a line entry or more than 65535 streams
    pub fn write(mut self, pdb: &PdbFile) -> Result<Vec<u8>> {
        self.write_sources(pdb)?;

        let mut globals = Vec::new();
        for (index, module) in pdb.modules.iter().enumerate() {
            globals.extend(self.write_module(pdb, index, module)?);
        }
        self.write_globals(globals)?;

        if let Some(remap) = &pdb.token_remap {
            let mut data = Vec::with_capacity(remap.len() * 4);
            let mut offset = 0;
            for row in remap {
                write_le_at(&mut data, &mut offset, *row);
            }
            let stream = stream_number(self.msf.add_stream(&data)?)?;
            self.dbi.debug_header.streams[DebugHeader::TOKEN_RID_MAP] = stream;
        }

        let names = self.msf.add_stream(&self.names.finish())?;
        self.named_streams.insert("/names", names);

        self.dbi.header.age = pdb.age;
        self.msf.set_stream(self.dbi_stream, &self.dbi.write()?)?;

        let info = PdbInfo {
            named_streams: std::mem::take(&mut self.named_streams),
            features: vec![FEATURE_VC140],
            ..PdbInfo::new(pdb.guid, pdb.age, pdb.signature)
        };
        self.msf.set_stream(self.info_stream, &info.write()?)?;

        log::debug!(
            "PDB: {} modules, {} sources, {} streams",
            pdb.modules.len(),
            pdb.sources.len(),
            self.msf.stream_count()
        );
        self.msf.finish()
    }

    fn write_sources(&mut self, pdb: &PdbFile) -> Result<()> {
        if pdb.sources.is_empty() {
            return Ok(());
        }

        let mut header_block = SourceHeaderBlock::new(pdb.age);
        for source in &pdb.sources {
            let stream_name = source.stream_name();
            if self.named_streams.get(&stream_name).is_some() {
                return Err(malformed_error!("Source {} is listed twice", source.name));
            }

            let file_name_index = self.names.add(&source.name)?;
            let virtual_name_index = self.names.add(&stream_name)?;
            let stream = self.msf.add_stream(&source.write_stream()?)?;
            self.named_streams.insert(stream_name, stream);
            self.source_names.push(file_name_index);

            header_block.insert(SourceHeaderEntry {
                source_size: source.content_size()?,
                file_name_index,
                virtual_name_index,
                is_virtual: source.content.is_some(),
                ..SourceHeaderEntry::default()
            });
        }

        let stream = self.msf.add_stream(&header_block.write())?;
        self.named_streams.insert("/src/headerblock", stream);
        Ok(())
    }

    fn write_module(
        &mut self,
        pdb: &PdbFile,
        index: usize,
        module: &PdbModule,
    ) -> Result<Vec<TokenRef>> {
        let module_number = u16::try_from(index + 1)
            .map_err(|_| malformed_error!("PDB holds more than 65535 modules"))?;

        let (symbols, proc_offsets) = write_symbols(&module.functions)?;

        let mut c13 = C13Lines::default();
        for function in module.functions.iter().filter(|function| !function.lines.is_empty()) {
            if c13
                .sections
                .iter()
                .any(|section| (section.segment, section.offset) == (function.segment, function.offset))
            {
                return Err(malformed_error!(
                    "Two functions with lines start at {:#x}:{:#x}",
                    function.segment,
                    function.offset
                ));
            }

            let mut blocks = Vec::with_capacity(function.lines.len());
            for lines in &function.lines {
                let source = pdb.sources.get(lines.file).ok_or_else(|| {
                    malformed_error!("{} has lines in unknown source {}", function.name, lines.file)
                })?;
                let checksum_offset = c13.add_checksum(FileChecksum {
                    name_index: self.source_names[lines.file],
                    kind: source.checksum_kind,
                    checksum: source.checksum.clone(),
                });
                blocks.push(LineBlock {
                    checksum_offset,
                    lines: lines.lines.clone(),
                });
            }
            c13.sections.push(LineSection {
                offset: function.offset,
                segment: function.segment,
                code_size: function.length,
                blocks,
            });
        }
        let lines = c13.write()?;

        let mut data = symbols;
        data.extend_from_slice(&lines);
        data.extend_from_slice(&0u32.to_le_bytes());
        let stream = self.msf.add_stream(&data)?;

        let mut info = ModuleInfo::new(&*module.name, &*module.object_name);
        info.stream = stream_number(stream)?;
        info.symbols_size = (data.len() - lines.len() - 4) as u32;
        info.c13_lines_size = lines.len() as u32;
        info.source_file_count = c13.checksums.len() as u16;
        if let (Some(start), Some(end)) = (
            module.functions.iter().map(|function| function.offset).min(),
            module
                .functions
                .iter()
                .map(|function| function.offset.saturating_add(function.length))
                .max(),
        ) {
            info.section = SectionContribution {
                section: module.functions[0].segment,
                offset: start,
                size: end - start,
                characteristics: CODE_SECTION,
                module: index as u16,
                ..SectionContribution::default()
            };
            self.dbi.section_contributions.push(info.section);
        }

        let files = c13
            .checksums
            .iter()
            .map(|(_, entry)| {
                self.source_names
                    .iter()
                    .position(|&name| name == entry.name_index)
                    .map(|source| pdb.sources[source].name.clone())
                    .unwrap_or_default()
            })
            .collect();
        self.dbi.source_files.push(files);
        self.dbi.modules.push(info);

        Ok(module
            .functions
            .iter()
            .zip(proc_offsets)
            .map(|(function, symbol_offset)| TokenRef {
                name: function.name.clone(),
                module: module_number,
                symbol_offset,
            })
            .collect())
    }

    fn write_globals(&mut self, symbols: Vec<TokenRef>) -> Result<()> {
        let (globals, records) = GlobalSymbols::build(symbols)?;

        let records = self.msf.add_stream(&records)?;
        let hash = self.msf.add_stream(&globals.write_hash())?;
        let publics = self.msf.add_stream(&write_public_symbols())?;

        self.dbi.header = DbiHeader {
            symbol_records: stream_number(records)?,
            global_symbols: stream_number(hash)?,
            public_symbols: stream_number(publics)?,
            ..self.dbi.header
        };
        Ok(())
    }
}

impl PdbFile {
    /// Serialize the PDB
    ///
    /// # Errors
    /// See [`PdbWriterState::write`]
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        PdbWriterState::new()?.write(self)
    }

    /// Serialize the PDB into `writer`
    ///
    /// # Errors
    /// See [`PdbWriterState::write`]; I/O failures are [`crate::Error::FileError`]
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(&self.to_vec()?)?;
        Ok(())
    }

    /// Serialize the PDB to `path`
    ///
    /// # Errors
    /// See [`PdbFile::write`]
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_vec()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdb::{msf::MsfReader, PdbFunction, PdbLine, PdbLines, PdbSource};
    use uguid::Guid;

    fn function_with_lines(file: usize) -> PdbFunction {
        let mut function = PdbFunction::new(0x0600_0001, "Main", 1, 0x2050, 8);
        function.lines = vec![PdbLines {
            file,
            lines: vec![PdbLine {
                offset: 0,
                line_begin: 3,
                line_end: 3,
                is_statement: true,
                ..PdbLine::default()
            }],
        }];
        function
    }

    #[test]
    fn fixed_streams() {
        let data = PdbFile::new(Guid::ZERO, 1).to_vec().unwrap();
        let msf = MsfReader::open(&data).unwrap();

        assert_eq!(msf.stream_size(0), Some(0));
        assert_eq!(msf.stream_size(2), Some(56));
        assert_eq!(msf.stream_size(4), Some(56));
        let tpi = msf.read_stream(2).unwrap();
        assert_eq!(&tpi[..4], &TPI_VERSION.to_le_bytes());

        let info = PdbInfo::read(&msf.read_stream(1).unwrap()).unwrap();
        assert_eq!(info.features, vec![FEATURE_VC140]);
        assert!(info.named_streams.get("/names").is_some());
        assert!(info.named_streams.get("/src/headerblock").is_none());
    }

    #[test]
    fn rejects_unknown_sources() {
        let mut pdb = PdbFile::new(Guid::ZERO, 1);
        let mut module = PdbModule::new("m");
        module.functions.push(function_with_lines(0));
        pdb.modules.push(module);
        assert!(pdb.to_vec().is_err());

        pdb.sources.push(PdbSource::new("a.cs"));
        pdb.to_vec().unwrap();

        pdb.sources.push(PdbSource::new("A.cs"));
        assert!(pdb.to_vec().is_err());
    }

    #[test]
    fn rejects_shared_addresses() {
        let mut pdb = PdbFile::new(Guid::ZERO, 1);
        pdb.sources.push(PdbSource::new("a.cs"));
        let mut module = PdbModule::new("m");
        module.functions.push(function_with_lines(0));
        let mut second = function_with_lines(0);
        second.token = 0x0600_0002;
        module.functions.push(second);
        pdb.modules.push(module);
        assert!(pdb.to_vec().is_err());
    }
}
