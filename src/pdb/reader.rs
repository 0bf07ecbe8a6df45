//! Reading a [`PdbFile`].

use std::path::Path;

use crate::{
    file::io::read_le_at,
    pdb::{
        dbi::{DbiStream, ModuleInfo, NIL_STREAM},
        gsi::GlobalSymbols,
        info::PdbInfo,
        lines::{C13Lines, PdbLines},
        model::{PdbFile, PdbFunction, PdbModule},
        modi::read_symbols,
        msf::MsfReader,
        names::NamesTable,
        options::PdbReadOptions,
        sources::{PdbSource, SourceHeaderBlock},
    },
    Error, Result,
};

/// Stream-level access to a PDB
#[derive(Debug)]
pub struct PdbReader<'a> {
    msf: MsfReader<'a>,
    info: PdbInfo,
    options: PdbReadOptions,
}

impl<'a> PdbReader<'a> {
    /// Open the container and parse the info stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] if the container or the info stream is broken
    pub fn open(data: &'a [u8], options: PdbReadOptions) -> Result<Self> {
        let msf = MsfReader::open(data)?;
        let info = PdbInfo::read(&msf.read_stream(1)?)?;
        Ok(PdbReader { msf, info, options })
    }

    /// The container
    #[must_use]
    pub fn msf(&self) -> &MsfReader<'a> {
        &self.msf
    }

    /// The info stream
    #[must_use]
    pub fn info(&self) -> &PdbInfo {
        &self.info
    }

    /// Contents of the stream called `name`
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] naming the stream if no stream has that name
    pub fn named_stream(&self, name: &str) -> Result<Vec<u8>> {
        let index = self
            .info
            .named_streams
            .get(name)
            .ok_or_else(|| pdb_error!(name, "missing named stream"))?;
        self.msf.read_stream(index)
    }

    /// The `/names` table
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] if it is missing or broken
    pub fn names(&self) -> Result<NamesTable> {
        NamesTable::read(&self.named_stream("/names")?)
    }

    /// The DBI stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] if it is missing or broken
    pub fn dbi(&self) -> Result<DbiStream> {
        DbiStream::read(&self.msf.read_stream(3)?)
    }

    /// The global symbols named by the DBI header
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] if a symbol stream is missing or broken
    pub fn global_symbols(&self, dbi: &DbiStream) -> Result<GlobalSymbols> {
        if dbi.header.symbol_records == NIL_STREAM {
            return Ok(GlobalSymbols::new());
        }
        let records = self.msf.read_stream(u32::from(dbi.header.symbol_records))?;
        let hash = self.msf.read_stream(u32::from(dbi.header.global_symbols))?;
        GlobalSymbols::read(&records, &hash)
    }

    /// Source documents listed in `/src/headerblock`, ordered by their stream index
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] if the block or a document stream is missing or broken
    pub fn sources(&self, names: &NamesTable) -> Result<Vec<PdbSource>> {
        if self.info.named_streams.get("/src/headerblock").is_none() {
            return Ok(Vec::new());
        }
        let block = SourceHeaderBlock::read(&self.named_stream("/src/headerblock")?)?;

        let mut sources = Vec::new();
        for entry in block.entries() {
            let name = names.get(entry.file_name_index)?;
            let stream_name = names.get(entry.virtual_name_index)?;
            let stream = self
                .info
                .named_streams
                .get(&stream_name)
                .ok_or_else(|| pdb_error!(&stream_name, "missing named stream"))?;
            let data = self.msf.read_stream(stream)?;
            sources.push((
                stream,
                PdbSource::read_stream(name, &data, self.options.load_source_content)?,
            ));
        }

        sources.sort_by_key(|(stream, _)| *stream);
        Ok(sources.into_iter().map(|(_, source)| source).collect())
    }

    /// Parse everything into the model
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] for any inconsistency; in strict mode also for records,
    /// OEM payloads and line references this crate does not understand
    pub fn read_file(&self) -> Result<PdbFile> {
        let names = self.names()?;
        let mut sources = self.sources(&names)?;
        let dbi = self.dbi()?;

        let mut modules = Vec::with_capacity(dbi.modules.len());
        for info in &dbi.modules {
            modules.push(self.read_module(info, &names, &mut sources)?);
        }

        let token_remap = match dbi.debug_header.token_rid_map() {
            Some(stream) => {
                let data = self.msf.read_stream(u32::from(stream))?;
                let mut offset = 0;
                let mut rows = Vec::with_capacity(data.len() / 4);
                while offset + 4 <= data.len() {
                    rows.push(read_le_at::<u32>(&data, &mut offset)?);
                }
                Some(rows)
            }
            None => None,
        };

        log::debug!(
            "PDB: read {} modules, {} sources",
            modules.len(),
            sources.len()
        );
        Ok(PdbFile {
            guid: self.info.guid,
            age: self.info.age,
            signature: self.info.signature,
            modules,
            sources,
            token_remap,
        })
    }

    fn read_module(
        &self,
        info: &ModuleInfo,
        names: &NamesTable,
        sources: &mut Vec<PdbSource>,
    ) -> Result<PdbModule> {
        let mut module = PdbModule {
            name: info.module_name.clone(),
            object_name: info.object_name.clone(),
            functions: Vec::new(),
        };
        if info.stream == NIL_STREAM {
            return Ok(module);
        }

        let data = self.msf.read_stream(u32::from(info.stream))?;
        let symbols_end = info.symbols_size as usize;
        let lines_end = symbols_end + info.c13_lines_size as usize;
        if lines_end > data.len() {
            return Err(pdb_error!(
                &info.module_name,
                "module stream of {} bytes is shorter than its substreams",
                data.len()
            ));
        }

        let name = info.module_name.as_str();
        let truncated = |error: Error| match error {
            Error::OutOfBounds => pdb_error!(name, "record runs past the end of the stream"),
            other => other,
        };
        module.functions =
            read_symbols(&data[..symbols_end], name, &self.options).map_err(truncated)?;
        let c13 = C13Lines::read(&data[symbols_end..lines_end], name, self.options.strict)
            .map_err(truncated)?;
        self.attach_lines(name, &mut module.functions, &c13, names, sources)?;
        Ok(module)
    }

    fn attach_lines(
        &self,
        module: &str,
        functions: &mut [PdbFunction],
        c13: &C13Lines,
        names: &NamesTable,
        sources: &mut Vec<PdbSource>,
    ) -> Result<()> {
        for section in &c13.sections {
            let Some(function) = functions.iter_mut().find(|function| {
                function.segment == section.segment
                    && function.offset == section.offset
                    && function.lines.is_empty()
            }) else {
                if self.options.strict {
                    return Err(pdb_error!(
                        module,
                        "lines at {:#x}:{:#x} belong to no function",
                        section.segment,
                        section.offset
                    ));
                }
                log::debug!(
                    "{}: skipping lines at {:#x}:{:#x}",
                    module,
                    section.segment,
                    section.offset
                );
                continue;
            };

            for block in &section.blocks {
                let entry = c13.checksum_at(block.checksum_offset).ok_or_else(|| {
                    pdb_error!(module, "no file checksum at {:#x}", block.checksum_offset)
                })?;
                let name = names.get(entry.name_index)?;

                let file = match sources.iter().position(|source| source.name == name) {
                    Some(file) => file,
                    None if self.options.strict => {
                        return Err(pdb_error!("/src/headerblock", "{} is not listed", name));
                    }
                    None => {
                        log::debug!("adding unlisted source {}", name);
                        sources.push(PdbSource {
                            checksum_kind: entry.kind,
                            checksum: entry.checksum.clone(),
                            ..PdbSource::new(name)
                        });
                        sources.len() - 1
                    }
                };

                function.lines.push(PdbLines {
                    file,
                    lines: block.lines.clone(),
                });
            }
        }
        Ok(())
    }
}

impl PdbFile {
    /// Parse a PDB
    ///
    /// # Errors
    /// See [`PdbReader::read_file`]
    pub fn read(data: &[u8], options: &PdbReadOptions) -> Result<Self> {
        PdbReader::open(data, *options)?.read_file()
    }

    /// Parse the PDB at `path`
    ///
    /// # Errors
    /// I/O failures are [`crate::Error::FileError`], everything else as [`PdbFile::read`]
    pub fn read_file(path: impl AsRef<Path>, options: &PdbReadOptions) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::read(&data, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdb::{
        lines::{FileChecksum, LineBlock, LineSection},
        modi::write_symbols,
        msf::MsfWriter,
        namemap::NamedStreamMap,
        names::NamesBuilder,
        sources::ChecksumKind,
        PdbLine,
    };
    use uguid::Guid;

    /// A PDB whose only module has lines in a document `/src/headerblock` does not list
    fn unlisted_source() -> Vec<u8> {
        let mut names = NamesBuilder::new();
        let name_index = names.add("c:\\gen\\Generated.cs").unwrap();

        let function = PdbFunction::new(0x0600_0001, "Run", 1, 0x10, 4);
        let (mut module_data, _) = write_symbols(std::slice::from_ref(&function)).unwrap();
        let symbols_size = module_data.len();
        let mut c13 = C13Lines::default();
        let checksum_offset = c13.add_checksum(FileChecksum {
            name_index,
            kind: ChecksumKind::Md5,
            checksum: vec![7; 16],
        });
        c13.sections.push(LineSection {
            offset: 0x10,
            segment: 1,
            code_size: 4,
            blocks: vec![LineBlock {
                checksum_offset,
                lines: vec![PdbLine {
                    line_begin: 5,
                    line_end: 5,
                    ..PdbLine::default()
                }],
            }],
        });
        let lines = c13.write().unwrap();
        module_data.extend_from_slice(&lines);
        single_module("m", &module_data, symbols_size, lines.len(), names)
    }

    /// A container with one module stream and a `/names` stream
    fn single_module(
        name: &str,
        module_data: &[u8],
        symbols_size: usize,
        lines_size: usize,
        names: NamesBuilder,
    ) -> Vec<u8> {
        let mut msf = MsfWriter::new(512).unwrap();
        msf.reserve_stream();
        let info_stream = msf.reserve_stream();
        msf.add_nil_stream();
        let dbi_stream = msf.reserve_stream();
        let module_stream = msf.add_stream(module_data).unwrap();
        let names_stream = msf.add_stream(&names.finish()).unwrap();

        let mut module = ModuleInfo::new(name, name);
        module.stream = module_stream as u16;
        module.symbols_size = symbols_size as u32;
        module.c13_lines_size = lines_size as u32;
        let dbi = DbiStream {
            modules: vec![module],
            source_files: vec![vec!["c:\\gen\\Generated.cs".into()]],
            ..DbiStream::default()
        };
        msf.set_stream(dbi_stream, &dbi.write().unwrap()).unwrap();

        let mut named_streams = NamedStreamMap::new();
        named_streams.insert("/names", names_stream);
        let info = PdbInfo {
            named_streams,
            ..PdbInfo::new(Guid::ZERO, 1, 0)
        };
        msf.set_stream(info_stream, &info.write().unwrap()).unwrap();
        msf.finish().unwrap()
    }

    fn failing_stream(data: &[u8]) -> String {
        match PdbFile::read(data, &PdbReadOptions::lenient()) {
            Err(crate::Error::Pdb { stream, .. }) => stream,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncated_module_is_named() {
        let function = PdbFunction::new(0x0600_0001, "Run", 1, 0x10, 4);
        let (symbols, _) = write_symbols(std::slice::from_ref(&function)).unwrap();

        // The closing S_END loses its kind
        let cut = &symbols[..symbols.len() - 2];
        let data = single_module("Widgets", cut, cut.len(), 0, NamesBuilder::new());
        assert_eq!(failing_stream(&data), "Widgets");

        // The last record claims more bytes than remain
        let mut overrun = symbols.clone();
        let last = overrun.len() - 4;
        overrun[last] = 0x40;
        let data = single_module("Widgets", &overrun, overrun.len(), 0, NamesBuilder::new());
        assert_eq!(failing_stream(&data), "Widgets");

        // Substream sizes larger than the stream
        let data = single_module("Widgets", &symbols, symbols.len() + 8, 0, NamesBuilder::new());
        assert_eq!(failing_stream(&data), "Widgets");
    }

    #[test]
    fn unlisted_sources() {
        let data = unlisted_source();
        assert!(matches!(
            PdbFile::read(&data, &PdbReadOptions::strict()),
            Err(crate::Error::Pdb { .. })
        ));

        let pdb = PdbFile::read(&data, &PdbReadOptions::lenient()).unwrap();
        assert_eq!(pdb.sources.len(), 1);
        assert_eq!(pdb.sources[0].name, "c:\\gen\\Generated.cs");
        assert_eq!(pdb.sources[0].checksum_kind, ChecksumKind::Md5);
        assert_eq!(pdb.sources[0].content, None);
        let function = pdb.function(0x0600_0001).unwrap();
        assert_eq!(function.lines[0].file, 0);
        assert_eq!(function.lines[0].lines[0].line_begin, 5);
        assert_eq!(pdb.token_remap, None);
    }

    #[test]
    fn missing_names_stream() {
        let mut msf = MsfWriter::new(512).unwrap();
        msf.reserve_stream();
        let info = PdbInfo::new(Guid::ZERO, 1, 0).write().unwrap();
        msf.add_stream(&info).unwrap();
        let data = msf.finish().unwrap();

        let reader = PdbReader::open(&data, PdbReadOptions::default()).unwrap();
        match reader.read_file() {
            Err(crate::Error::Pdb { stream, .. }) => assert_eq!(stream, "/names"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
