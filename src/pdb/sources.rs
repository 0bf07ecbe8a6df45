//! Source documents: checksums, embedded content, the `/src/headerblock` table and the
//! per-document `/src/files/` streams.
//!
//! `/src/headerblock` starts with a 64 byte header (version, stream size, file time, age)
//! followed by a serialized hash table from the `/names` index of a document name to a
//! [`SourceHeaderEntry`]. A key's home bucket is the key modulo the bucket count, and the
//! table doubles only once every bucket is taken.
//!
//! Each document's own stream, named by its lowercased `/src/files/` path, holds:
//!
//! ```text
//! u32 version (1)
//! GUID language, GUID vendor, GUID document type
//! u8 checksum kind, 3 bytes padding
//! u32 checksum length, checksum
//! u32 content length (0xFFFFFFFF when not embedded), content
//! ```

use md5::Md5;
use sha1::{Digest, Sha1};
use uguid::{guid, Guid};

use crate::{
    file::io::{
        read_bytes_at, read_guid_at, read_le_at, write_bytes_at, write_guid_at, write_le_at,
    },
    pdb::hashtable::{Growth, HashTable, HashValue},
    Result,
};

/// Language GUID of C#
pub const LANGUAGE_CSHARP: Guid = guid!("3F5162F8-07C6-11D3-9053-00C04FA302A1");
/// Language GUID of Visual Basic
pub const LANGUAGE_VISUAL_BASIC: Guid = guid!("3A12D0B8-C26C-11D0-B442-00A0244A1DD2");
/// Vendor GUID of Microsoft
pub const VENDOR_MICROSOFT: Guid = guid!("994B45C4-E6E9-11D2-903F-00C04FA302A1");
/// Document type GUID of text files
pub const DOCUMENT_TYPE_TEXT: Guid = guid!("5A869D0B-6611-11D3-BD2A-0000F80849BD");

/// Version of `/src/headerblock` and of its entries
pub const SOURCE_HEADER_VERSION: u32 = 19980827;

/// Prefix of the per-document stream names
pub const SOURCE_FILES_PREFIX: &str = "/src/files/";

/// Version of the per-document streams
const SOURCE_FILE_VERSION: u32 = 1;

const HEADER_SIZE: usize = 64;
const ENTRY_SIZE: u32 = 40;
const INITIAL_CAPACITY: usize = 8;
const NO_CONTENT: u32 = 0xFFFF_FFFF;

/// Checksum algorithm of a source document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChecksumKind {
    /// No checksum
    #[default]
    None,
    /// MD5
    Md5,
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
}

impl ChecksumKind {
    /// The on-disk code
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            ChecksumKind::None => 0,
            ChecksumKind::Md5 => 1,
            ChecksumKind::Sha1 => 2,
            ChecksumKind::Sha256 => 3,
        }
    }

    /// The kind of an on-disk code
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for codes above 3
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ChecksumKind::None),
            1 => Ok(ChecksumKind::Md5),
            2 => Ok(ChecksumKind::Sha1),
            3 => Ok(ChecksumKind::Sha256),
            _ => Err(malformed_error!("Unknown checksum kind {}", code)),
        }
    }

    /// Hash `data`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for SHA-256, which this crate does not compute
    pub fn compute(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            ChecksumKind::None => Ok(Vec::new()),
            ChecksumKind::Md5 => Ok(Md5::digest(data).to_vec()),
            ChecksumKind::Sha1 => Ok(Sha1::digest(data).to_vec()),
            ChecksumKind::Sha256 => Err(malformed_error!("SHA-256 checksums can only be stored")),
        }
    }
}

/// A source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbSource {
    /// Path as the compiler saw it
    pub name: String,
    /// Language GUID
    pub language: Guid,
    /// Language vendor GUID
    pub vendor: Guid,
    /// Document type GUID
    pub document_type: Guid,
    /// Checksum algorithm
    pub checksum_kind: ChecksumKind,
    /// Checksum of the document
    pub checksum: Vec<u8>,
    /// Embedded content
    pub content: Option<Vec<u8>>,
}

impl PdbSource {
    /// A C# text document without checksum
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        PdbSource {
            name: name.into(),
            language: LANGUAGE_CSHARP,
            vendor: VENDOR_MICROSOFT,
            document_type: DOCUMENT_TYPE_TEXT,
            checksum_kind: ChecksumKind::None,
            checksum: Vec::new(),
            content: None,
        }
    }

    /// A C# text document with embedded content and its checksum
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `kind` can not be computed
    pub fn with_content(name: impl Into<String>, content: Vec<u8>, kind: ChecksumKind) -> Result<Self> {
        let mut source = PdbSource::new(name);
        source.checksum = kind.compute(&content)?;
        source.checksum_kind = kind;
        source.content = Some(content);
        Ok(source)
    }

    /// True unless embedded content disagrees with the checksum
    #[must_use]
    pub fn verify(&self) -> bool {
        match (&self.content, self.checksum_kind) {
            (Some(content), ChecksumKind::Md5 | ChecksumKind::Sha1) => self
                .checksum_kind
                .compute(content)
                .is_ok_and(|computed| computed == self.checksum),
            _ => true,
        }
    }

    /// Name of the document's `/src/files/` stream
    #[must_use]
    pub fn stream_name(&self) -> String {
        format!("{}{}", SOURCE_FILES_PREFIX, self.name.to_lowercase())
    }

    /// Size of the embedded content as stored in `/src/headerblock`, zero without content
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the content does not fit below `0xFFFFFFFF`
    pub fn content_size(&self) -> Result<u32> {
        self.content
            .as_ref()
            .map_or(Ok(0), |content| stored_size(&self.name, "content", content.len()))
    }

    /// Serialize the document stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the checksum or content exceed 4 GiB
    pub fn write_stream(&self) -> Result<Vec<u8>> {
        let checksum_len = stored_size(&self.name, "checksum", self.checksum.len())?;

        let mut data = Vec::new();
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, SOURCE_FILE_VERSION);
        write_guid_at(&mut data, &mut offset, &self.language);
        write_guid_at(&mut data, &mut offset, &self.vendor);
        write_guid_at(&mut data, &mut offset, &self.document_type);
        write_bytes_at(&mut data, &mut offset, &[self.checksum_kind.code(), 0, 0, 0]);
        write_le_at(&mut data, &mut offset, checksum_len);
        write_bytes_at(&mut data, &mut offset, &self.checksum);
        match &self.content {
            Some(content) => {
                write_le_at(&mut data, &mut offset, self.content_size()?);
                write_bytes_at(&mut data, &mut offset, content);
            }
            None => write_le_at(&mut data, &mut offset, NO_CONTENT),
        }
        Ok(data)
    }

    /// Parse a document stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] for an unknown stream version and
    /// [`crate::Error::OutOfBounds`] for truncated streams
    pub fn read_stream(name: impl Into<String>, data: &[u8], load_content: bool) -> Result<Self> {
        let name = name.into();
        let mut offset = 0;
        let version = read_le_at::<u32>(data, &mut offset)?;
        if version != SOURCE_FILE_VERSION {
            return Err(pdb_error!(
                format!("{SOURCE_FILES_PREFIX}{name}"),
                "unsupported version {}",
                version
            ));
        }

        let language = read_guid_at(data, &mut offset)?;
        let vendor = read_guid_at(data, &mut offset)?;
        let document_type = read_guid_at(data, &mut offset)?;
        let checksum_kind = ChecksumKind::from_code(read_bytes_at(data, &mut offset, 4)?[0])?;
        let checksum_len = read_le_at::<u32>(data, &mut offset)? as usize;
        let checksum = read_bytes_at(data, &mut offset, checksum_len)?.to_vec();
        let content = match read_le_at::<u32>(data, &mut offset)? {
            NO_CONTENT => None,
            _ if !load_content => None,
            len => Some(read_bytes_at(data, &mut offset, len as usize)?.to_vec()),
        };

        Ok(PdbSource {
            name,
            language,
            vendor,
            document_type,
            checksum_kind,
            checksum,
            content,
        })
    }
}

/// One entry of `/src/headerblock`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceHeaderEntry {
    /// CRC of the original content
    pub crc: u32,
    /// Size of the original content
    pub source_size: u32,
    /// `/names` index of the document name
    pub file_name_index: u32,
    /// `/names` index of the object file name
    pub object_name_index: u32,
    /// `/names` index of the document stream name
    pub virtual_name_index: u32,
    /// Compression of the stored content
    pub compression: u8,
    /// Set for injected documents
    pub is_virtual: bool,
}

impl HashValue for SourceHeaderEntry {
    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        let size = read_le_at::<u32>(data, offset)?;
        let version = read_le_at::<u32>(data, offset)?;
        if size != ENTRY_SIZE || version != SOURCE_HEADER_VERSION {
            return Err(pdb_error!(
                "/src/headerblock",
                "entry of size {} version {}",
                size,
                version
            ));
        }

        let entry = SourceHeaderEntry {
            crc: read_le_at::<u32>(data, offset)?,
            source_size: read_le_at::<u32>(data, offset)?,
            file_name_index: read_le_at::<u32>(data, offset)?,
            object_name_index: read_le_at::<u32>(data, offset)?,
            virtual_name_index: read_le_at::<u32>(data, offset)?,
            compression: read_le_at::<u8>(data, offset)?,
            is_virtual: read_le_at::<u8>(data, offset)? != 0,
        };
        read_bytes_at(data, offset, 10)?;
        Ok(entry)
    }

    fn write(&self, buffer: &mut Vec<u8>, offset: &mut usize) {
        write_le_at(buffer, offset, ENTRY_SIZE);
        write_le_at(buffer, offset, SOURCE_HEADER_VERSION);
        write_le_at(buffer, offset, self.crc);
        write_le_at(buffer, offset, self.source_size);
        write_le_at(buffer, offset, self.file_name_index);
        write_le_at(buffer, offset, self.object_name_index);
        write_le_at(buffer, offset, self.virtual_name_index);
        write_le_at(buffer, offset, self.compression);
        write_le_at(buffer, offset, u8::from(self.is_virtual));
        write_bytes_at(buffer, offset, &[0; 10]);
    }
}

/// Keys are `/names` indices and hash to themselves
fn entry_hash(key: u32) -> u32 {
    key
}

/// The `/src/headerblock` stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHeaderBlock {
    /// Age of the PDB the block was written for
    pub age: u32,
    table: HashTable<SourceHeaderEntry>,
}

impl SourceHeaderBlock {
    /// An empty block
    #[must_use]
    pub fn new(age: u32) -> Self {
        SourceHeaderBlock {
            age,
            table: HashTable::new(INITIAL_CAPACITY, Growth::WhenFull),
        }
    }

    /// Add or replace the entry of its document name
    pub fn insert(&mut self, entry: SourceHeaderEntry) {
        self.table.insert(entry.file_name_index, entry, &entry_hash);
    }

    /// Entry of the document whose name has `/names` index `file_name_index`
    #[must_use]
    pub fn get(&self, file_name_index: u32) -> Option<&SourceHeaderEntry> {
        self.table.get(file_name_index, &entry_hash)
    }

    /// Entries in bucket order
    pub fn entries(&self) -> impl Iterator<Item = &SourceHeaderEntry> {
        self.table.iter().map(|(_, entry)| entry)
    }

    /// Number of documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True if no document is listed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Number of buckets
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Parse the stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] for another version or an inconsistent table
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let version = read_le_at::<u32>(data, &mut offset)?;
        let _size = read_le_at::<u32>(data, &mut offset)?;
        let _file_time = read_le_at::<u64>(data, &mut offset)?;
        let age = read_le_at::<u32>(data, &mut offset)?;
        if version != SOURCE_HEADER_VERSION {
            return Err(pdb_error!("/src/headerblock", "unsupported version {}", version));
        }

        offset = HEADER_SIZE;
        let table = HashTable::read(data, &mut offset, Growth::WhenFull, "/src/headerblock")?;
        Ok(SourceHeaderBlock { age, table })
    }

    /// Serialize the stream
    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        let mut data = vec![0; HEADER_SIZE];
        let mut offset = HEADER_SIZE;
        self.table.write(&mut data, &mut offset);

        let size = data.len() as u32;
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, SOURCE_HEADER_VERSION);
        write_le_at(&mut data, &mut offset, size);
        write_le_at(&mut data, &mut offset, 0u64);
        write_le_at(&mut data, &mut offset, self.age);
        data
    }
}

/// A length stored as `u32`, where `0xFFFFFFFF` means "no content"
fn stored_size(source: &str, what: &str, len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&len| len != NO_CONTENT)
        .ok_or_else(|| malformed_error!("{} of {} is too large ({} bytes)", what, source, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_sizes() {
        let mut source = PdbSource::new("a.cs");
        assert_eq!(source.content_size().unwrap(), 0);
        source.content = Some(vec![0; 12]);
        assert_eq!(source.content_size().unwrap(), 12);

        assert_eq!(stored_size("a.cs", "content", 0xFFFF_FFFE).unwrap(), 0xFFFF_FFFE);
        assert!(matches!(
            stored_size("a.cs", "content", NO_CONTENT as usize),
            Err(crate::Error::Malformed { .. })
        ));
        #[cfg(target_pointer_width = "64")]
        assert!(stored_size("a.cs", "content", 1 << 32).is_err());
    }

    #[test]
    fn checksums() {
        let source = PdbSource::with_content("a.cs", b"abc".to_vec(), ChecksumKind::Md5).unwrap();
        assert_eq!(
            source.checksum,
            [
                0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28,
                0xe1, 0x7f, 0x72
            ]
        );
        assert!(source.verify());

        let sha1 = PdbSource::with_content("a.cs", b"abc".to_vec(), ChecksumKind::Sha1).unwrap();
        assert_eq!(sha1.checksum.len(), 20);
        assert_eq!(&sha1.checksum[..4], &[0xa9, 0x99, 0x3e, 0x36]);

        let mut tampered = sha1;
        tampered.content = Some(b"abd".to_vec());
        assert!(!tampered.verify());

        assert!(PdbSource::with_content("a.cs", Vec::new(), ChecksumKind::Sha256).is_err());
        assert!(ChecksumKind::from_code(4).is_err());
    }

    #[test]
    fn document_stream() {
        let source =
            PdbSource::with_content("C:\\Src\\Program.cs", b"class P {}".to_vec(), ChecksumKind::Sha1)
                .unwrap();
        assert_eq!(source.stream_name(), "/src/files/c:\\src\\program.cs");

        let data = source.write_stream().unwrap();
        let read = PdbSource::read_stream(source.name.clone(), &data, true).unwrap();
        assert_eq!(read, source);

        let without = PdbSource::read_stream(source.name.clone(), &data, false).unwrap();
        assert_eq!(without.content, None);
        assert_eq!(without.checksum, source.checksum);

        let bare = PdbSource::new("b.cs");
        let data = bare.write_stream().unwrap();
        assert_eq!(&data[data.len() - 4..], &[0xFF; 4]);
        assert_eq!(PdbSource::read_stream("b.cs", &data, true).unwrap(), bare);
    }

    #[test]
    fn header_block_grows_when_full() {
        let mut block = SourceHeaderBlock::new(2);
        for index in 1..=8 {
            block.insert(SourceHeaderEntry {
                file_name_index: index * 8,
                virtual_name_index: index * 8 + 1,
                ..SourceHeaderEntry::default()
            });
        }
        // all eight keys collide in bucket 0 and fill the table
        assert_eq!(block.capacity(), 8);

        block.insert(SourceHeaderEntry {
            file_name_index: 3,
            ..SourceHeaderEntry::default()
        });
        assert_eq!(block.capacity(), 16);
        assert_eq!(block.entries().count(), 9);
        assert_eq!(block.len(), 9);

        let data = block.write();
        assert_eq!(&data[4..8], &(data.len() as u32).to_le_bytes());
        let read = SourceHeaderBlock::read(&data).unwrap();
        assert_eq!(read, block);
        assert_eq!(read.get(24).map(|entry| entry.virtual_name_index), Some(25));
        assert_eq!(read.get(5), None);
    }

    #[test]
    fn bad_entries() {
        let mut block = SourceHeaderBlock::new(1);
        block.insert(SourceHeaderEntry {
            file_name_index: 1,
            ..SourceHeaderEntry::default()
        });
        let mut data = block.write();
        // entry size field of the only entry
        let entry_at = data.len() - 40;
        data[entry_at] = 44;
        assert!(matches!(
            SourceHeaderBlock::read(&data),
            Err(crate::Error::Pdb { .. })
        ));
    }
}
