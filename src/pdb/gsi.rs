//! Global symbols: `S_TOKENREF` records in the symbol record stream and the hash index over
//! them in the global symbol stream.
//!
//! The hash index is a header, one `(offset + 1, reference count)` pair per record grouped by
//! bucket, a bitmap of the non-empty buckets and the start of every non-empty bucket. Bucket
//! starts count in units of 12 bytes, the in-memory size of a hash record in the reference
//! tooling.

use crate::{
    file::{
        bitset::BitSet,
        io::{read_cstring_at, read_le_at, write_cstring_at, write_le_at, TextEncoding},
    },
    pdb::{
        hash::hash_v1_bucket,
        modi::{RecordWriter, S_TOKENREF},
    },
    Result,
};

/// Signature of a GSI hash header
pub const GSI_HASH_SIGNATURE: u32 = 0xFFFF_FFFF;
/// Version of a GSI hash header (V70)
pub const GSI_HASH_VERSION: u32 = 0xEFFE_0000 + 19990810;
/// Buckets of a GSI hash
pub const GSI_BUCKET_COUNT: u32 = 4096;

const HASH_HEADER_SIZE: usize = 16;
const HASH_RECORD_CALC_SIZE: u32 = 12;
const PUBLIC_HEADER_SIZE: usize = 28;

fn bitmap_words() -> usize {
    (GSI_BUCKET_COUNT as usize + 1).div_ceil(32)
}

/// A global reference to a managed procedure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRef {
    /// Procedure name
    pub name: String,
    /// One-based module index
    pub module: u16,
    /// Offset of the procedure record in the module stream
    pub symbol_offset: u32,
}

/// The global symbols of a PDB with their record offsets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalSymbols {
    records: Vec<(u32, TokenRef)>,
    buckets: Vec<Vec<usize>>,
}

impl GlobalSymbols {
    /// No symbols
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of symbols
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if there are no symbols
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Symbols in record order
    pub fn iter(&self) -> impl Iterator<Item = &TokenRef> {
        self.records.iter().map(|(_, symbol)| symbol)
    }

    /// Look a symbol up by exact name through the hash buckets
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&TokenRef> {
        let bucket = hash_v1_bucket(name.as_bytes(), GSI_BUCKET_COUNT) as usize;
        self.buckets
            .get(bucket)?
            .iter()
            .map(|&index| &self.records[index].1)
            .find(|symbol| symbol.name == name)
    }

    /// Serialize `symbols` as the symbol record stream and keep their offsets
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for names that do not fit a record
    pub fn build(symbols: Vec<TokenRef>) -> Result<(Self, Vec<u8>)> {
        let mut writer = RecordWriter::with_prefix(&[]);
        let mut records = Vec::with_capacity(symbols.len());
        let mut buckets = vec![Vec::new(); GSI_BUCKET_COUNT as usize];

        for (index, symbol) in symbols.into_iter().enumerate() {
            let start = writer.begin(S_TOKENREF);
            let (data, offset) = writer.data();
            write_le_at(data, offset, 0u32);
            write_le_at(data, offset, symbol.symbol_offset);
            write_le_at(data, offset, symbol.module);
            write_cstring_at(data, offset, &symbol.name, TextEncoding::Utf8)?;
            writer.finish(start)?;

            buckets[hash_v1_bucket(symbol.name.as_bytes(), GSI_BUCKET_COUNT) as usize].push(index);
            records.push((start as u32, symbol));
        }

        Ok((GlobalSymbols { records, buckets }, writer.into_inner()))
    }

    /// Serialize the hash index
    #[must_use]
    pub fn write_hash(&self) -> Vec<u8> {
        let mut bitmap = BitSet::new(bitmap_words() * 32);
        let mut starts = Vec::new();
        let mut hash_records = Vec::with_capacity(self.records.len());
        for (bucket, members) in self.buckets.iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            bitmap.insert(bucket);
            starts.push(hash_records.len() as u32 * HASH_RECORD_CALC_SIZE);
            hash_records.extend(members.iter().map(|&index| self.records[index].0));
        }

        let mut data = Vec::new();
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, GSI_HASH_SIGNATURE);
        write_le_at(&mut data, &mut offset, GSI_HASH_VERSION);
        write_le_at(&mut data, &mut offset, hash_records.len() as u32 * 8);
        write_le_at(&mut data, &mut offset, ((bitmap_words() + starts.len()) * 4) as u32);
        for record_offset in hash_records {
            write_le_at(&mut data, &mut offset, record_offset + 1);
            write_le_at(&mut data, &mut offset, 1u32);
        }
        bitmap.write_words(&mut data, &mut offset);
        for start in starts {
            write_le_at(&mut data, &mut offset, start);
        }
        data
    }

    /// Parse the symbol record stream and the hash index over it
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] for a foreign header, records of other kinds or hash
    /// entries that do not point at a record
    pub fn read(records: &[u8], hash: &[u8]) -> Result<Self> {
        let mut symbols = Vec::new();
        let mut offset = 0;
        while offset + 4 <= records.len() {
            let start = offset;
            let length = read_le_at::<u16>(records, &mut offset)? as usize;
            let kind = read_le_at::<u16>(records, &mut offset)?;
            if kind != S_TOKENREF {
                return Err(pdb_error!("symbol records", "record {:#06x} at {:#x}", kind, start));
            }
            let _sum_name = read_le_at::<u32>(records, &mut offset)?;
            let symbol_offset = read_le_at::<u32>(records, &mut offset)?;
            let module = read_le_at::<u16>(records, &mut offset)?;
            let name = read_cstring_at(records, &mut offset, TextEncoding::Utf8)?;
            symbols.push((
                start as u32,
                TokenRef {
                    name,
                    module,
                    symbol_offset,
                },
            ));
            offset = start + 2 + length;
        }

        let buckets = Self::read_hash(hash, &symbols)?;
        Ok(GlobalSymbols {
            records: symbols,
            buckets,
        })
    }

    fn read_hash(data: &[u8], symbols: &[(u32, TokenRef)]) -> Result<Vec<Vec<usize>>> {
        let mut offset = 0;
        let signature = read_le_at::<u32>(data, &mut offset)?;
        let version = read_le_at::<u32>(data, &mut offset)?;
        if signature != GSI_HASH_SIGNATURE || version != GSI_HASH_VERSION {
            return Err(pdb_error!("global symbols", "unsupported hash version {:#x}", version));
        }
        let record_bytes = read_le_at::<u32>(data, &mut offset)? as usize;
        let _bucket_bytes = read_le_at::<u32>(data, &mut offset)?;

        let mut indices = Vec::with_capacity(record_bytes / 8);
        for _ in 0..record_bytes / 8 {
            let target = read_le_at::<u32>(data, &mut offset)?.wrapping_sub(1);
            let _references = read_le_at::<u32>(data, &mut offset)?;
            let index = symbols
                .iter()
                .position(|(at, _)| *at == target)
                .ok_or_else(|| {
                    pdb_error!("global symbols", "hash entry points at {:#x}", target)
                })?;
            indices.push(index);
        }

        let bitmap = BitSet::read_words(data, &mut offset, bitmap_words())?;
        let mut starts = Vec::new();
        for bucket in bitmap.iter().filter(|&bucket| bucket < GSI_BUCKET_COUNT as usize) {
            let start = (read_le_at::<u32>(data, &mut offset)? / HASH_RECORD_CALC_SIZE) as usize;
            starts.push((bucket, start));
        }

        let mut buckets = vec![Vec::new(); GSI_BUCKET_COUNT as usize];
        for (position, &(bucket, start)) in starts.iter().enumerate() {
            let end = starts.get(position + 1).map_or(indices.len(), |next| next.1);
            let members = indices.get(start..end).ok_or_else(|| {
                pdb_error!("global symbols", "bucket {} spans {}..{}", bucket, start, end)
            })?;
            buckets[bucket] = members.to_vec();
        }
        Ok(buckets)
    }
}

/// The public symbol stream of a PDB without public symbols: an empty address map and an
/// empty hash index
#[must_use]
pub fn write_public_symbols() -> Vec<u8> {
    let hash = GlobalSymbols::default().write_hash();

    let mut data = Vec::with_capacity(PUBLIC_HEADER_SIZE + hash.len());
    let mut offset = 0;
    write_le_at(&mut data, &mut offset, hash.len() as u32);
    for _ in 0..6 {
        write_le_at(&mut data, &mut offset, 0u32);
    }
    crate::file::io::write_bytes_at(&mut data, &mut offset, &hash);
    data
}

/// Validate a public symbol stream
///
/// # Errors
/// Returns [`crate::Error::Pdb`] if its hash index is not a GSI hash
pub fn read_public_symbols(data: &[u8]) -> Result<()> {
    let mut offset = 0;
    let hash_size = read_le_at::<u32>(data, &mut offset)? as usize;
    let hash = data
        .get(PUBLIC_HEADER_SIZE..PUBLIC_HEADER_SIZE + hash_size)
        .ok_or_else(|| pdb_error!("public symbols", "hash of {} bytes is truncated", hash_size))?;
    if hash.len() < HASH_HEADER_SIZE {
        return Err(pdb_error!("public symbols", "hash header is truncated"));
    }
    GlobalSymbols::read_hash(hash, &[]).map(|_| ())
}
