//! The named stream map of the PDB info stream.
//!
//! Maps names such as `/names` or `/src/headerblock` to stream indices. Names live in a string
//! buffer; the hash table maps a name's buffer offset to its stream, bucketed by the low 16
//! bits of [`hash_v1`] of the name.

use std::collections::BTreeMap;

use crate::{
    file::io::{
        read_bytes_at, read_cstring_at, read_le_at, write_bytes_at, write_le_at, TextEncoding,
    },
    pdb::{
        hash::hash_v1,
        hashtable::{Growth, HashTable},
    },
    Result,
};

/// Initial bucket count of a freshly written map
const INITIAL_CAPACITY: usize = 8;

/// Stream indices by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedStreamMap {
    streams: BTreeMap<String, u32>,
}

fn name_at(buffer: &[u8], offset: u32) -> Result<String> {
    let mut offset = offset as usize;
    read_cstring_at(buffer, &mut offset, TextEncoding::Utf8)
}

fn bucket_hash(buffer: &[u8], offset: u32) -> u32 {
    name_at(buffer, offset).map_or(0, |name| u32::from(hash_v1(name.as_bytes()) as u16))
}

impl NamedStreamMap {
    /// An empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream index of `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u32> {
        self.streams.get(name).copied()
    }

    /// Map `name` to `stream`, replacing an earlier mapping
    pub fn insert(&mut self, name: impl Into<String>, stream: u32) {
        self.streams.insert(name.into(), stream);
    }

    /// Number of named streams
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// True if no stream is named
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// All names with their streams, ordered by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.streams.iter().map(|(name, stream)| (name.as_str(), *stream))
    }

    /// Read the map at `offset` of the info stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] for an inconsistent hash table or a name offset outside
    /// the string buffer
    pub fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        let buffer_size = read_le_at::<u32>(data, offset)? as usize;
        let buffer = read_bytes_at(data, offset, buffer_size)?;
        let table = HashTable::<u32>::read(data, offset, Growth::LoadFactor, "PDB")?;

        let mut streams = BTreeMap::new();
        for (name_offset, stream) in table.iter() {
            let name = name_at(buffer, name_offset).map_err(|_| {
                pdb_error!("PDB", "named stream map offset {:#x} is outside its names", name_offset)
            })?;
            streams.insert(name, *stream);
        }

        Ok(NamedStreamMap { streams })
    }

    /// Append the serialized map
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for names that contain a NUL
    pub fn write(&self, data: &mut Vec<u8>, offset: &mut usize) -> Result<()> {
        let mut buffer = Vec::new();
        let mut names = Vec::with_capacity(self.streams.len());
        for (name, stream) in &self.streams {
            if name.contains('\0') {
                return Err(malformed_error!("Stream name {:?} contains a NUL", name));
            }
            names.push((buffer.len() as u32, *stream));
            buffer.extend_from_slice(name.as_bytes());
            buffer.push(0);
        }

        let hash = |key: u32| bucket_hash(&buffer, key);
        let mut table = HashTable::new(INITIAL_CAPACITY, Growth::LoadFactor);
        for (name_offset, stream) in names {
            table.insert(name_offset, stream, &hash);
        }

        write_le_at(data, offset, buffer.len() as u32);
        write_bytes_at(data, offset, &buffer);
        table.write(data, offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut map = NamedStreamMap::new();
        map.insert("/names", 9);
        map.insert("/src/headerblock", 8);
        map.insert("/LinkInfo", 5);

        let mut data = Vec::new();
        map.write(&mut data, &mut 0).unwrap();

        // buffer sorted by name: "/LinkInfo\0/names\0/src/headerblock\0"
        assert_eq!(&data[..4], &34u32.to_le_bytes());
        assert_eq!(&data[4..14], b"/LinkInfo\0");

        let mut offset = 0;
        let read = NamedStreamMap::read(&data, &mut offset).unwrap();
        assert_eq!(offset, data.len());
        assert_eq!(read, map);
        assert_eq!(read.get("/names"), Some(9));
        assert_eq!(read.get("/NAMES"), None);
    }

    #[test]
    fn grows_past_two_thirds() {
        let mut map = NamedStreamMap::new();
        for i in 0..6 {
            map.insert(format!("/src/files/{i}.cs"), 10 + i);
        }

        let mut data = Vec::new();
        map.write(&mut data, &mut 0).unwrap();
        let buffer_size = u32::from_le_bytes(data[..4].try_into().unwrap()) as usize;
        let capacity_at = 4 + buffer_size + 4;
        let capacity = u32::from_le_bytes(data[capacity_at..capacity_at + 4].try_into().unwrap());
        assert_eq!(capacity, 16);

        assert_eq!(NamedStreamMap::read(&data, &mut 0).unwrap(), map);
    }

    #[test]
    fn bad_offset() {
        let mut map = NamedStreamMap::new();
        map.insert("/names", 1);
        let mut data = Vec::new();
        map.write(&mut data, &mut 0).unwrap();

        // point the only key past the buffer
        let key_at = data.len() - 8;
        data[key_at] = 0x40;
        assert!(matches!(
            NamedStreamMap::read(&data, &mut 0),
            Err(crate::Error::Pdb { .. })
        ));
    }
}
