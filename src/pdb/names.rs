//! The `/names` string table.
//!
//! ```text
//! u32 signature (0xEFFEEFFE)   u32 version (1)
//! u32 buffer size              buffer, starting with an empty string
//! u32 bucket count             u32 offset per bucket, 0 when empty
//! u32 name count
//! ```
//!
//! Other streams refer to names by their offset in the buffer.

use std::collections::HashMap;

use crate::{
    file::io::{
        read_bytes_at, read_cstring_at, read_le_at, write_bytes_at, write_le_at, TextEncoding,
    },
    pdb::hash::hash_v1_bucket,
    Result,
};

/// Signature of the `/names` stream
pub const NAMES_SIGNATURE: u32 = 0xEFFE_EFFE;
/// The only supported `/names` version
pub const NAMES_VERSION: u32 = 1;

/// A read `/names` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamesTable {
    buffer: Vec<u8>,
    buckets: Vec<u32>,
    count: u32,
}

impl NamesTable {
    /// Parse the stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] for a wrong signature or version
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let signature = read_le_at::<u32>(data, &mut offset)?;
        let version = read_le_at::<u32>(data, &mut offset)?;
        if signature != NAMES_SIGNATURE || version != NAMES_VERSION {
            return Err(pdb_error!(
                "/names",
                "unsupported signature {:#x} version {}",
                signature,
                version
            ));
        }

        let size = read_le_at::<u32>(data, &mut offset)? as usize;
        let buffer = read_bytes_at(data, &mut offset, size)?.to_vec();
        let bucket_count = read_le_at::<u32>(data, &mut offset)? as usize;
        if bucket_count > data.len().saturating_sub(offset) / 4 {
            return Err(pdb_error!("/names", "{} buckets exceed the stream", bucket_count));
        }
        let mut buckets = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            buckets.push(read_le_at::<u32>(data, &mut offset)?);
        }
        let count = read_le_at::<u32>(data, &mut offset)?;

        Ok(NamesTable {
            buffer,
            buckets,
            count,
        })
    }

    /// The name at buffer offset `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] if `index` is not inside the buffer
    pub fn get(&self, index: u32) -> Result<String> {
        let mut offset = index as usize;
        read_cstring_at(&self.buffer, &mut offset, TextEncoding::Utf8)
            .map_err(|_| pdb_error!("/names", "no name at offset {:#x}", index))
    }

    /// Offset of `name`, found through the hash buckets
    #[must_use]
    pub fn find(&self, name: &str) -> Option<u32> {
        if name.is_empty() {
            return Some(0);
        }

        let count = self.buckets.len();
        let home = hash_v1_bucket(name.as_bytes(), count as u32) as usize;
        for step in 0..count {
            let index = self.buckets[(home + step) % count];
            if index == 0 {
                return None;
            }
            if self.get(index).is_ok_and(|candidate| candidate == name) {
                return Some(index);
            }
        }
        None
    }

    /// Number of names, not counting the empty one
    #[must_use]
    pub fn len(&self) -> u32 {
        self.count
    }

    /// True if the table holds only the empty name
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Collects names while the other streams are written
#[derive(Debug, Clone)]
pub struct NamesBuilder {
    buffer: Vec<u8>,
    offsets: HashMap<String, u32>,
    order: Vec<u32>,
}

impl Default for NamesBuilder {
    fn default() -> Self {
        NamesBuilder {
            buffer: vec![0],
            offsets: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl NamesBuilder {
    /// A builder holding only the empty name
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of `name`, adding it on first use
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for names containing a NUL
    pub fn add(&mut self, name: &str) -> Result<u32> {
        if name.is_empty() {
            return Ok(0);
        }
        if let Some(offset) = self.offsets.get(name) {
            return Ok(*offset);
        }
        if name.contains('\0') {
            return Err(malformed_error!("Name {:?} contains a NUL", name));
        }

        let offset = u32::try_from(self.buffer.len())
            .map_err(|_| malformed_error!("/names buffer exceeds 4 GiB"))?;
        self.buffer.extend_from_slice(name.as_bytes());
        self.buffer.push(0);
        self.offsets.insert(name.to_string(), offset);
        self.order.push(offset);
        Ok(offset)
    }

    /// Serialize the stream
    #[must_use]
    pub fn finish(&self) -> Vec<u8> {
        let count = self.order.len();
        let bucket_count = count * 4 / 3 + 1;
        let mut buckets = vec![0u32; bucket_count];

        for &index in &self.order {
            let end = self.buffer[index as usize..]
                .iter()
                .position(|&b| b == 0)
                .map_or(self.buffer.len(), |len| index as usize + len);
            let name = &self.buffer[index as usize..end];

            let home = hash_v1_bucket(name, bucket_count as u32) as usize;
            if let Some(bucket) = (0..bucket_count)
                .map(|step| (home + step) % bucket_count)
                .find(|&bucket| buckets[bucket] == 0)
            {
                buckets[bucket] = index;
            }
        }

        let mut data = Vec::with_capacity(16 + self.buffer.len() + 4 * bucket_count);
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, NAMES_SIGNATURE);
        write_le_at(&mut data, &mut offset, NAMES_VERSION);
        write_le_at(&mut data, &mut offset, self.buffer.len() as u32);
        write_bytes_at(&mut data, &mut offset, &self.buffer);
        write_le_at(&mut data, &mut offset, bucket_count as u32);
        for bucket in buckets {
            write_le_at(&mut data, &mut offset, bucket);
        }
        write_le_at(&mut data, &mut offset, count as u32);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_find() {
        let mut builder = NamesBuilder::new();
        assert_eq!(builder.add("").unwrap(), 0);
        let program = builder.add("c:\\src\\Program.cs").unwrap();
        let helper = builder.add("c:\\src\\Helper.cs").unwrap();
        assert_eq!(program, 1);
        assert_eq!(builder.add("c:\\src\\Program.cs").unwrap(), program);

        let table = NamesTable::read(&builder.finish()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(helper).unwrap(), "c:\\src\\Helper.cs");
        assert_eq!(table.find("c:\\src\\Program.cs"), Some(program));
        assert_eq!(table.find("c:\\src\\Missing.cs"), None);
        assert_eq!(table.find(""), Some(0));
    }

    #[test]
    fn layout() {
        let data = NamesBuilder::new().finish();
        #[rustfmt::skip]
        assert_eq!(data, [
            0xFE, 0xEF, 0xFE, 0xEF,
            1, 0, 0, 0,
            1, 0, 0, 0, 0,
            1, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0,
        ]);
    }

    #[test]
    fn rejects() {
        assert!(matches!(
            NamesTable::read(&[0, 0, 0, 0, 1, 0, 0, 0]),
            Err(crate::Error::Pdb { .. })
        ));
        assert!(NamesBuilder::new().add("a\0b").is_err());

        let table = NamesTable::read(&NamesBuilder::new().finish()).unwrap();
        assert!(table.get(7).is_err());
    }
}
