//! The serialized open-addressing hash table of the PDB container.
//!
//! On disk the table is its entry count, its bucket count, a `present` and a `deleted` bit
//! vector, and then one key/value pair per present bucket in bucket order. The named stream
//! map and the `/src/headerblock` table both use this layout and differ only in how keys are
//! hashed and when the table grows.

use crate::{
    file::{
        bitset::BitSet,
        io::{read_le_at, write_le_at},
    },
    Result,
};

/// A fixed-size value stored next to each key
pub(crate) trait HashValue: Sized {
    /// Read one value
    fn read(data: &[u8], offset: &mut usize) -> Result<Self>;

    /// Write one value
    fn write(&self, buffer: &mut Vec<u8>, offset: &mut usize);
}

impl HashValue for u32 {
    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        read_le_at::<u32>(data, offset)
    }

    fn write(&self, buffer: &mut Vec<u8>, offset: &mut usize) {
        write_le_at(buffer, offset, *self);
    }
}

/// When the table doubles its bucket count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Growth {
    /// Keep the load at or below two thirds
    LoadFactor,
    /// Only when no free bucket is left
    WhenFull,
}

/// Buckets with linear searching, keyed by `u32`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HashTable<V> {
    buckets: Vec<Option<(u32, V)>>,
    len: usize,
    growth: Growth,
}

impl<V: HashValue> HashTable<V> {
    /// An empty table of `capacity` buckets
    pub fn new(capacity: usize, growth: Growth) -> Self {
        HashTable {
            buckets: (0..capacity.max(1)).map(|_| None).collect(),
            len: 0,
            growth,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of buckets
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Entries in bucket order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &V)> {
        self.buckets
            .iter()
            .filter_map(|bucket| bucket.as_ref().map(|(key, value)| (*key, value)))
    }

    /// Bucket index of `key`, or of the free bucket it would go to
    fn locate(&self, key: u32, hash: &impl Fn(u32) -> u32) -> Option<usize> {
        let capacity = self.buckets.len();
        let home = hash(key) as usize % capacity;

        (0..capacity)
            .map(|step| (home + step) % capacity)
            .find(|&bucket| match &self.buckets[bucket] {
                None => true,
                Some((existing, _)) => *existing == key,
            })
    }

    /// Look `key` up
    pub fn get(&self, key: u32, hash: &impl Fn(u32) -> u32) -> Option<&V> {
        let bucket = self.locate(key, hash)?;
        self.buckets[bucket].as_ref().map(|(_, value)| value)
    }

    /// Insert or replace the value of `key`, growing and rehashing as the growth rule asks
    pub fn insert(&mut self, key: u32, value: V, hash: &impl Fn(u32) -> u32) {
        if let Some(bucket) = self.locate(key, hash) {
            if let Some((_, existing)) = &mut self.buckets[bucket] {
                *existing = value;
                return;
            }
        }

        let needs_growth = match self.growth {
            Growth::LoadFactor => (self.len + 1) * 3 > self.buckets.len() * 2,
            Growth::WhenFull => self.len == self.buckets.len(),
        };
        if needs_growth {
            self.rehash(self.buckets.len() * 2, hash);
        }

        if let Some(bucket) = self.locate(key, hash) {
            self.buckets[bucket] = Some((key, value));
            self.len += 1;
        }
    }

    fn rehash(&mut self, capacity: usize, hash: &impl Fn(u32) -> u32) {
        let old = std::mem::replace(
            &mut self.buckets,
            (0..capacity).map(|_| None).collect(),
        );
        self.len = 0;
        for (key, value) in old.into_iter().flatten() {
            if let Some(bucket) = self.locate(key, hash) {
                self.buckets[bucket] = Some((key, value));
                self.len += 1;
            }
        }
    }

    /// Read a serialized table
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] naming `stream` if the counts and bit vectors disagree
    pub fn read(data: &[u8], offset: &mut usize, growth: Growth, stream: &str) -> Result<Self> {
        let size = read_le_at::<u32>(data, offset)? as usize;
        let capacity = read_le_at::<u32>(data, offset)? as usize;
        let present = BitSet::read_counted(data, offset)?;
        let deleted = BitSet::read_counted(data, offset)?;

        if present.count() != size {
            return Err(pdb_error!(
                stream,
                "hash table declares {} entries but marks {} buckets present",
                size,
                present.count()
            ));
        }
        if capacity == 0 || present.iter().any(|bucket| bucket >= capacity) {
            return Err(pdb_error!(
                stream,
                "hash table of {} buckets marks a bucket beyond its end present",
                capacity
            ));
        }
        if !deleted.is_empty() {
            log::trace!("{}: ignoring {} deleted buckets", stream, deleted.count());
        }

        let mut table = HashTable {
            buckets: (0..capacity).map(|_| None).collect(),
            len: size,
            growth,
        };
        for bucket in present.iter() {
            let key = read_le_at::<u32>(data, offset)?;
            table.buckets[bucket] = Some((key, V::read(data, offset)?));
        }

        Ok(table)
    }

    /// Write the serialized table
    pub fn write(&self, buffer: &mut Vec<u8>, offset: &mut usize) {
        let mut present = BitSet::new(self.buckets.len());
        for (bucket, entry) in self.buckets.iter().enumerate() {
            if entry.is_some() {
                present.insert(bucket);
            }
        }

        write_le_at(buffer, offset, self.len as u32);
        write_le_at(buffer, offset, self.buckets.len() as u32);
        present.write_counted(buffer, offset);
        BitSet::default().write_counted(buffer, offset);

        for (key, value) in self.iter() {
            write_le_at(buffer, offset, key);
            value.write(buffer, offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(key: u32) -> u32 {
        key
    }

    #[test]
    fn grows_when_full() {
        let mut table = HashTable::<u32>::new(2, Growth::WhenFull);
        table.insert(4, 40, &identity);
        table.insert(6, 60, &identity);
        assert_eq!(table.capacity(), 2);

        // 4 and 6 both want bucket 0 in two buckets; the third key forces a rehash into four
        table.insert(5, 50, &identity);
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.iter().map(|(key, _)| key).collect::<Vec<_>>(),
            vec![4, 5, 6]
        );
        assert_eq!(table.get(6, &identity), Some(&60));
        assert_eq!(table.get(7, &identity), None);
    }

    #[test]
    fn load_factor_and_replace() {
        let mut table = HashTable::<u32>::new(3, Growth::LoadFactor);
        table.insert(1, 10, &identity);
        table.insert(2, 20, &identity);
        assert_eq!(table.capacity(), 3);
        table.insert(3, 30, &identity);
        assert_eq!(table.capacity(), 6);

        table.insert(2, 21, &identity);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(2, &identity), Some(&21));
    }

    #[test]
    fn serialized_layout() {
        let mut table = HashTable::<u32>::new(4, Growth::WhenFull);
        table.insert(2, 7, &identity);

        let mut buffer = Vec::new();
        table.write(&mut buffer, &mut 0);
        #[rustfmt::skip]
        assert_eq!(buffer, [
            1, 0, 0, 0,             // size
            4, 0, 0, 0,             // capacity
            1, 0, 0, 0, 4, 0, 0, 0, // present = { 2 }
            0, 0, 0, 0,             // deleted = {}
            2, 0, 0, 0, 7, 0, 0, 0, // 2 => 7
        ]);

        let read = HashTable::<u32>::read(&buffer, &mut 0, Growth::WhenFull, "test").unwrap();
        assert_eq!(read, table);
    }

    #[test]
    fn inconsistent() {
        // two entries declared, one present
        let data = [2, 0, 0, 0, 4, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0];
        assert!(matches!(
            HashTable::<u32>::read(&data, &mut 0, Growth::WhenFull, "test"),
            Err(crate::Error::Pdb { .. })
        ));
    }
}
