//! Growable bit vector stored as little-endian `u32` words.
//!
//! PDB hash tables serialize their `present` and `deleted` sets in exactly this layout (a word
//! count followed by the words), and the MSF free page map is the same bit vector spread over a
//! page. Keeping the word size at 32 bits means the in-memory representation can be written
//! back without any conversion.

use crate::{
    file::io::{read_le_at, write_le_at},
    Result,
};

/// A bit vector backed by `u32` words.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u32>,
}

impl BitSet {
    /// Create a set able to hold at least `capacity` bits, all cleared
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(32)],
        }
    }

    /// Number of bits the set can currently address without growing
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.words.len() * 32
    }

    /// Number of backing words
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// The raw backing words
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Set bit `index`, growing the set if required
    pub fn insert(&mut self, index: usize) {
        let word = index / 32;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u32 << (index % 32);
    }

    /// Clear bit `index`
    pub fn remove(&mut self, index: usize) {
        if let Some(word) = self.words.get_mut(index / 32) {
            *word &= !(1u32 << (index % 32));
        }
    }

    /// Test bit `index`; bits beyond the capacity read as cleared
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / 32)
            .is_some_and(|word| word & (1u32 << (index % 32)) != 0)
    }

    /// Number of set bits
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True if no bit is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Set every bit in `start..end`
    pub fn insert_range(&mut self, start: usize, end: usize) {
        for index in start..end {
            self.insert(index);
        }
    }

    /// Iterate over the indices of all set bits in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            (0..32)
                .filter(move |bit| word & (1u32 << bit) != 0)
                .map(move |bit| word_index * 32 + bit)
        })
    }

    /// Read a set stored as `u32 word_count` followed by the words
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data
    pub fn read_counted(data: &[u8], offset: &mut usize) -> Result<Self> {
        let count = read_le_at::<u32>(data, offset)? as usize;
        Self::read_words(data, offset, count)
    }

    /// Read `count` raw words
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data
    pub fn read_words(data: &[u8], offset: &mut usize, count: usize) -> Result<Self> {
        if count.saturating_mul(4) > data.len().saturating_sub(*offset) {
            return Err(crate::Error::OutOfBounds);
        }

        let mut words = Vec::with_capacity(count);
        for _ in 0..count {
            words.push(read_le_at::<u32>(data, offset)?);
        }
        Ok(Self { words })
    }

    /// Write the set as `u32 word_count` followed by the words, dropping trailing zero words
    pub fn write_counted(&self, buffer: &mut Vec<u8>, offset: &mut usize) {
        let used = self
            .words
            .iter()
            .rposition(|&w| w != 0)
            .map_or(0, |last| last + 1);
        write_le_at(buffer, offset, used as u32);
        for word in &self.words[..used] {
            write_le_at(buffer, offset, *word);
        }
    }

    /// Write all backing words without a count
    pub fn write_words(&self, buffer: &mut Vec<u8>, offset: &mut usize) {
        for word in &self.words {
            write_le_at(buffer, offset, *word);
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_grow() {
        let mut set = BitSet::new(8);
        assert_eq!(set.capacity(), 32);
        set.insert(3);
        set.insert(70);
        assert_eq!(set.word_count(), 3);
        assert!(set.contains(3));
        assert!(set.contains(70));
        assert!(!set.contains(4));
        assert!(!set.contains(1000));
        assert_eq!(set.count(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 70]);

        set.remove(3);
        assert!(!set.contains(3));
        set.remove(5000);
    }

    #[test]
    fn counted_layout() {
        let mut set = BitSet::new(96);
        set.insert(0);
        set.insert(33);

        let mut buffer = Vec::new();
        let mut offset = 0;
        set.write_counted(&mut buffer, &mut offset);
        assert_eq!(buffer, [2, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0]);

        let read = BitSet::read_counted(&buffer, &mut 0).unwrap();
        assert_eq!(read.iter().collect::<Vec<_>>(), vec![0, 33]);
    }

    #[test]
    fn empty_counted() {
        let set = BitSet::new(64);
        let mut buffer = Vec::new();
        set.write_counted(&mut buffer, &mut 0);
        assert_eq!(buffer, [0, 0, 0, 0]);
        assert!(BitSet::read_counted(&buffer, &mut 0).unwrap().is_empty());
    }

    #[test]
    fn truncated_words() {
        assert!(BitSet::read_counted(&[5, 0, 0, 0, 1], &mut 0).is_err());
    }

    #[test]
    fn range() {
        let mut set = BitSet::default();
        set.insert_range(30, 35);
        assert_eq!(set.count(), 5);
        assert!(set.contains(34));
        assert!(!set.contains(35));
    }
}
