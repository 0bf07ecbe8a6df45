//! The name hash of the PDB container.
//!
//! It must match the reference tooling bit for bit: debuggers look names up in tables that
//! were bucketed by it.

use crate::file::io::read_le;

/// Hash of a name as used by the global symbol index, the `/names` table and the named
/// stream map (`LHashPbCb`).
///
/// The name is XOR-folded as little-endian 32-bit words, followed by a 16-bit and an 8-bit
/// tail. Setting `0x2020_2020` folds ASCII case, two shifts mix the high bits down.
#[must_use]
pub fn hash_v1(name: &[u8]) -> u32 {
    let mut hash = 0u32;

    let mut words = name.chunks_exact(4);
    for word in words.by_ref() {
        hash ^= read_le::<u32>(word).unwrap_or_default();
    }

    let mut tail = words.remainder();
    if tail.len() >= 2 {
        hash ^= u32::from(read_le::<u16>(tail).unwrap_or_default());
        tail = &tail[2..];
    }
    if let Some(&byte) = tail.first() {
        hash ^= u32::from(byte);
    }

    hash |= 0x2020_2020;
    hash ^= hash >> 11;
    hash ^ (hash >> 16)
}

/// Bucket of `name` in a table of `modulus` buckets
#[must_use]
pub fn hash_v1_bucket(name: &[u8], modulus: u32) -> u32 {
    if modulus == 0 {
        return 0;
    }
    hash_v1(name) % modulus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_values() {
        assert_eq!(hash_v1(b"Program.Main"), 0x276f_b86e);
        assert_eq!(hash_v1_bucket(b"Program.Main", 4096), 2158);

        assert_eq!(hash_v1(b"main"), 0x6e64_c225);
        assert_eq!(hash_v1(b"<Module>"), 0x7a25_1e08);
        assert_eq!(hash_v1(b"System.Console.WriteLine"), 0x2f3f_f753);
        assert_eq!(hash_v1(b"a"), 0x2024_0441);
        assert_eq!(hash_v1(b""), 0x2024_0400);
    }

    #[test]
    fn case_folding() {
        assert_eq!(hash_v1(b"MAIN"), hash_v1(b"main"));
        assert_ne!(hash_v1(b"main1"), hash_v1(b"main"));
    }

    #[test]
    fn buckets() {
        assert_eq!(hash_v1_bucket(b"main", 0), 0);
        assert_eq!(hash_v1_bucket(b"main", 1), 0);
    }
}
