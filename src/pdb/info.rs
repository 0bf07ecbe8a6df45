//! The PDB info stream (stream 1).
//!
//! Identifies the PDB (signature, age, GUID) and names the streams that have no fixed index.

use uguid::Guid;

use crate::{
    file::io::{read_guid_at, read_le_at, write_guid_at, write_le_at},
    pdb::namemap::NamedStreamMap,
    Result,
};

/// Version written to the info stream (VC70)
pub const PDB_INFO_VERSION: u32 = 20000404;

/// Feature code of PDBs written by VC140 tooling
pub const FEATURE_VC140: u32 = 20140508;

/// Contents of the info stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbInfo {
    /// Format version
    pub version: u32,
    /// Timestamp signature
    pub signature: u32,
    /// Incremented each time the PDB is rewritten
    pub age: u32,
    /// Matches the debug directory of the image
    pub guid: Guid,
    /// Streams by name
    pub named_streams: NamedStreamMap,
    /// Trailing feature codes
    pub features: Vec<u32>,
}

impl PdbInfo {
    /// Info for a new PDB
    #[must_use]
    pub fn new(guid: Guid, age: u32, signature: u32) -> Self {
        PdbInfo {
            version: PDB_INFO_VERSION,
            signature,
            age,
            guid,
            named_streams: NamedStreamMap::new(),
            features: Vec::new(),
        }
    }

    /// Parse the stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] for versions older than VC70 or a broken name map
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let version = read_le_at::<u32>(data, &mut offset)?;
        if version < PDB_INFO_VERSION {
            return Err(pdb_error!("PDB", "unsupported info stream version {}", version));
        }
        let signature = read_le_at::<u32>(data, &mut offset)?;
        let age = read_le_at::<u32>(data, &mut offset)?;
        let guid = read_guid_at(data, &mut offset)?;
        let named_streams = NamedStreamMap::read(data, &mut offset)?;

        // the map is followed by a zero "niMac" word, then the feature codes
        let mut features = Vec::new();
        if offset + 4 <= data.len() {
            let _ni_mac = read_le_at::<u32>(data, &mut offset)?;
        }
        while offset + 4 <= data.len() {
            features.push(read_le_at::<u32>(data, &mut offset)?);
        }

        Ok(PdbInfo {
            version,
            signature,
            age,
            guid,
            named_streams,
            features,
        })
    }

    /// Serialize the stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a stream name can not be stored
    pub fn write(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, self.version);
        write_le_at(&mut data, &mut offset, self.signature);
        write_le_at(&mut data, &mut offset, self.age);
        write_guid_at(&mut data, &mut offset, &self.guid);
        self.named_streams.write(&mut data, &mut offset)?;
        write_le_at(&mut data, &mut offset, 0u32);
        for feature in &self.features {
            write_le_at(&mut data, &mut offset, *feature);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uguid::guid;

    #[test]
    fn round_trip() {
        let mut info = PdbInfo::new(guid!("01234567-89ab-cdef-0123-456789abcdef"), 3, 0x5F00_0000);
        info.named_streams.insert("/names", 7);
        info.features.push(FEATURE_VC140);

        let data = info.write().unwrap();
        assert_eq!(&data[..4], &PDB_INFO_VERSION.to_le_bytes());
        assert_eq!(&data[12..16], &[0x67, 0x45, 0x23, 0x01]);
        assert_eq!(PdbInfo::read(&data).unwrap(), info);
    }

    #[test]
    fn old_version() {
        let mut data = PdbInfo::new(Guid::ZERO, 1, 0).write().unwrap();
        data[..4].copy_from_slice(&19970604u32.to_le_bytes());
        assert!(matches!(PdbInfo::read(&data), Err(crate::Error::Pdb { .. })));
    }
}
