//! Options for reading PDB files.

/// Options for [`crate::pdb::PdbFile::read`]
///
/// # Examples
///
/// ```rust
/// use dotcodec::pdb::PdbReadOptions;
///
/// assert!(!PdbReadOptions::default().strict);
/// assert!(PdbReadOptions::strict().strict);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PdbReadOptions {
    /// Fail on symbol records, OEM records and source references the reader does not
    /// understand. When off they are skipped by their declared length and logged at `debug`
    pub strict: bool,

    /// Load embedded source content from the `/src/files/` streams
    pub load_source_content: bool,
}

impl Default for PdbReadOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl PdbReadOptions {
    /// Fail on anything unrecognized
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict: true,
            load_source_content: true,
        }
    }

    /// Skip anything unrecognized
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            strict: false,
            load_source_content: true,
        }
    }
}
