//! Options for reading and writing metadata.

use crate::metadata::tables::TableRegistration;

/// Options for [`crate::metadata::read_module`]
///
/// # Examples
///
/// ```rust
/// use dotcodec::metadata::ReadOptions;
///
/// let options = ReadOptions::strict();
/// assert!(options.validate_coded_targets);
/// assert!(options.additional_tables.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// Additional tables the input may contain. A table in the input whose kind is neither
    /// fixed nor registered here makes the read fail
    pub additional_tables: Vec<TableRegistration>,

    /// Check that every decoded table reference points at an existing row of its target table
    pub validate_coded_targets: bool,

    /// Decode every `#US` entry while reading and fail on the first malformed one; otherwise
    /// the heap is kept as bytes and entries are decoded on lookup
    pub resolve_user_strings: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            additional_tables: Vec::new(),
            validate_coded_targets: false,
            resolve_user_strings: false,
        }
    }
}

impl ReadOptions {
    /// All checks enabled
    #[must_use]
    pub fn strict() -> Self {
        Self {
            additional_tables: Vec::new(),
            validate_coded_targets: true,
            resolve_user_strings: true,
        }
    }

    /// Default checks, with `registrations` as the additional tables
    #[must_use]
    pub fn with_tables(registrations: &[TableRegistration]) -> Self {
        Self {
            additional_tables: registrations.to_vec(),
            ..Self::default()
        }
    }
}

/// Options for [`crate::metadata::write_module`]
#[derive(Clone, Debug)]
pub struct WriteOptions {
    /// Reorder keyed tables by their key column and remap references into them. When off,
    /// rows are written in their current order and the `sorted` vector is left empty
    pub sort_keyed_tables: bool,

    /// Always use 4 byte `#Strings` offsets
    pub force_large_string_index: bool,

    /// Always use 4 byte `#GUID` indexes
    pub force_large_guid_index: bool,

    /// Always use 4 byte `#Blob` offsets
    pub force_large_blob_index: bool,

    /// Runtime version string to write instead of the module's own
    pub metadata_version: Option<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            sort_keyed_tables: true,
            force_large_string_index: false,
            force_large_guid_index: false,
            force_large_blob_index: false,
            metadata_version: None,
        }
    }
}

impl WriteOptions {
    /// Keep every table in its current row order
    #[must_use]
    pub fn preserve_order() -> Self {
        Self {
            sort_keyed_tables: false,
            ..Self::default()
        }
    }

    /// Use 4 byte offsets for every heap, regardless of heap sizes
    #[must_use]
    pub fn large_indexes() -> Self {
        Self {
            force_large_string_index: true,
            force_large_guid_index: true,
            force_large_blob_index: true,
            ..Self::default()
        }
    }
}
