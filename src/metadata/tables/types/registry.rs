//! Registrations of caller-defined additional tables.
//!
//! An additional table is any table with a kind above [`TableKind::LAST_FIXED`]. It is
//! described entirely by its row type: the columns come from [`Row::columns`], equality from the
//! row's `PartialEq`. Registering it with a module makes the reader, the writer and module
//! equality treat it exactly like a fixed table.
//!
//! # Examples
//!
//! ```rust
//! use dotcodec::metadata::tables::{ColumnKind, HeapKind, TableRegistration};
//! use dotcodec::metadata::Module;
//!
//! dotcodec::metadata_row! {
//!     /// Build information attached to a module
//!     pub struct BuildInfoRow {
//!         /// Build number
//!         build: u32 = ColumnKind::Constant(4),
//!         /// Name of the producing tool
//!         tool: String = ColumnKind::Heap(HeapKind::String),
//!     }
//! }
//!
//! let registration = TableRegistration::new::<BuildInfoRow>(0x2D)?;
//! let module = Module::with_tables(&[registration])?;
//! assert!(module.get_additional_table(0x2D).is_some());
//! # Ok::<(), dotcodec::Error>(())
//! ```

use std::fmt;

use crate::{
    metadata::{
        tables::{MetadataTable, Row, Table},
        token::TableKind,
    },
    Error, Result,
};

/// Describes one additional table to a [`crate::metadata::Module`]
#[derive(Clone, Copy)]
pub struct TableRegistration {
    kind: TableKind,
    sort_key: Option<usize>,
    factory: fn(TableKind, Option<usize>) -> Box<dyn Table>,
}

fn create_table<R: Row>(kind: TableKind, sort_key: Option<usize>) -> Box<dyn Table> {
    match sort_key {
        Some(key) => Box::new(MetadataTable::<R>::with_sort_key(kind, key)),
        None => Box::new(MetadataTable::<R>::new(kind)),
    }
}

impl TableRegistration {
    /// Register row type `R` as table `kind`
    ///
    /// # Errors
    /// Returns [`crate::Error::TableKindCollision`] if `kind` belongs to a fixed table
    pub fn new<R: Row>(kind: u8) -> Result<Self> {
        let kind = TableKind(kind);
        if kind.is_fixed() {
            return Err(Error::TableKindCollision(kind.value()));
        }

        Ok(TableRegistration {
            kind,
            sort_key: None,
            factory: create_table::<R>,
        })
    }

    /// Register row type `R` as table `kind`, kept sorted by column `key_column` on write
    ///
    /// The key column takes part in the sorted-by-parent invariant just like the keyed fixed
    /// tables: rows are ordered by the encoded key value and references into the table are
    /// remapped.
    ///
    /// # Errors
    /// Returns [`crate::Error::TableKindCollision`] for a fixed kind, or
    /// [`crate::Error::Malformed`] if `key_column` does not exist
    pub fn sorted<R: Row>(kind: u8, key_column: usize) -> Result<Self> {
        let columns = R::columns().len();
        if key_column >= columns {
            return Err(malformed_error!(
                "Sort key column {} is out of range, the row has {} columns",
                key_column,
                columns
            ));
        }

        Ok(TableRegistration {
            sort_key: Some(key_column),
            ..Self::new::<R>(kind)?
        })
    }

    /// The registered kind
    #[must_use]
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Sort key column, if the table is kept sorted
    #[must_use]
    pub fn sort_key(&self) -> Option<usize> {
        self.sort_key
    }

    /// Create an empty table for this registration
    #[must_use]
    pub fn create(&self) -> Box<dyn Table> {
        (self.factory)(self.kind, self.sort_key)
    }
}

impl fmt::Debug for TableRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRegistration")
            .field("kind", &self.kind)
            .field("sort_key", &self.sort_key)
            .finish()
    }
}
