//! Narrow/wide index decisions for one tables stream.
//!
//! Every heap offset and table reference in a row is either 2 or 4 bytes wide, depending on
//! the size of the heap or table it points into. [`TableInfo`] captures those decisions once,
//! from the row counts and heap size flags of a tables stream, and answers width queries for
//! any [`ColumnKind`].

use strum::{EnumCount, IntoEnumIterator};

use crate::metadata::{
    tables::{CodedIndexType, ColumnKind, HeapKind},
    token::TableKind,
};

/// Row count of one table and whether references to it need 4 bytes
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// Number of rows
    pub rows: u32,
    /// True if simple indexes into this table are 4 bytes wide
    pub is_large: bool,
}

impl TableRowInfo {
    /// Row information for a table with `rows` rows
    #[must_use]
    pub fn new(rows: u32) -> Self {
        Self {
            rows,
            is_large: rows > u32::from(u16::MAX),
        }
    }
}

/// Width decisions for a complete tables stream
#[derive(Clone, Debug)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    coded_large: Vec<bool>,
    is_large_index_str: bool,
    is_large_index_guid: bool,
    is_large_index_blob: bool,
    is_large_index_us: bool,
}

impl TableInfo {
    /// Build from per-kind row counts (indexed by kind byte) and the heap widths
    #[must_use]
    pub fn new(
        row_counts: &[u32],
        large_str: bool,
        large_guid: bool,
        large_blob: bool,
        large_us: bool,
    ) -> Self {
        let mut rows = vec![TableRowInfo::default(); 256];
        for (kind, count) in row_counts.iter().enumerate().take(256) {
            rows[kind] = TableRowInfo::new(*count);
        }

        let mut info = TableInfo {
            rows,
            coded_large: vec![false; CodedIndexType::COUNT],
            is_large_index_str: large_str,
            is_large_index_guid: large_guid,
            is_large_index_blob: large_blob,
            is_large_index_us: large_us,
        };
        info.calculate_coded_index_widths();
        info
    }

    fn calculate_coded_index_widths(&mut self) {
        for (slot, ci) in CodedIndexType::iter().enumerate() {
            let limit = 1u32 << (16 - ci.tag_bits());
            let rows = &self.rows;
            let large = ci.targets().any(|id| rows[id as usize].rows >= limit);
            self.coded_large[slot] = large;
        }
    }

    /// Row information for `kind`
    #[must_use]
    pub fn get(&self, kind: TableKind) -> &TableRowInfo {
        &self.rows[kind.value() as usize]
    }

    /// True if simple indexes into `kind` are 4 bytes wide
    #[must_use]
    pub fn is_large(&self, kind: TableKind) -> bool {
        self.get(kind).is_large
    }

    /// True if coded indexes of scheme `ci` are 4 bytes wide
    #[must_use]
    pub fn is_large_coded(&self, ci: CodedIndexType) -> bool {
        self.coded_large[ci as usize]
    }

    /// True if offsets into `heap` are 4 bytes wide
    #[must_use]
    pub fn is_large_heap(&self, heap: HeapKind) -> bool {
        match heap {
            HeapKind::String => self.is_large_index_str,
            HeapKind::Guid => self.is_large_index_guid,
            HeapKind::Blob => self.is_large_index_blob,
            HeapKind::UserString => self.is_large_index_us,
        }
    }

    /// On-disk width in bytes of a column of kind `kind`
    #[must_use]
    pub fn column_bytes(&self, kind: ColumnKind) -> usize {
        let large = match kind {
            ColumnKind::Constant(size) => return usize::from(size),
            ColumnKind::Heap(heap) => self.is_large_heap(heap),
            ColumnKind::Table(table) => self.is_large(table),
            ColumnKind::Coded(ci) => self.is_large_coded(ci),
        };

        if large {
            4
        } else {
            2
        }
    }

    /// On-disk width in bytes of a row made of `columns`
    pub fn row_bytes(&self, columns: impl IntoIterator<Item = ColumnKind>) -> usize {
        columns.into_iter().map(|kind| self.column_bytes(kind)).sum()
    }
}
