//! Typed row storage and the object safe view the codec works with.

use std::{any::Any, fmt};

use crate::{
    metadata::{
        tables::{Column, ColumnKind, ColumnValue, TableId},
        token::{TableIndex, TableKind, MAX_ROW},
    },
    Error, Result,
};

/// A row type, described by its columns.
///
/// Implemented by the [`crate::metadata_row`] macro for all fixed tables; implement it (or use
/// the macro) for the row type of an additional table.
pub trait Row: Clone + PartialEq + Default + fmt::Debug + Send + Sync + 'static {
    /// Column descriptors in on-disk order
    fn columns() -> Vec<Column<Self>>;
}

/// A row type of one of the fixed ECMA-335 tables
pub trait FixedRow: Row {
    /// The table this row belongs to
    const TABLE: TableId;
}

/// An ordered, growable collection of rows of type `R`
#[derive(Clone, Debug)]
pub struct MetadataTable<R: Row> {
    kind: TableKind,
    sort_key: Option<usize>,
    columns: Vec<Column<R>>,
    rows: Vec<R>,
}

impl<R: Row> MetadataTable<R> {
    /// Create an empty table of kind `kind`
    #[must_use]
    pub fn new(kind: TableKind) -> Self {
        MetadataTable {
            kind,
            sort_key: None,
            columns: R::columns(),
            rows: Vec::new(),
        }
    }

    /// Create an empty table that the writer keeps sorted by column `key`
    #[must_use]
    pub fn with_sort_key(kind: TableKind, key: usize) -> Self {
        MetadataTable {
            sort_key: Some(key),
            ..Self::new(kind)
        }
    }

    /// The column descriptors
    #[must_use]
    pub fn columns(&self) -> &[Column<R>] {
        &self.columns
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows
    #[must_use]
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    /// Mutable access to the row collection, for whole-table replacement or filtering
    pub fn rows_mut(&mut self) -> &mut Vec<R> {
        &mut self.rows
    }

    /// Iterate over the rows
    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.rows.iter()
    }

    /// Row at zero-based position `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&R> {
        self.rows.get(index)
    }

    /// Row referenced by `index`, which must point into this table
    #[must_use]
    pub fn get_by_index(&self, index: TableIndex) -> Option<&R> {
        if index.kind() != self.kind {
            return None;
        }
        self.rows.get(index.row())
    }

    /// Mutable row at zero-based position `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut R> {
        self.rows.get_mut(index)
    }

    /// Append a row and return its index
    ///
    /// # Errors
    /// Returns [`crate::Error::CapacityExceeded`] if the table is full
    pub fn push(&mut self, row: R) -> Result<TableIndex> {
        let index = TableIndex::from_usize(self.kind, self.rows.len())?;
        self.rows.push(row);
        Ok(index)
    }

    /// Index the next pushed row will get
    ///
    /// # Errors
    /// Returns [`crate::Error::CapacityExceeded`] if the table is full
    pub fn next_index(&self) -> Result<TableIndex> {
        TableIndex::from_usize(self.kind, self.rows.len())
    }
}

impl<R: Row> PartialEq for MetadataTable<R> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.rows == other.rows
    }
}

/// Object safe view of a table, used for kind-driven dispatch by the codec.
pub trait Table: Any + Send + Sync + fmt::Debug {
    /// Kind of this table
    fn kind(&self) -> TableKind;

    /// Number of rows
    fn len(&self) -> usize;

    /// True if the table has no rows
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical encodings of the columns
    fn column_kinds(&self) -> Vec<ColumnKind>;

    /// Column names, for diagnostics
    fn column_names(&self) -> Vec<&'static str>;

    /// Column the writer sorts this table by, if any
    fn sort_key(&self) -> Option<usize>;

    /// Logical values of row `index`
    fn row_values(&self, index: usize) -> Option<Vec<ColumnValue>>;

    /// Append a row built from logical values
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the values do not match the columns, or
    /// [`crate::Error::CapacityExceeded`] if the table is full
    fn push_values(&mut self, values: Vec<ColumnValue>) -> Result<()>;

    /// Remove all rows
    fn clear(&mut self);

    /// Row by row equality with another table of the same row type
    fn table_eq(&self, other: &dyn Table) -> bool;

    /// Clone into a new box
    fn clone_box(&self) -> Box<dyn Table>;

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<R: Row> Table for MetadataTable<R> {
    fn kind(&self) -> TableKind {
        self.kind
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn column_kinds(&self) -> Vec<ColumnKind> {
        self.columns.iter().map(|c| c.kind).collect()
    }

    fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    fn sort_key(&self) -> Option<usize> {
        self.sort_key
    }

    fn row_values(&self, index: usize) -> Option<Vec<ColumnValue>> {
        let row = self.rows.get(index)?;
        Some(self.columns.iter().map(|c| (c.get)(row)).collect())
    }

    fn push_values(&mut self, values: Vec<ColumnValue>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(malformed_error!(
                "Table {} expects {} columns, got {}",
                self.kind,
                self.columns.len(),
                values.len()
            ));
        }
        if self.rows.len() > MAX_ROW as usize {
            return Err(Error::CapacityExceeded {
                table: self.kind.value(),
                rows: self.rows.len() + 1,
            });
        }

        let mut row = R::default();
        for (column, value) in self.columns.iter().zip(values) {
            (column.set)(&mut row, value).map_err(|error| match error {
                Error::Malformed { message, .. } => malformed_error!(
                    "Table {} column '{}' - {}",
                    self.kind,
                    column.name,
                    message
                ),
                other => other,
            })?;
        }

        self.rows.push(row);
        Ok(())
    }

    fn clear(&mut self) {
        self.rows.clear();
    }

    fn table_eq(&self, other: &dyn Table) -> bool {
        other
            .as_any()
            .downcast_ref::<MetadataTable<R>>()
            .is_some_and(|other| self == other)
    }

    fn clone_box(&self) -> Box<dyn Table> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Clone for Box<dyn Table> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::{HeapKind, ModuleRefRow};

    #[test]
    fn push_and_lookup() {
        let mut table = MetadataTable::<ModuleRefRow>::new(TableId::ModuleRef.into());
        let index = table
            .push(ModuleRefRow {
                name: "kernel32.dll".into(),
            })
            .unwrap();
        assert_eq!(index.index(), 0);
        assert_eq!(table.next_index().unwrap().index(), 1);
        assert_eq!(table.get_by_index(index).unwrap().name, "kernel32.dll");

        let foreign = TableIndex::new(TableId::TypeRef, 0).unwrap();
        assert!(table.get_by_index(foreign).is_none());
    }

    #[test]
    fn dynamic_view() {
        let mut table: Box<dyn Table> =
            Box::new(MetadataTable::<ModuleRefRow>::new(TableId::ModuleRef.into()));
        assert_eq!(table.column_kinds(), vec![ColumnKind::Heap(HeapKind::String)]);
        assert_eq!(table.column_names(), vec!["name"]);

        table
            .push_values(vec![ColumnValue::String("user32.dll".into())])
            .unwrap();
        assert_eq!(
            table.row_values(0),
            Some(vec![ColumnValue::String("user32.dll".into())])
        );
        assert!(table.row_values(1).is_none());

        assert!(table.push_values(vec![]).is_err());
        let error = table
            .push_values(vec![ColumnValue::Constant(1)])
            .unwrap_err();
        assert!(error.to_string().contains("'name'"));

        let copy = table.clone();
        assert!(copy.table_eq(table.as_ref()));
        table.clear();
        assert!(table.is_empty());
        assert!(!copy.table_eq(table.as_ref()));
    }
}
