//! Column descriptors shared by every metadata table.
//!
//! A table is described once as an ordered list of [`Column`]s. Each column names its physical
//! encoding ([`ColumnKind`]) and carries a getter/setter pair that moves the logical value of
//! that column in and out of the row struct as a [`ColumnValue`]. The reader and writer only
//! ever talk to tables through these descriptors, which is what lets caller-defined tables
//! travel the same path as the fixed ones.

use std::fmt;

use uguid::Guid;

use crate::{
    metadata::{
        tables::{CodedIndexType, TableId},
        token::{TableIndex, TableKind},
    },
    Result,
};

/// One of the metadata heaps a column can point into
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum HeapKind {
    /// `#Strings`, zero terminated UTF-8
    String,
    /// `#GUID`, one-based index of 16 byte entries
    Guid,
    /// `#Blob`, length prefixed byte arrays
    Blob,
    /// `#US`, length prefixed UTF-16 strings
    UserString,
}

/// Physical encoding of a column
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ColumnKind {
    /// Fixed size scalar of 1, 2 or 4 bytes
    Constant(u8),
    /// Offset into a heap, 2 or 4 bytes depending on the heap size
    Heap(HeapKind),
    /// One-based row of a single table, 2 or 4 bytes depending on its row count
    Table(TableKind),
    /// Coded index over several tables
    Coded(CodedIndexType),
}

impl ColumnKind {
    /// Shorthand for a simple index column into a fixed table
    #[must_use]
    pub fn table(id: TableId) -> Self {
        ColumnKind::Table(id.into())
    }
}

/// Logical value of one column, after heap and index resolution
#[derive(Clone, PartialEq, Debug)]
pub enum ColumnValue {
    /// Scalar columns, widened to `u32`
    Constant(u32),
    /// `#Strings` and `#US` columns
    String(String),
    /// `#GUID` columns, `None` for index `0`
    Guid(Option<Guid>),
    /// `#Blob` columns
    Blob(Vec<u8>),
    /// Simple and coded table references, `None` for row `0`
    Index(Option<TableIndex>),
}

impl ColumnValue {
    fn kind_name(&self) -> &'static str {
        match self {
            ColumnValue::Constant(_) => "constant",
            ColumnValue::String(_) => "string",
            ColumnValue::Guid(_) => "guid",
            ColumnValue::Blob(_) => "blob",
            ColumnValue::Index(_) => "index",
        }
    }
}

/// The physical form of a row: one raw `u32` per column, in column order.
///
/// Heap columns hold offsets, table columns hold one-based rows and coded columns hold the
/// encoded value. Raw rows only exist while a table stream is being read or written.
pub type RawRow = Vec<u32>;

/// Descriptor of a single column of row type `R`
pub struct Column<R> {
    /// Column name, used in diagnostics
    pub name: &'static str,
    /// Physical encoding
    pub kind: ColumnKind,
    /// Extract the logical value from a row
    pub get: fn(&R) -> ColumnValue,
    /// Store a logical value into a row
    pub set: fn(&mut R, ColumnValue) -> Result<()>,
}

impl<R> Clone for Column<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Column<R> {}

impl<R> fmt::Debug for Column<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Conversion between a row field and its [`ColumnValue`]
pub trait ColumnField: Sized {
    /// Wrap the field value
    fn to_value(&self) -> ColumnValue;

    /// Unwrap a value read from a column
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` has the wrong shape or range
    fn from_value(value: ColumnValue) -> Result<Self>;
}

fn shape_error(expected: &str, value: &ColumnValue) -> crate::Error {
    malformed_error!(
        "Expected a {} column value, got a {} value",
        expected,
        value.kind_name()
    )
}

macro_rules! impl_column_scalar {
    ($($ty:ty),*) => {
        $(
            impl ColumnField for $ty {
                fn to_value(&self) -> ColumnValue {
                    ColumnValue::Constant(u32::from(*self))
                }

                fn from_value(value: ColumnValue) -> Result<Self> {
                    match value {
                        ColumnValue::Constant(raw) => <$ty>::try_from(raw).map_err(|_| {
                            malformed_error!(
                                "Constant {:#x} does not fit {}",
                                raw,
                                stringify!($ty)
                            )
                        }),
                        other => Err(shape_error("constant", &other)),
                    }
                }
            }
        )*
    };
}

impl_column_scalar!(u8, u16, u32);

impl ColumnField for String {
    fn to_value(&self) -> ColumnValue {
        ColumnValue::String(self.clone())
    }

    fn from_value(value: ColumnValue) -> Result<Self> {
        match value {
            ColumnValue::String(s) => Ok(s),
            other => Err(shape_error("string", &other)),
        }
    }
}

impl ColumnField for Vec<u8> {
    fn to_value(&self) -> ColumnValue {
        ColumnValue::Blob(self.clone())
    }

    fn from_value(value: ColumnValue) -> Result<Self> {
        match value {
            ColumnValue::Blob(b) => Ok(b),
            other => Err(shape_error("blob", &other)),
        }
    }
}

impl ColumnField for Option<Guid> {
    fn to_value(&self) -> ColumnValue {
        ColumnValue::Guid(*self)
    }

    fn from_value(value: ColumnValue) -> Result<Self> {
        match value {
            ColumnValue::Guid(g) => Ok(g),
            other => Err(shape_error("guid", &other)),
        }
    }
}

impl ColumnField for Option<TableIndex> {
    fn to_value(&self) -> ColumnValue {
        ColumnValue::Index(*self)
    }

    fn from_value(value: ColumnValue) -> Result<Self> {
        match value {
            ColumnValue::Index(i) => Ok(i),
            other => Err(shape_error("index", &other)),
        }
    }
}

impl ColumnField for TableIndex {
    fn to_value(&self) -> ColumnValue {
        ColumnValue::Index(Some(*self))
    }

    fn from_value(value: ColumnValue) -> Result<Self> {
        match value {
            ColumnValue::Index(Some(i)) => Ok(i),
            ColumnValue::Index(None) => Err(malformed_error!(
                "Required table reference is null"
            )),
            other => Err(shape_error("index", &other)),
        }
    }
}

/// Declares a row struct together with its column descriptors.
///
/// ```ignore
/// metadata_row! {
///     /// A row of the `ModuleRef` table
///     pub struct ModuleRefRow => ModuleRef {
///         /// Module name
///         name: String = ColumnKind::Heap(HeapKind::String),
///     }
/// }
/// ```
///
/// The `=> Table` part implements [`crate::metadata::tables::FixedRow`]; leave it out for rows
/// of additional tables.
#[macro_export]
macro_rules! metadata_row {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident $(=> $table:ident)? {
            $(
                $(#[$fmeta:meta])*
                $field:ident : $ty:ty = $kind:expr
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl $crate::metadata::tables::Row for $name {
            fn columns() -> Vec<$crate::metadata::tables::Column<Self>> {
                vec![
                    $(
                        $crate::metadata::tables::Column {
                            name: stringify!($field),
                            kind: $kind,
                            get: |row: &$name| {
                                $crate::metadata::tables::ColumnField::to_value(&row.$field)
                            },
                            set: |row: &mut $name, value| {
                                row.$field =
                                    $crate::metadata::tables::ColumnField::from_value(value)?;
                                Ok(())
                            },
                        },
                    )*
                ]
            }
        }

        $(
            impl $crate::metadata::tables::FixedRow for $name {
                const TABLE: $crate::metadata::tables::TableId =
                    $crate::metadata::tables::TableId::$table;
            }
        )?
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_range() {
        assert_eq!(u16::from_value(ColumnValue::Constant(0xFFFF)).unwrap(), 0xFFFF);
        assert!(u16::from_value(ColumnValue::Constant(0x1_0000)).is_err());
        assert!(u8::from_value(ColumnValue::String(String::new())).is_err());
    }

    #[test]
    fn required_index() {
        assert!(TableIndex::from_value(ColumnValue::Index(None)).is_err());
        let idx = TableIndex::new(TableId::Field, 3).unwrap();
        assert_eq!(TableIndex::from_value(idx.to_value()).unwrap(), idx);
        assert_eq!(
            Option::<TableIndex>::from_value(ColumnValue::Index(None)).unwrap(),
            None
        );
    }

    #[test]
    fn heap_values() {
        assert_eq!(
            String::from_value(ColumnValue::String("Foo".into())).unwrap(),
            "Foo"
        );
        assert_eq!(Vec::<u8>::from_value(ColumnValue::Blob(vec![1])).unwrap(), vec![1]);
        assert!(Vec::<u8>::from_value(ColumnValue::Guid(None)).is_err());
        assert_eq!(Option::<Guid>::from_value(ColumnValue::Guid(None)).unwrap(), None);
    }
}
