//! The column-schema engine: table kinds, column descriptors, width decisions and storage.
//!
//! Every table, fixed or additional, is a [`MetadataTable`] of some [`Row`] type. The row type
//! describes its columns once ([`Column`]); the reader and writer in [`crate::metadata`] drive
//! every table through those descriptors and the object safe [`Table`] view, so no table has a
//! hand-written codec.
//!
//! # Key Components
//!
//! - [`TableId`] - The fixed ECMA-335 tables
//! - [`CodedIndexType`] - Coded index schemes and their tag encoding
//! - [`ColumnKind`] / [`ColumnValue`] / [`Column`] - Column descriptors
//! - [`TableInfo`] - Narrow/wide decisions derived from row counts and heap sizes
//! - [`MetadataTable`] / [`Table`] - Row storage and its dynamic view
//! - [`TableRegistration`] - Caller-defined additional tables

mod codedindex;
mod column;
mod registry;
mod table;
mod tableid;
mod tableinfo;

pub use codedindex::{CodedIndexType, CodedIndexTypeIter};
pub use column::{Column, ColumnField, ColumnKind, ColumnValue, HeapKind, RawRow};
pub use registry::TableRegistration;
pub use table::{FixedRow, MetadataTable, Row, Table};
pub use tableid::{TableId, TableIdIter};
pub use tableinfo::{TableInfo, TableRowInfo};
