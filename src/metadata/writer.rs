//! Serialization of a [`Module`] into a metadata blob.
//!
//! The writer never touches the caller's module. It snapshots every table as logical
//! [`ColumnValue`] rows, re-establishes the order of keyed tables on the snapshot, interns heap
//! values, and only then knows the final heap sizes and row counts that decide every column
//! width. Raw rows are encoded last and emitted in ascending kind order.

use std::io::Write;

use crate::{
    file::io::{pad_to, write_bytes_at, write_le_at, write_le_at_dyn},
    metadata::{
        module::Module,
        options::WriteOptions,
        root::Root,
        streams::{
            BlobBuilder, GuidBuilder, HeapSizes, StreamHeader, StringsBuilder, TablesHeader,
            UserStrings, EXTENSION_BIT,
        },
        tables::{ColumnKind, ColumnValue, HeapKind, RawRow, TableInfo},
        token::{TableIndex, TableKind, MAX_ROW},
    },
    Error, Result,
};

/// Keyed tables depend on each other through references, so a permutation of one table can
/// change the keys of another. Passes repeat until no table moves.
const MAX_SORT_PASSES: usize = 8;

/// Logical snapshot of one table
struct TableSnapshot {
    kind: TableKind,
    columns: Vec<ColumnKind>,
    sort_key: Option<usize>,
    rows: Vec<Vec<ColumnValue>>,
}

/// Write `module` as a metadata blob to `writer`
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for references that violate their column's encoding,
/// [`crate::Error::CapacityExceeded`] for oversized tables and [`crate::Error::FileError`] if
/// `writer` fails
pub fn write_module(module: &Module, writer: &mut impl Write, options: &WriteOptions) -> Result<()> {
    let bytes = write_module_to_vec(module, options)?;
    writer.write_all(&bytes)?;
    Ok(())
}

/// Write `module` as a metadata blob into a new buffer
///
/// # Errors
/// See [`write_module`]
///
/// # Examples
///
/// ```rust
/// use dotcodec::metadata::{write_module_to_vec, Module, WriteOptions};
///
/// let bytes = write_module_to_vec(&Module::new(), &WriteOptions::default())?;
/// assert_eq!(&bytes[..4], b"BSJB");
/// # Ok::<(), dotcodec::Error>(())
/// ```
pub fn write_module_to_vec(module: &Module, options: &WriteOptions) -> Result<Vec<u8>> {
    let mut tables = snapshot(module)?;

    let mut sorted = 0u64;
    if options.sort_keyed_tables {
        sort_keyed_tables(&mut tables)?;
        for table in &tables {
            if table.sort_key.is_some() && usize::from(table.kind.value()) < EXTENSION_BIT {
                sorted |= 1u64 << table.kind.value();
            }
        }
    }

    let mut strings = StringsBuilder::new();
    let mut blobs = BlobBuilder::new();
    let mut guids = GuidBuilder::new();
    let mut user_strings = module.user_strings().clone();

    let mut raw_tables: Vec<Vec<RawRow>> = Vec::with_capacity(tables.len());
    for table in &tables {
        let mut raw_rows = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let raw = table
                .columns
                .iter()
                .zip(row)
                .map(|(column, value)| {
                    encode_value(
                        table.kind,
                        *column,
                        value,
                        &mut strings,
                        &mut blobs,
                        &mut guids,
                        &mut user_strings,
                    )
                })
                .collect::<Result<RawRow>>()?;
            raw_rows.push(raw);
        }
        raw_tables.push(raw_rows);
    }

    let strings = strings.into_bytes();
    let blobs = blobs.into_bytes();
    let guids = guids.into_bytes();
    let user_strings = user_strings.to_padded_bytes();

    let metadata = module.header();
    let mut header = TablesHeader {
        reserved: metadata.tables_reserved,
        major_version: metadata.tables_major_version,
        minor_version: metadata.tables_minor_version,
        reserved2: metadata.tables_reserved2,
        heap_sizes: metadata.heap_flags & HeapSizes::PRESERVED,
        sorted,
        extra_data: metadata.extra_data,
        ..TablesHeader::default()
    };
    header.heap_sizes.set(
        HeapSizes::LARGE_STRINGS,
        options.force_large_string_index || strings.len() > usize::from(u16::MAX),
    );
    header.heap_sizes.set(
        HeapSizes::LARGE_GUID,
        options.force_large_guid_index || guids.len() > usize::from(u16::MAX),
    );
    header.heap_sizes.set(
        HeapSizes::LARGE_BLOB,
        options.force_large_blob_index || blobs.len() > usize::from(u16::MAX),
    );
    for table in &tables {
        header.set_rows(table.kind.value(), table.rows.len())?;
    }

    let info = TableInfo::new(
        &header.row_counts,
        header.heap_sizes.contains(HeapSizes::LARGE_STRINGS),
        header.heap_sizes.contains(HeapSizes::LARGE_GUID),
        header.heap_sizes.contains(HeapSizes::LARGE_BLOB),
        user_strings.len() > usize::from(u16::MAX),
    );

    let mut tables_stream = Vec::new();
    let mut offset = 0;
    header.write(&mut tables_stream, &mut offset);
    for (table, raw_rows) in tables.iter().zip(&raw_tables) {
        if !raw_rows.is_empty() {
            log::trace!("Writing {} rows of table {}", raw_rows.len(), table.kind);
        }
        for raw in raw_rows {
            for (column, value) in table.columns.iter().zip(raw) {
                write_column(
                    &mut tables_stream,
                    &mut offset,
                    info.column_bytes(*column),
                    *value,
                )?;
            }
        }
    }
    pad_to(&mut tables_stream, &mut offset, 4);

    let uncompressed = tables.iter().any(|table| {
        !table.rows.is_empty() && table.kind.fixed().is_some_and(|id| id.is_pointer_table())
    });
    let tables_name = if uncompressed { "#-" } else { "#~" };

    let streams: [(&str, &[u8]); 5] = [
        (tables_name, &tables_stream),
        ("#Strings", &strings),
        ("#US", &user_strings),
        ("#GUID", &guids),
        ("#Blob", &blobs),
    ];

    let mut root = Root {
        major_version: metadata.major_version,
        minor_version: metadata.minor_version,
        reserved: metadata.reserved,
        version: options
            .metadata_version
            .clone()
            .unwrap_or_else(|| metadata.version.clone()),
        flags: metadata.flags,
        stream_headers: streams
            .iter()
            .map(|(name, _)| StreamHeader {
                offset: 0,
                size: 0,
                name: (*name).to_string(),
            })
            .collect(),
    };

    let mut position = root.encoded_size();
    for (header, (_, bytes)) in root.stream_headers.iter_mut().zip(&streams) {
        header.offset = u32::try_from(position)
            .map_err(|_| malformed_error!("Metadata exceeds 4 GiB"))?;
        header.size = u32::try_from(bytes.len())
            .map_err(|_| malformed_error!("Stream {} exceeds 4 GiB", header.name))?;
        position += bytes.len();
    }

    let mut buffer = Vec::with_capacity(position);
    let mut offset = 0;
    root.write(&mut buffer, &mut offset)?;
    for (_, bytes) in &streams {
        write_bytes_at(&mut buffer, &mut offset, bytes);
    }

    Ok(buffer)
}

fn snapshot(module: &Module) -> Result<Vec<TableSnapshot>> {
    module
        .all_tables()
        .map(|table| {
            if table.len() > MAX_ROW as usize {
                return Err(Error::CapacityExceeded {
                    table: table.kind().value(),
                    rows: table.len(),
                });
            }

            let rows = (0..table.len())
                .map(|row| {
                    table.row_values(row).ok_or_else(|| {
                        malformed_error!("Row {} of table {} vanished", row, table.kind())
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(TableSnapshot {
                kind: table.kind(),
                columns: table.column_kinds(),
                sort_key: table.sort_key(),
                rows,
            })
        })
        .collect()
}

/// Width independent encoded value of a key column
fn sort_value(column: ColumnKind, value: &ColumnValue) -> Result<u64> {
    match (column, value) {
        (ColumnKind::Constant(_), ColumnValue::Constant(raw)) => Ok(u64::from(*raw)),
        (ColumnKind::Table(_), ColumnValue::Index(index)) => {
            Ok(index.map_or(0, |index| u64::from(index.index()) + 1))
        }
        (ColumnKind::Coded(ci), ColumnValue::Index(index)) => Ok(u64::from(ci.encode(*index)?)),
        (column, _) => Err(malformed_error!(
            "Column of kind {:?} can not serve as a sort key",
            column
        )),
    }
}

/// Stable-sort every keyed table by its key column and remap references into moved rows
fn sort_keyed_tables(tables: &mut [TableSnapshot]) -> Result<()> {
    for _ in 0..MAX_SORT_PASSES {
        let mut moved = false;

        for position in 0..tables.len() {
            let table = &tables[position];
            let Some(key) = table.sort_key else {
                continue;
            };
            let column = table.columns[key];

            let keys = table
                .rows
                .iter()
                .map(|row| sort_value(column, &row[key]))
                .collect::<Result<Vec<u64>>>()?;
            let mut order: Vec<usize> = (0..keys.len()).collect();
            order.sort_by_key(|row| keys[*row]);
            if order.iter().enumerate().all(|(new, old)| new == *old) {
                continue;
            }

            moved = true;
            let kind = table.kind;
            let mut new_position = vec![0usize; order.len()];
            for (new, old) in order.iter().enumerate() {
                new_position[*old] = new;
            }

            let table = &mut tables[position];
            let mut old_rows: Vec<Option<Vec<ColumnValue>>> =
                std::mem::take(&mut table.rows).into_iter().map(Some).collect();
            table.rows = order
                .iter()
                .filter_map(|old| old_rows[*old].take())
                .collect();

            remap_references(tables, kind, &new_position)?;
        }

        if !moved {
            return Ok(());
        }
    }

    log::warn!(
        "Keyed tables did not settle after {} sort passes, writing the last order",
        MAX_SORT_PASSES
    );
    Ok(())
}

fn remap_references(
    tables: &mut [TableSnapshot],
    kind: TableKind,
    new_position: &[usize],
) -> Result<()> {
    for table in tables.iter_mut() {
        for row in &mut table.rows {
            for value in row.iter_mut() {
                if let ColumnValue::Index(Some(index)) = value {
                    // Rows past the end are list terminators and do not move
                    if index.kind() == kind && index.row() < new_position.len() {
                        *index = TableIndex::from_usize(kind, new_position[index.row()])?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn encode_value(
    table: TableKind,
    column: ColumnKind,
    value: &ColumnValue,
    strings: &mut StringsBuilder,
    blobs: &mut BlobBuilder,
    guids: &mut GuidBuilder,
    user_strings: &mut UserStrings,
) -> Result<u32> {
    match (column, value) {
        (ColumnKind::Constant(width), ColumnValue::Constant(raw)) => {
            let limit = match width {
                1 => u32::from(u8::MAX),
                2 => u32::from(u16::MAX),
                _ => u32::MAX,
            };
            if *raw > limit {
                return Err(malformed_error!(
                    "Value {:#x} does not fit a {} byte column of table {}",
                    raw,
                    width,
                    table
                ));
            }
            Ok(*raw)
        }
        (ColumnKind::Heap(HeapKind::String), ColumnValue::String(value)) => strings.intern(value),
        (ColumnKind::Heap(HeapKind::UserString), ColumnValue::String(value)) => {
            user_strings.add(value)
        }
        (ColumnKind::Heap(HeapKind::Blob), ColumnValue::Blob(value)) => blobs.intern(value),
        (ColumnKind::Heap(HeapKind::Guid), ColumnValue::Guid(value)) => Ok(guids.intern(*value)),
        (ColumnKind::Table(target), ColumnValue::Index(index)) => match index {
            None => Ok(0),
            Some(index) if index.kind() == target => Ok(index.index() + 1),
            Some(index) => Err(malformed_error!(
                "Table {} references {} in a column of table {}",
                table,
                index,
                target
            )),
        },
        (ColumnKind::Coded(ci), ColumnValue::Index(index)) => ci.encode(*index),
        (column, value) => Err(malformed_error!(
            "Table {} holds {:?} in a column of kind {:?}",
            table,
            value,
            column
        )),
    }
}

fn write_column(buffer: &mut Vec<u8>, offset: &mut usize, bytes: usize, value: u32) -> Result<()> {
    match bytes {
        1 => {
            let narrow = u8::try_from(value)
                .map_err(|_| malformed_error!("Value {:#x} does not fit 1 byte", value))?;
            write_le_at(buffer, offset, narrow);
            Ok(())
        }
        2 => write_le_at_dyn(buffer, offset, value, false),
        4 => write_le_at_dyn(buffer, offset, value, true),
        _ => Err(malformed_error!("Unsupported column width {}", bytes)),
    }
}
