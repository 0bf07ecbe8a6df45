//! Deserialization of a metadata blob into a [`Module`].
//!
//! Reading happens in two passes. The first pass walks the tables stream in ascending kind
//! order and slices every row into a [`RawRow`], using the widths [`TableInfo`] derives from
//! the row counts and heap flags. The second pass resolves heap offsets and table references
//! into [`ColumnValue`]s and pushes the logical rows into the module's tables. Fixed and
//! additional tables travel the same path.

use crate::{
    file::io::{read_le_at, read_le_at_dyn},
    metadata::{
        module::{MetadataHeader, Module},
        options::ReadOptions,
        root::Root,
        streams::{Blob, GuidHeap, HeapSizes, Strings, TablesHeader, UserStrings},
        tables::{ColumnKind, ColumnValue, HeapKind, RawRow, TableInfo},
        token::{TableIndex, TableKind},
    },
    Result,
};

/// The heaps a tables stream resolves against
struct Heaps<'a> {
    strings: Strings<'a>,
    guids: GuidHeap<'a>,
    blobs: Blob<'a>,
    user_strings: UserStrings,
}

/// Read a metadata blob, starting at the `BSJB` root
///
/// # Arguments
///
/// * `data` - The metadata bytes, as located by the CLI header
/// * `options` - Additional tables and optional checks
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for inconsistent
/// input, including tables of a kind that is neither fixed nor registered in `options`
///
/// # Examples
///
/// ```rust
/// use dotcodec::metadata::{read_module, write_module_to_vec, Module, ReadOptions, WriteOptions};
///
/// let bytes = write_module_to_vec(&Module::new(), &WriteOptions::default())?;
/// let module = read_module(&bytes, &ReadOptions::default())?;
/// assert_eq!(module, Module::new());
/// # Ok::<(), dotcodec::Error>(())
/// ```
pub fn read_module(data: &[u8], options: &ReadOptions) -> Result<Module> {
    let root = Root::read(data)?;

    let stream_bytes = |name: &str| -> Option<&[u8]> {
        let header = root.stream(name)?;
        let start = header.offset as usize;
        data.get(start..start + header.size as usize)
    };

    let tables_stream = stream_bytes("#~")
        .or_else(|| stream_bytes("#-"))
        .ok_or_else(|| malformed_error!("Metadata has no tables stream"))?;

    for name in ["#Strings", "#US", "#GUID", "#Blob"] {
        if root.stream(name).is_none() {
            log::debug!("Metadata has no {} stream, treating it as empty", name);
        }
    }

    let heaps = Heaps {
        strings: Strings::from(stream_bytes("#Strings").unwrap_or_default())?,
        guids: GuidHeap::from(stream_bytes("#GUID").unwrap_or_default())?,
        blobs: Blob::from(stream_bytes("#Blob").unwrap_or_default())?,
        user_strings: UserStrings::from(stream_bytes("#US").unwrap_or_default())?,
    };
    if options.resolve_user_strings {
        heaps.user_strings.validate()?;
    }

    let mut offset = 0;
    let header = TablesHeader::read(tables_stream, &mut offset)?;

    let mut module = Module::unseeded();
    for registration in &options.additional_tables {
        module.register_table(*registration)?;
    }
    for (kind, rows) in header.row_counts.iter().enumerate() {
        if *rows > 0 && module.get_by_table(kind as u8).is_none() {
            return Err(malformed_error!(
                "Tables stream contains {} rows of unregistered table kind {:#04x}",
                rows,
                kind
            ));
        }
    }

    let info = TableInfo::new(
        &header.row_counts,
        header.heap_sizes.contains(HeapSizes::LARGE_STRINGS),
        header.heap_sizes.contains(HeapSizes::LARGE_GUID),
        header.heap_sizes.contains(HeapSizes::LARGE_BLOB),
        heaps.user_strings.to_padded_bytes().len() > usize::from(u16::MAX),
    );

    // Pass 1: slice every table into raw rows
    let mut raw_tables: Vec<(TableKind, Vec<ColumnKind>, Vec<RawRow>)> = Vec::new();
    for table in module.all_tables() {
        let kind = table.kind();
        let rows = header.row_counts[usize::from(kind.value())] as usize;
        let columns = table.column_kinds();

        let mut raw_rows = Vec::with_capacity(rows);
        for _ in 0..rows {
            let mut raw = RawRow::with_capacity(columns.len());
            for column in &columns {
                raw.push(read_column(tables_stream, &mut offset, info.column_bytes(*column))?);
            }
            raw_rows.push(raw);
        }

        if rows > 0 {
            log::trace!("Read {} rows of table {}", rows, kind);
        }
        raw_tables.push((kind, columns, raw_rows));
    }

    // Pass 2: resolve raw values and fill the tables
    for (kind, columns, raw_rows) in raw_tables {
        let Some(table) = module.get_by_table_mut(kind) else {
            continue;
        };
        for raw in raw_rows {
            let values = columns
                .iter()
                .zip(raw)
                .map(|(column, value)| resolve(*column, value, &heaps, &header, options))
                .collect::<Result<Vec<ColumnValue>>>()?;
            table.push_values(values)?;
        }
    }

    *module.header_mut() = MetadataHeader {
        version: root.version,
        major_version: root.major_version,
        minor_version: root.minor_version,
        reserved: root.reserved,
        flags: root.flags,
        tables_major_version: header.major_version,
        tables_minor_version: header.minor_version,
        tables_reserved: header.reserved,
        tables_reserved2: header.reserved2,
        heap_flags: header.heap_sizes & HeapSizes::PRESERVED,
        extra_data: header.extra_data,
    };
    module.set_user_strings(heaps.user_strings);

    Ok(module)
}

fn read_column(data: &[u8], offset: &mut usize, bytes: usize) -> Result<u32> {
    match bytes {
        1 => Ok(u32::from(read_le_at::<u8>(data, offset)?)),
        2 => read_le_at_dyn(data, offset, false),
        4 => read_le_at_dyn(data, offset, true),
        _ => Err(malformed_error!("Unsupported column width {}", bytes)),
    }
}

fn resolve(
    column: ColumnKind,
    raw: u32,
    heaps: &Heaps,
    header: &TablesHeader,
    options: &ReadOptions,
) -> Result<ColumnValue> {
    let rows_of = |kind: TableKind| header.row_counts[usize::from(kind.value())];

    match column {
        ColumnKind::Constant(_) => Ok(ColumnValue::Constant(raw)),
        ColumnKind::Heap(HeapKind::String) => Ok(ColumnValue::String(
            heaps.strings.get(raw as usize)?.to_string(),
        )),
        ColumnKind::Heap(HeapKind::Guid) => Ok(ColumnValue::Guid(heaps.guids.get(raw as usize)?)),
        ColumnKind::Heap(HeapKind::Blob) => {
            Ok(ColumnValue::Blob(heaps.blobs.get(raw as usize)?.to_vec()))
        }
        ColumnKind::Heap(HeapKind::UserString) => Ok(ColumnValue::String(
            heaps.user_strings.get(raw as usize)?,
        )),
        ColumnKind::Table(kind) => {
            if raw == 0 {
                return Ok(ColumnValue::Index(None));
            }
            // List columns may point one past the last row of an empty run
            if options.validate_coded_targets && raw > rows_of(kind) + 1 {
                return Err(malformed_error!(
                    "Reference to row {} of table {} which has {} rows",
                    raw,
                    kind,
                    rows_of(kind)
                ));
            }
            Ok(ColumnValue::Index(Some(TableIndex::new(kind, raw - 1)?)))
        }
        ColumnKind::Coded(ci) => {
            let index = ci.decode(raw)?;
            if let Some(index) = index {
                if options.validate_coded_targets && index.index() >= rows_of(index.kind()) {
                    return Err(malformed_error!(
                        "Coded index {:?} references {} which does not exist",
                        ci,
                        index
                    ));
                }
            }
            Ok(ColumnValue::Index(index))
        }
    }
}
