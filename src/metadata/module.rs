//! The in-memory metadata model: every table of one module.

use std::{fmt, ops::Range};

use strum::IntoEnumIterator;

use crate::{
    metadata::{
        streams::{HeapSizes, UserStrings},
        tables::{
            create_fixed_table, ColumnValue, FixedRow, MetadataTable, ModuleRow, Row, Table,
            TableId, TableRegistration,
        },
        token::{TableIndex, TableKind},
    },
    Error, Result,
};

/// Header values of the metadata root and tables stream that do not live in any table.
///
/// Carried from read to write so that a round trip keeps them; not part of module equality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataHeader {
    /// Runtime version string of the root
    pub version: String,
    /// Root major version
    pub major_version: u16,
    /// Root minor version
    pub minor_version: u16,
    /// Root reserved field
    pub reserved: u32,
    /// Root flags
    pub flags: u16,
    /// Tables stream major version
    pub tables_major_version: u8,
    /// Tables stream minor version
    pub tables_minor_version: u8,
    /// Tables stream reserved field
    pub tables_reserved: u32,
    /// Second tables stream reserved field
    pub tables_reserved2: u8,
    /// Heap-size flags without width meaning, such as `DELTA_ONLY`
    pub heap_flags: HeapSizes,
    /// Extra data value of the tables stream, if present
    pub extra_data: Option<u32>,
}

impl Default for MetadataHeader {
    fn default() -> Self {
        MetadataHeader {
            version: "v4.0.30319".to_string(),
            major_version: 1,
            minor_version: 1,
            reserved: 0,
            flags: 0,
            tables_major_version: 2,
            tables_minor_version: 0,
            tables_reserved: 0,
            tables_reserved2: 1,
            heap_flags: HeapSizes::empty(),
            extra_data: None,
        }
    }
}

/// All tables of a module, fixed and additional, plus the `#US` heap.
///
/// Tables live in 256 slots indexed by their kind byte. A slot is `None` when no table of that
/// kind exists, which is different from an existing table without rows: every fixed kind is
/// always present, additional kinds only once registered.
///
/// # Examples
///
/// ```rust
/// use dotcodec::metadata::{tables::{TableId, TypeRefRow}, Module};
///
/// let mut module = Module::new();
/// assert_eq!(module.all_tables().count(), 0x2D);
/// assert_eq!(module.get_by_table(TableId::Module).map(|t| t.len()), Some(1));
/// assert!(module.get_additional_table(0x2D).is_none());
///
/// module.table_mut::<TypeRefRow>().unwrap().push(TypeRefRow {
///     resolution_scope: None,
///     name: "Object".into(),
///     namespace: "System".into(),
/// })?;
/// assert_eq!(module.table::<TypeRefRow>().unwrap().len(), 1);
/// # Ok::<(), dotcodec::Error>(())
/// ```
pub struct Module {
    tables: Vec<Option<Box<dyn Table>>>,
    registrations: Vec<TableRegistration>,
    header: MetadataHeader,
    user_strings: UserStrings,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    /// A blank module holding only the seed `Module` row
    #[must_use]
    pub fn new() -> Self {
        let mut module = Self::unseeded();
        module.seed();
        module
    }

    /// A blank module with the given additional tables
    ///
    /// # Errors
    /// Returns [`crate::Error::TableKindCollision`] if two registrations share a kind
    pub fn with_tables(registrations: &[TableRegistration]) -> Result<Self> {
        let mut module = Self::new();
        for registration in registrations {
            module.register_table(*registration)?;
        }
        Ok(module)
    }

    /// Fixed tables only, all empty. The reader fills the `Module` table itself
    pub(crate) fn unseeded() -> Self {
        let mut tables: Vec<Option<Box<dyn Table>>> = (0..256).map(|_| None).collect();
        for id in TableId::iter() {
            tables[id as usize] = Some(create_fixed_table(id));
        }

        Module {
            tables,
            registrations: Vec::new(),
            header: MetadataHeader::default(),
            user_strings: UserStrings::new(),
        }
    }

    fn seed(&mut self) {
        if let Some(table) = self.table_mut::<ModuleRow>() {
            table.rows_mut().push(ModuleRow::default());
        }
    }

    /// True once any row beyond the seed `Module` row exists
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.all_tables().any(|table| {
            if table.kind() == TableKind::from(TableId::Module) {
                table.len() > 1
            } else {
                !table.is_empty()
            }
        })
    }

    /// Add an additional table
    ///
    /// # Errors
    /// Returns [`crate::Error::TableKindCollision`] if the kind is taken, or
    /// [`crate::Error::TablesPopulated`] once rows have been added
    pub fn register_table(&mut self, registration: TableRegistration) -> Result<()> {
        let slot = usize::from(registration.kind().value());
        if registration.kind().is_fixed() || self.tables[slot].is_some() {
            return Err(Error::TableKindCollision(registration.kind().value()));
        }
        if self.is_populated() {
            return Err(Error::TablesPopulated);
        }

        self.tables[slot] = Some(registration.create());
        self.registrations.push(registration);
        Ok(())
    }

    /// Remove an additional table
    ///
    /// # Errors
    /// Returns [`crate::Error::TablesPopulated`] once rows have been added, or
    /// [`crate::Error::Malformed`] if `kind` is fixed or not registered
    pub fn unregister_table(&mut self, kind: u8) -> Result<()> {
        let Some(position) = self
            .registrations
            .iter()
            .position(|r| r.kind().value() == kind)
        else {
            return Err(malformed_error!(
                "Table kind {:#04x} is not a registered additional table",
                kind
            ));
        };
        if self.is_populated() {
            return Err(Error::TablesPopulated);
        }

        self.registrations.remove(position);
        self.tables[usize::from(kind)] = None;
        Ok(())
    }

    /// The additional tables registered with this module
    #[must_use]
    pub fn registrations(&self) -> &[TableRegistration] {
        &self.registrations
    }

    /// The table of `kind`, `None` if no such table exists
    pub fn get_by_table(&self, kind: impl Into<TableKind>) -> Option<&dyn Table> {
        let kind = kind.into();
        self.tables[usize::from(kind.value())].as_deref()
    }

    /// Mutable table of `kind`
    pub fn get_by_table_mut(&mut self, kind: impl Into<TableKind>) -> Option<&mut dyn Table> {
        let kind = kind.into();
        match &mut self.tables[usize::from(kind.value())] {
            Some(table) => Some(table.as_mut()),
            None => None,
        }
    }

    /// The additional table of `kind`; `None` for fixed kinds and unregistered kinds
    #[must_use]
    pub fn get_additional_table(&self, kind: u8) -> Option<&dyn Table> {
        if TableKind(kind).is_fixed() {
            return None;
        }
        self.get_by_table(kind)
    }

    /// Every present table in ascending kind order
    pub fn all_tables(&self) -> impl Iterator<Item = &dyn Table> {
        self.tables.iter().filter_map(|slot| slot.as_deref())
    }

    /// Typed access to a fixed table
    #[must_use]
    pub fn table<R: FixedRow>(&self) -> Option<&MetadataTable<R>> {
        self.get_by_table(R::TABLE)?
            .as_any()
            .downcast_ref::<MetadataTable<R>>()
    }

    /// Typed mutable access to a fixed table
    pub fn table_mut<R: FixedRow>(&mut self) -> Option<&mut MetadataTable<R>> {
        self.get_by_table_mut(R::TABLE)?
            .as_any_mut()
            .downcast_mut::<MetadataTable<R>>()
    }

    /// Typed access to an additional table; `None` if `R` is not the registered row type
    #[must_use]
    pub fn additional<R: Row>(&self, kind: u8) -> Option<&MetadataTable<R>> {
        self.get_additional_table(kind)?
            .as_any()
            .downcast_ref::<MetadataTable<R>>()
    }

    /// Typed mutable access to an additional table
    pub fn additional_mut<R: Row>(&mut self, kind: u8) -> Option<&mut MetadataTable<R>> {
        if TableKind(kind).is_fixed() {
            return None;
        }
        self.get_by_table_mut(kind)?
            .as_any_mut()
            .downcast_mut::<MetadataTable<R>>()
    }

    /// Header values carried between read and write
    #[must_use]
    pub fn header(&self) -> &MetadataHeader {
        &self.header
    }

    /// Mutable header values
    pub fn header_mut(&mut self) -> &mut MetadataHeader {
        &mut self.header
    }

    /// The `#US` heap
    #[must_use]
    pub fn user_strings(&self) -> &UserStrings {
        &self.user_strings
    }

    /// Mutable `#US` heap, for adding literals referenced by new method bodies
    pub fn user_strings_mut(&mut self) -> &mut UserStrings {
        &mut self.user_strings
    }

    pub(crate) fn set_user_strings(&mut self, heap: UserStrings) {
        self.user_strings = heap;
    }

    /// Zero-based rows of `child` owned by `owner`.
    ///
    /// Supported runs are `TypeDef` to `Field` and `MethodDef`, `MethodDef` to `Param`,
    /// `EventMap` to `Event` and `PropertyMap` to `Property`. The run starts at the owner's list
    /// column and ends where the next owner's run starts, or at the end of `child`. Inverted or
    /// overlong lists are clamped to the child table.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unsupported combination or an owner that
    /// does not exist
    pub fn run_range(&self, owner: TableIndex, child: TableId) -> Result<Range<usize>> {
        let column = match (owner.kind().fixed(), child) {
            (Some(TableId::TypeDef), TableId::Field) => 4,
            (Some(TableId::TypeDef), TableId::MethodDef) => 5,
            (Some(TableId::MethodDef), TableId::Param) => 5,
            (Some(TableId::EventMap), TableId::Event) => 1,
            (Some(TableId::PropertyMap), TableId::Property) => 1,
            _ => {
                return Err(malformed_error!(
                    "{} does not own a run of {:?} rows",
                    owner.kind(),
                    child
                ))
            }
        };

        let owners = self
            .get_by_table(owner.kind())
            .ok_or_else(|| malformed_error!("Owner table {} is missing", owner.kind()))?;
        let child_len = self.get_by_table(child).map_or(0, |t| t.len());

        let list_start = |row: usize| -> Option<usize> {
            match owners.row_values(row)?.get(column)? {
                ColumnValue::Index(Some(index)) => Some(index.row()),
                _ => None,
            }
        };

        let start = list_start(owner.row())
            .ok_or_else(|| malformed_error!("Owner {} does not exist", owner))?
            .min(child_len);
        let end = if owner.row() + 1 < owners.len() {
            list_start(owner.row() + 1).unwrap_or(child_len)
        } else {
            child_len
        }
        .clamp(start, child_len);

        Ok(start..end)
    }
}

impl Clone for Module {
    fn clone(&self) -> Self {
        Module {
            tables: self.tables.clone(),
            registrations: self.registrations.clone(),
            header: self.header.clone(),
            user_strings: self.user_strings.clone(),
        }
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.tables
            .iter()
            .zip(&other.tables)
            .all(|pair| match pair {
                (None, None) => true,
                (Some(left), Some(right)) => left.table_eq(right.as_ref()),
                _ => false,
            })
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables: Vec<(TableKind, usize)> = self
            .all_tables()
            .filter(|t| !t.is_empty())
            .map(|t| (t.kind(), t.len()))
            .collect();
        f.debug_struct("Module")
            .field("tables", &tables)
            .field("registrations", &self.registrations)
            .field("header", &self.header)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::tables::{
            ColumnKind, FieldRow, HeapKind, MethodDefRow, ModuleRefRow, TypeAttributes, TypeDefRow,
        },
        metadata_row,
    };

    metadata_row! {
        pub struct TagRow {
            value: u32 = ColumnKind::Constant(4),
            label: String = ColumnKind::Heap(HeapKind::String),
        }
    }

    fn tag_table(kind: u8) -> TableRegistration {
        TableRegistration::new::<TagRow>(kind).unwrap()
    }

    #[test]
    fn blank_module() {
        let module = Module::new();
        assert_eq!(module.all_tables().count(), TableKind::LAST_FIXED.value() as usize + 1);
        let kinds: Vec<u8> = module.all_tables().map(|t| t.kind().value()).collect();
        assert!(kinds.windows(2).all(|w| w[0] < w[1]));
        assert!(!module.is_populated());
        assert_eq!(module.table::<ModuleRow>().unwrap().len(), 1);
    }

    #[test]
    fn absent_versus_empty() {
        let module = Module::with_tables(&[tag_table(0x2D)]).unwrap();
        let table = module.get_additional_table(0x2D).unwrap();
        assert!(table.is_empty());
        assert!(module.get_additional_table(0x2E).is_none());
        assert!(module.get_additional_table(0xFF).is_none());
        assert!(module.get_additional_table(0x02).is_none());
        assert!(module.get_by_table(0x02).is_some());
        assert_eq!(module.all_tables().count(), 0x2E);
        assert!(module.additional::<TagRow>(0x2D).is_some());
        assert!(module.additional::<ModuleRefRow>(0x2D).is_none());
    }

    #[test]
    fn registration_rules() {
        let mut module = Module::with_tables(&[tag_table(0x40)]).unwrap();
        assert!(matches!(
            module.register_table(tag_table(0x40)),
            Err(Error::TableKindCollision(0x40))
        ));
        module.unregister_table(0x40).unwrap();
        assert!(module.unregister_table(0x40).is_err());
        module.register_table(tag_table(0x40)).unwrap();

        module
            .table_mut::<ModuleRefRow>()
            .unwrap()
            .push(ModuleRefRow {
                name: "native.dll".into(),
            })
            .unwrap();
        assert!(matches!(
            module.register_table(tag_table(0x41)),
            Err(Error::TablesPopulated)
        ));
        assert!(matches!(
            module.unregister_table(0x40),
            Err(Error::TablesPopulated)
        ));
    }

    #[test]
    fn equality() {
        let mut left = Module::with_tables(&[tag_table(0x30)]).unwrap();
        let right = left.clone();
        assert_eq!(left, right);

        left.additional_mut::<TagRow>(0x30)
            .unwrap()
            .push(TagRow {
                value: 7,
                label: "seven".into(),
            })
            .unwrap();
        assert_ne!(left, right);

        left.additional_mut::<TagRow>(0x30).unwrap().rows_mut().clear();
        assert_eq!(left, right);
        assert_ne!(left, Module::new());
    }

    #[test]
    fn runs() {
        let mut module = Module::new();
        let field = |n: &str| FieldRow {
            name: n.into(),
            ..FieldRow::default()
        };
        for name in ["a", "b", "c"] {
            module.table_mut::<FieldRow>().unwrap().push(field(name)).unwrap();
        }
        module
            .table_mut::<MethodDefRow>()
            .unwrap()
            .push(MethodDefRow::default())
            .unwrap();

        let types = module.table_mut::<TypeDefRow>().unwrap();
        let first = types
            .push(TypeDefRow {
                flags: TypeAttributes::PUBLIC,
                name: "A".into(),
                field_list: TableIndex::new(TableId::Field, 0).unwrap(),
                method_list: TableIndex::new(TableId::MethodDef, 0).unwrap(),
                ..TypeDefRow::default()
            })
            .unwrap();
        let second = types
            .push(TypeDefRow {
                name: "B".into(),
                field_list: TableIndex::new(TableId::Field, 2).unwrap(),
                method_list: TableIndex::new(TableId::MethodDef, 1).unwrap(),
                ..TypeDefRow::default()
            })
            .unwrap();

        assert_eq!(module.run_range(first, TableId::Field).unwrap(), 0..2);
        assert_eq!(module.run_range(second, TableId::Field).unwrap(), 2..3);
        assert_eq!(module.run_range(first, TableId::MethodDef).unwrap(), 0..1);
        assert_eq!(module.run_range(second, TableId::MethodDef).unwrap(), 1..1);
        assert!(module.run_range(first, TableId::Param).is_err());

        let missing = TableIndex::new(TableId::TypeDef, 9).unwrap();
        assert!(module.run_range(missing, TableId::Field).is_err());
    }
}
