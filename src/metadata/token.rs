//! Row identifiers: on-disk tokens and in-memory table indexes.
//!
//! Both representations pack a table kind into the top 8 bits of a `u32` and a row number
//! into the low 24 bits. They differ only in the row base:
//!
//! - [`Token`] uses one-based rows, with row `0` meaning "no row". This is the form stored in
//!   IL operands, local signature references and most other interchange points.
//! - [`TableIndex`] uses zero-based rows and always refers to a row. Absent references are
//!   expressed as `Option<TableIndex>`.
//!
//! Converting between the two adds or subtracts one on the packed word, which makes
//! [`TableIndex::to_one_based_token`] and [`TableIndex::from_one_based_token`] exact inverses
//! over the whole `u32` range. Since the packing places the kind above the row, the derived
//! ordering of both types is lexicographic over `(kind, row)`.
//!
//! # Examples
//!
//! ```rust
//! use dotcodec::metadata::{tables::TableId, token::{TableIndex, Token}};
//!
//! let index = TableIndex::new(TableId::MethodDef, 0)?;
//! assert_eq!(index.to_one_based_token(), Token::new(0x0600_0001));
//! assert_eq!(TableIndex::from_one_based_token(Token::new(0x0600_0001)), index);
//! assert_eq!(TableIndex::from_one_based_token_nullable(Token::new(0)), None);
//! # Ok::<(), dotcodec::Error>(())
//! ```

use std::fmt;

use crate::{metadata::tables::TableId, Error, Result};

/// Highest row index (zero-based) or row number (one-based) that fits in 24 bits
pub const MAX_ROW: u32 = 0x00FF_FFFF;

/// A metadata token: table kind in the top byte, one-based row in the low 24 bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Wrap a raw token value
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Build a token from a table kind and a one-based row
    #[must_use]
    pub fn from_parts(kind: impl Into<TableKind>, row: u32) -> Self {
        Token((u32::from(kind.into().value()) << 24) | (row & MAX_ROW))
    }

    /// The raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table kind byte
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The one-based row
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & MAX_ROW
    }

    /// True for the all-zero token
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: {}, row: {})",
            self.0,
            TableKind(self.table()),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Identifies a metadata table, fixed or caller-registered.
///
/// Kinds up to and including [`TableKind::LAST_FIXED`] are the ECMA-335 tables (see
/// [`TableId`]); every kind above is available for additional tables.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableKind(pub u8);

impl TableKind {
    /// Kind of the last fixed table, `GenericParamConstraint`
    pub const LAST_FIXED: TableKind = TableKind(0x2C);

    /// The kind byte
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// True for the ECMA-335 tables
    #[must_use]
    pub const fn is_fixed(self) -> bool {
        self.0 <= Self::LAST_FIXED.0
    }

    /// The matching [`TableId`] for fixed kinds
    #[must_use]
    pub fn fixed(self) -> Option<TableId> {
        TableId::from_repr(self.0)
    }

    /// Whether an IL inline token operand may refer to this table
    #[must_use]
    pub fn can_be_referenced_from_il(self) -> bool {
        matches!(
            self.fixed(),
            Some(
                TableId::TypeDef
                    | TableId::TypeRef
                    | TableId::TypeSpec
                    | TableId::MethodDef
                    | TableId::Field
                    | TableId::MemberRef
                    | TableId::MethodSpec
                    | TableId::StandAloneSig
            )
        )
    }
}

impl From<TableId> for TableKind {
    fn from(id: TableId) -> Self {
        TableKind(id as u8)
    }
}

impl From<u8> for TableKind {
    fn from(value: u8) -> Self {
        TableKind(value)
    }
}

impl fmt::Debug for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fixed() {
            Some(id) => write!(f, "{id:?}"),
            None => write!(f, "Table(0x{:02x})", self.0),
        }
    }
}

/// A zero-based reference to one row of one table.
///
/// The default value is the first row of the `Module` table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TableIndex(u32);

impl TableIndex {
    /// Reference row `index` (zero-based) of table `kind`
    ///
    /// # Errors
    /// Returns [`crate::Error::CapacityExceeded`] if `index` does not fit in 24 bits
    pub fn new(kind: impl Into<TableKind>, index: u32) -> Result<Self> {
        let kind = kind.into();
        if index > MAX_ROW {
            return Err(Error::CapacityExceeded {
                table: kind.value(),
                rows: index as usize + 1,
            });
        }

        Ok(TableIndex((u32::from(kind.value()) << 24) | index))
    }

    /// Reference row `index` where the caller already knows it is in range
    pub(crate) fn from_usize(kind: TableKind, index: usize) -> Result<Self> {
        let Ok(index) = u32::try_from(index) else {
            return Err(Error::CapacityExceeded {
                table: kind.value(),
                rows: index.saturating_add(1),
            });
        };
        Self::new(kind, index)
    }

    /// The table this index points into
    #[must_use]
    pub fn kind(self) -> TableKind {
        TableKind((self.0 >> 24) as u8)
    }

    /// The zero-based row
    #[must_use]
    pub fn index(self) -> u32 {
        self.0 & MAX_ROW
    }

    /// The zero-based row as `usize`, for slice access
    #[must_use]
    pub fn row(self) -> usize {
        self.index() as usize
    }

    /// The packed representation
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Convert to the one-based on-disk token
    #[must_use]
    pub fn to_one_based_token(self) -> Token {
        Token(self.0.wrapping_add(1))
    }

    /// Convert from a one-based token, exact inverse of [`TableIndex::to_one_based_token`]
    #[must_use]
    pub fn from_one_based_token(token: Token) -> Self {
        TableIndex(token.0.wrapping_sub(1))
    }

    /// Like [`TableIndex::from_one_based_token`], but maps the null token to `None`
    #[must_use]
    pub fn from_one_based_token_nullable(token: Token) -> Option<Self> {
        if token.is_null() {
            None
        } else {
            Some(Self::from_one_based_token(token))
        }
    }

    /// Convert an optional index to a token, `None` becoming the null token
    #[must_use]
    pub fn to_one_based_token_nullable(index: Option<Self>) -> Token {
        index.map_or(Token(0), Self::to_one_based_token)
    }

    /// Convert an IL inline token operand, rejecting tables IL may not reference
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for row `0` or a table outside the IL-referenceable set
    pub fn from_il_token(token: Token) -> Result<Self> {
        let kind = TableKind(token.table());
        if !kind.can_be_referenced_from_il() {
            return Err(malformed_error!(
                "Token {} references table {} which is not valid in IL",
                token,
                kind
            ));
        }
        if token.row() == 0 {
            return Err(malformed_error!("Token {} references row 0", token));
        }

        Ok(Self::from_one_based_token(token))
    }

    /// Convert to an IL inline token operand
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a table outside the IL-referenceable set
    pub fn to_il_token(self) -> Result<Token> {
        if !self.kind().can_be_referenced_from_il() {
            return Err(malformed_error!(
                "Table {} can not be referenced from IL",
                self.kind()
            ));
        }

        Ok(self.to_one_based_token())
    }
}

impl fmt::Debug for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind(), self.index())
    }
}

impl fmt::Display for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind(), self.index())
    }
}
