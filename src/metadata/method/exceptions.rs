//! Exception handling clauses of a method body (ECMA-335 II.25.4.6).

use bitflags::bitflags;

use crate::{
    file::io::{read_le_at, write_le_at},
    metadata::{
        tables::TableId,
        token::{TableIndex, TableKind, Token},
    },
    Result,
};

bitflags! {
    /// Clause kind as stored on disk
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause
        const FILTER = 0x0001;
        /// A finally clause
        const FINALLY = 0x0002;
        /// A fault clause, a finally that only runs on exceptions
        const FAULT = 0x0004;
    }
}

/// Size of one clause in a small section
pub const SMALL_CLAUSE_SIZE: usize = 12;
/// Size of one clause in a fat section
pub const FAT_CLAUSE_SIZE: usize = 24;

/// What a clause does when its protected region throws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionClauseKind {
    /// Catches exceptions of the given `TypeDef`, `TypeRef` or `TypeSpec`
    Catch(TableIndex),
    /// Runs the filter at `filter_offset` to decide whether the handler runs
    Filter {
        /// Offset of the filter code
        filter_offset: u32,
    },
    /// Always runs when leaving the protected region
    Finally,
    /// Runs only when the protected region throws
    Fault,
}

/// One exception handling clause
///
/// ```text
/// try {
///     // try_offset .. try_offset + try_length
/// }
/// catch / filter / finally / fault {
///     // handler_offset .. handler_offset + handler_length
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionClause {
    /// The handler kind and its data
    pub kind: ExceptionClauseKind,
    /// Start of the protected region, in bytes from the start of the code
    pub try_offset: u32,
    /// Length of the protected region in bytes
    pub try_length: u32,
    /// Start of the handler
    pub handler_offset: u32,
    /// Length of the handler in bytes
    pub handler_length: u32,
}

impl ExceptionClause {
    /// The on-disk flags of this clause
    #[must_use]
    pub fn flags(&self) -> ExceptionHandlerFlags {
        match self.kind {
            ExceptionClauseKind::Catch(_) => ExceptionHandlerFlags::EXCEPTION,
            ExceptionClauseKind::Filter { .. } => ExceptionHandlerFlags::FILTER,
            ExceptionClauseKind::Finally => ExceptionHandlerFlags::FINALLY,
            ExceptionClauseKind::Fault => ExceptionHandlerFlags::FAULT,
        }
    }

    /// True if the clause fits the 12-byte small layout
    #[must_use]
    pub fn fits_small(&self) -> bool {
        self.try_offset <= u32::from(u16::MAX)
            && self.try_length <= u32::from(u8::MAX)
            && self.handler_offset <= u32::from(u16::MAX)
            && self.handler_length <= u32::from(u8::MAX)
    }

    /// Read one clause, small or fat
    ///
    /// # Errors
    /// Returns an error for truncated data, unknown flags or a catch type outside
    /// `TypeDef`, `TypeRef` and `TypeSpec`
    pub fn read(data: &[u8], offset: &mut usize, fat: bool) -> Result<ExceptionClause> {
        let (flags, try_offset, try_length, handler_offset, handler_length) = if fat {
            (
                read_le_at::<u32>(data, offset)?,
                read_le_at::<u32>(data, offset)?,
                read_le_at::<u32>(data, offset)?,
                read_le_at::<u32>(data, offset)?,
                read_le_at::<u32>(data, offset)?,
            )
        } else {
            (
                u32::from(read_le_at::<u16>(data, offset)?),
                u32::from(read_le_at::<u16>(data, offset)?),
                u32::from(read_le_at::<u8>(data, offset)?),
                u32::from(read_le_at::<u16>(data, offset)?),
                u32::from(read_le_at::<u8>(data, offset)?),
            )
        };
        let extra = read_le_at::<u32>(data, offset)?;

        let kind = match flags {
            0x0000 => ExceptionClauseKind::Catch(catch_type(Token::new(extra))?),
            0x0001 => ExceptionClauseKind::Filter {
                filter_offset: extra,
            },
            0x0002 => ExceptionClauseKind::Finally,
            0x0004 => ExceptionClauseKind::Fault,
            _ => {
                return Err(malformed_error!(
                    "Invalid exception clause flags - {:#x}",
                    flags
                ))
            }
        };

        Ok(ExceptionClause {
            kind,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
        })
    }

    /// Write the clause in the small or fat layout
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a small layout is requested for a clause that does
    /// not fit it
    pub fn write(&self, buffer: &mut Vec<u8>, offset: &mut usize, fat: bool) -> Result<()> {
        let flags = self.flags().bits();
        if fat {
            write_le_at(buffer, offset, u32::from(flags));
            write_le_at(buffer, offset, self.try_offset);
            write_le_at(buffer, offset, self.try_length);
            write_le_at(buffer, offset, self.handler_offset);
            write_le_at(buffer, offset, self.handler_length);
        } else {
            if !self.fits_small() {
                return Err(malformed_error!(
                    "Exception clause {:?} does not fit a small section",
                    self
                ));
            }
            write_le_at(buffer, offset, flags);
            write_le_at(buffer, offset, self.try_offset as u16);
            write_le_at(buffer, offset, self.try_length as u8);
            write_le_at(buffer, offset, self.handler_offset as u16);
            write_le_at(buffer, offset, self.handler_length as u8);
        }

        let extra = match self.kind {
            ExceptionClauseKind::Catch(class) => class.to_one_based_token().value(),
            ExceptionClauseKind::Filter { filter_offset } => filter_offset,
            ExceptionClauseKind::Finally | ExceptionClauseKind::Fault => 0,
        };
        write_le_at(buffer, offset, extra);
        Ok(())
    }
}

fn catch_type(token: Token) -> Result<TableIndex> {
    let kind = TableKind(token.table());
    let valid = [TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
        .into_iter()
        .any(|id| TableKind::from(id) == kind);
    if !valid || token.row() == 0 {
        return Err(malformed_error!(
            "Catch clause type {} is not a TypeDef, TypeRef or TypeSpec",
            token
        ));
    }

    Ok(TableIndex::from_one_based_token(token))
}
