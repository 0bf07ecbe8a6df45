//! Symbol records of a module stream.
//!
//! The stream opens with the C13 signature, followed by length-prefixed records padded to
//! four bytes. Each function is an `S_GMANPROC`/`S_LMANPROC` record, its OEM payloads,
//! namespaces and locals, its nested `S_BLOCK32` scopes and a closing `S_END`. Scope records
//! point at their parent record and at their own `S_END` by stream offset.

use crate::{
    file::io::{
        pad_to, read_cstring_at, read_guid_at, read_le_at, write_bytes_at, write_cstring_at,
        write_guid_at, write_le_at, TextEncoding,
    },
    pdb::{
        model::{PdbFunction, PdbScope, PdbSlot},
        oem::{
            read_custom_debug_info, write_custom_debug_info, AsyncMethodInfo,
            ASYNC_METHOD_INFO_NAME, MANAGED_OEM_GUID, MD2_NAME,
        },
        options::PdbReadOptions,
    },
    Result,
};

/// Signature of C13 module streams
pub const C13_SIGNATURE: u32 = 4;

/// Closes a function or block
pub const S_END: u16 = 0x0006;
/// OEM-defined payload
pub const S_OEM: u16 = 0x0404;
/// Lexical block
pub const S_BLOCK32: u16 = 0x1103;
/// Managed local
pub const S_MANSLOT: u16 = 0x1120;
/// Imported namespace
pub const S_UNAMESPACE: u16 = 0x1124;
/// Reference to a managed procedure, used by the global symbols
pub const S_TOKENREF: u16 = 0x1129;
/// Global managed procedure
pub const S_GMANPROC: u16 = 0x112A;
/// Local managed procedure
pub const S_LMANPROC: u16 = 0x112B;

/// Offset of the `end` field in procedure and block records
const END_FIELD: usize = 8;

/// Appends records, keeping their stream offsets
pub(crate) struct RecordWriter {
    data: Vec<u8>,
    offset: usize,
}

impl RecordWriter {
    /// A writer whose offsets start after `prefix`
    pub fn with_prefix(prefix: &[u8]) -> Self {
        let mut writer = RecordWriter {
            data: Vec::new(),
            offset: 0,
        };
        write_bytes_at(&mut writer.data, &mut writer.offset, prefix);
        writer
    }

    pub fn data(&mut self) -> (&mut Vec<u8>, &mut usize) {
        (&mut self.data, &mut self.offset)
    }

    /// Start a record of `kind`; returns its offset
    pub fn begin(&mut self, kind: u16) -> usize {
        let start = self.offset;
        write_le_at(&mut self.data, &mut self.offset, 0u16);
        write_le_at(&mut self.data, &mut self.offset, kind);
        start
    }

    /// Pad the record started at `start` and store its length
    pub fn finish(&mut self, start: usize) -> Result<()> {
        pad_to(&mut self.data, &mut self.offset, 4);
        let length = u16::try_from(self.offset - start - 2)
            .map_err(|_| malformed_error!("Symbol record of {} bytes", self.offset - start))?;
        let mut at = start;
        write_le_at(&mut self.data, &mut at, length);
        Ok(())
    }

    fn patch(&mut self, at: usize, value: u32) {
        let mut at = at;
        write_le_at(&mut self.data, &mut at, value);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

fn write_oem(writer: &mut RecordWriter, name: &str, payload: &[u8]) -> Result<()> {
    let start = writer.begin(S_OEM);
    let (data, offset) = writer.data();
    write_guid_at(data, offset, &MANAGED_OEM_GUID);
    write_le_at(data, offset, 0u32);
    write_cstring_at(data, offset, name, TextEncoding::Utf16Le)?;
    write_bytes_at(data, offset, payload);
    writer.finish(start)
}

fn write_locals(writer: &mut RecordWriter, slots: &[PdbSlot], namespaces: &[String]) -> Result<()> {
    for namespace in namespaces {
        let start = writer.begin(S_UNAMESPACE);
        let (data, offset) = writer.data();
        write_cstring_at(data, offset, namespace, TextEncoding::Utf8)?;
        writer.finish(start)?;
    }

    for slot in slots {
        let start = writer.begin(S_MANSLOT);
        let (data, offset) = writer.data();
        write_le_at(data, offset, slot.slot);
        write_le_at(data, offset, slot.type_index);
        write_le_at(data, offset, 0u32);
        write_le_at(data, offset, 0u16);
        write_le_at(data, offset, slot.flags);
        write_cstring_at(data, offset, &slot.name, TextEncoding::Utf8)?;
        writer.finish(start)?;
    }
    Ok(())
}

fn write_end(writer: &mut RecordWriter, opened: usize) -> Result<()> {
    let end = writer.begin(S_END);
    writer.finish(end)?;
    writer.patch(opened + END_FIELD, end as u32);
    Ok(())
}

/// Check that `scopes` is a pre-order listing in which every parent comes first
///
/// # Errors
/// Returns [`crate::Error::Malformed`] naming the first scope out of order
pub(crate) fn check_scope_order(scopes: &[PdbScope]) -> Result<()> {
    let mut open: Vec<usize> = Vec::new();
    for (index, scope) in scopes.iter().enumerate() {
        if scope.parent.is_some_and(|parent| parent >= index) {
            return Err(malformed_error!(
                "Scope {} lists scope {:?} as parent",
                index,
                scope.parent
            ));
        }
        while open.last().copied() != scope.parent {
            if open.pop().is_none() {
                return Err(malformed_error!("Scope {} is not in pre-order", index));
            }
        }
        open.push(index);
    }
    Ok(())
}

fn write_function(writer: &mut RecordWriter, function: &PdbFunction) -> Result<u32> {
    check_scope_order(&function.scopes)?;

    let kind = if function.global { S_GMANPROC } else { S_LMANPROC };
    let proc_start = writer.begin(kind);
    let (data, offset) = writer.data();
    write_le_at(data, offset, 0u32); // parent
    write_le_at(data, offset, 0u32); // end
    write_le_at(data, offset, 0u32); // next
    write_le_at(data, offset, function.length);
    write_le_at(data, offset, 0u32);
    write_le_at(data, offset, function.length);
    write_le_at(data, offset, function.token);
    write_le_at(data, offset, function.offset);
    write_le_at(data, offset, function.segment);
    write_le_at(data, offset, 0u8);
    write_le_at(data, offset, 0u16);
    write_cstring_at(data, offset, &function.name, TextEncoding::Utf8)?;
    writer.finish(proc_start)?;

    if !function.custom_debug_info.is_empty() {
        write_oem(writer, MD2_NAME, &write_custom_debug_info(&function.custom_debug_info)?)?;
    }
    if let Some(info) = &function.async_info {
        write_oem(writer, ASYNC_METHOD_INFO_NAME, &info.write())?;
    }
    write_locals(writer, &function.slots, &function.used_namespaces)?;

    // (scope index, record offset) of every open block
    let mut open: Vec<(usize, usize)> = Vec::new();
    for (index, scope) in function.scopes.iter().enumerate() {
        while open.last().map(|(open_index, _)| *open_index) != scope.parent {
            match open.pop() {
                Some((_, start)) => write_end(writer, start)?,
                None => break,
            }
        }

        let parent = open.last().map_or(proc_start, |(_, start)| *start);
        let block_start = writer.begin(S_BLOCK32);
        let (data, offset) = writer.data();
        write_le_at(data, offset, parent as u32);
        write_le_at(data, offset, 0u32);
        write_le_at(data, offset, scope.length);
        write_le_at(data, offset, function.offset.wrapping_add(scope.offset));
        write_le_at(data, offset, function.segment);
        write_le_at(data, offset, 0u8);
        writer.finish(block_start)?;

        write_locals(writer, &scope.slots, &scope.used_namespaces)?;
        open.push((index, block_start));
    }
    while let Some((_, start)) = open.pop() {
        write_end(writer, start)?;
    }
    write_end(writer, proc_start)?;

    Ok(proc_start as u32)
}

/// Serialize the symbol part of a module stream
///
/// Returns the bytes, signature included, and the stream offset of every function's
/// procedure record.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for scopes out of pre-order, records over 64 KiB or
/// payloads that can not be stored
pub(crate) fn write_symbols(functions: &[PdbFunction]) -> Result<(Vec<u8>, Vec<u32>)> {
    let mut writer = RecordWriter::with_prefix(&C13_SIGNATURE.to_le_bytes());
    let mut offsets = Vec::with_capacity(functions.len());
    for function in functions {
        offsets.push(write_function(&mut writer, function)?);
    }
    Ok((writer.into_inner(), offsets))
}

/// Where locals and namespaces currently go
struct OpenFunction {
    function: PdbFunction,
    /// Scope index per open block
    blocks: Vec<usize>,
}

impl OpenFunction {
    fn slots(&mut self) -> &mut Vec<PdbSlot> {
        match self.blocks.last() {
            Some(&index) => &mut self.function.scopes[index].slots,
            None => &mut self.function.slots,
        }
    }

    fn namespaces(&mut self) -> &mut Vec<String> {
        match self.blocks.last() {
            Some(&index) => &mut self.function.scopes[index].used_namespaces,
            None => &mut self.function.used_namespaces,
        }
    }
}

fn unexpected(
    options: &PdbReadOptions,
    stream: &str,
    kind: u16,
    at: usize,
    why: &str,
) -> Result<()> {
    if options.strict {
        return Err(pdb_error!(
            stream,
            "symbol record {:#06x} at {:#x}: {}",
            kind,
            at,
            why
        ));
    }
    log::debug!("{}: skipping symbol record {:#06x} at {:#x}: {}", stream, kind, at, why);
    Ok(())
}

fn read_oem(
    function: &mut PdbFunction,
    body: &[u8],
    stream: &str,
    options: &PdbReadOptions,
    at: usize,
) -> Result<()> {
    let mut offset = 0;
    let guid = read_guid_at(body, &mut offset)?;
    let _type_index = read_le_at::<u32>(body, &mut offset)?;
    let name = read_cstring_at(body, &mut offset, TextEncoding::Utf16Le)?;
    let payload = &body[offset..];

    if guid != MANAGED_OEM_GUID {
        return unexpected(options, stream, S_OEM, at, "foreign OEM GUID");
    }
    match name.as_str() {
        MD2_NAME => function.custom_debug_info = read_custom_debug_info(payload)?,
        ASYNC_METHOD_INFO_NAME => function.async_info = Some(AsyncMethodInfo::read(payload)?),
        _ => return unexpected(options, stream, S_OEM, at, "unknown OEM payload"),
    }
    Ok(())
}

/// Parse the symbol part of a module stream, signature included. `stream` names the module
/// in errors.
///
/// # Errors
/// Returns [`crate::Error::Pdb`] for another signature, records that overrun the stream,
/// unbalanced `S_END` records and, in strict mode, records this crate does not know
pub(crate) fn read_symbols(
    data: &[u8],
    stream: &str,
    options: &PdbReadOptions,
) -> Result<Vec<PdbFunction>> {
    let mut offset = 0;
    let signature = read_le_at::<u32>(data, &mut offset)?;
    if signature != C13_SIGNATURE {
        return Err(pdb_error!(stream, "unsupported signature {}", signature));
    }

    let mut functions = Vec::new();
    let mut current: Option<OpenFunction> = None;

    while offset + 4 <= data.len() {
        let at = offset;
        let length = read_le_at::<u16>(data, &mut offset)? as usize;
        if length < 2 || at + 2 + length > data.len() {
            return Err(pdb_error!(
                stream,
                "symbol record at {:#x} of {} bytes overruns the stream",
                at,
                length
            ));
        }
        let kind = read_le_at::<u16>(data, &mut offset)?;
        let body = &data[at + 4..at + 2 + length];
        offset = at + 2 + length;

        let mut cursor = 0;
        let mut closed = false;
        match (kind, current.as_mut()) {
            (S_GMANPROC | S_LMANPROC, None) => {
                let _parent = read_le_at::<u32>(body, &mut cursor)?;
                let _end = read_le_at::<u32>(body, &mut cursor)?;
                let _next = read_le_at::<u32>(body, &mut cursor)?;
                let length = read_le_at::<u32>(body, &mut cursor)?;
                let _debug_start = read_le_at::<u32>(body, &mut cursor)?;
                let _debug_end = read_le_at::<u32>(body, &mut cursor)?;
                let token = read_le_at::<u32>(body, &mut cursor)?;
                let start = read_le_at::<u32>(body, &mut cursor)?;
                let segment = read_le_at::<u16>(body, &mut cursor)?;
                let _flags = read_le_at::<u8>(body, &mut cursor)?;
                let _return_register = read_le_at::<u16>(body, &mut cursor)?;
                let name = read_cstring_at(body, &mut cursor, TextEncoding::Utf8)?;

                current = Some(OpenFunction {
                    function: PdbFunction {
                        global: kind == S_GMANPROC,
                        ..PdbFunction::new(token, name, segment, start, length)
                    },
                    blocks: Vec::new(),
                });
            }
            (S_GMANPROC | S_LMANPROC, Some(_)) => {
                return Err(pdb_error!(stream, "procedure at {:#x} nests in another", at));
            }
            (S_BLOCK32, Some(open)) => {
                let _parent = read_le_at::<u32>(body, &mut cursor)?;
                let _end = read_le_at::<u32>(body, &mut cursor)?;
                let length = read_le_at::<u32>(body, &mut cursor)?;
                let start = read_le_at::<u32>(body, &mut cursor)?;
                let relative = start.checked_sub(open.function.offset).ok_or_else(|| {
                    pdb_error!(stream, "block at {:#x} starts before its function", at)
                })?;

                open.function.scopes.push(PdbScope {
                    parent: open.blocks.last().copied(),
                    offset: relative,
                    length,
                    ..PdbScope::default()
                });
                open.blocks.push(open.function.scopes.len() - 1);
            }
            (S_MANSLOT, Some(open)) => {
                let slot = read_le_at::<u32>(body, &mut cursor)?;
                let type_index = read_le_at::<u32>(body, &mut cursor)?;
                let _code_offset = read_le_at::<u32>(body, &mut cursor)?;
                let _code_segment = read_le_at::<u16>(body, &mut cursor)?;
                let flags = read_le_at::<u16>(body, &mut cursor)?;
                let name = read_cstring_at(body, &mut cursor, TextEncoding::Utf8)?;
                open.slots().push(PdbSlot {
                    slot,
                    type_index,
                    flags,
                    name,
                });
            }
            (S_UNAMESPACE, Some(open)) => {
                let name = read_cstring_at(body, &mut cursor, TextEncoding::Utf8)?;
                open.namespaces().push(name);
            }
            (S_OEM, Some(open)) => read_oem(&mut open.function, body, stream, options, at)?,
            (S_END, Some(open)) => closed = open.blocks.pop().is_none(),
            (S_END, None) => {
                return Err(pdb_error!(stream, "S_END at {:#x} closes nothing", at));
            }
            (S_BLOCK32 | S_MANSLOT | S_UNAMESPACE | S_OEM, None) => {
                unexpected(options, stream, kind, at, "outside a function")?;
            }
            _ => unexpected(options, stream, kind, at, "unknown record kind")?,
        }

        if closed {
            if let Some(done) = current.take() {
                functions.push(done.function);
            }
        }
    }

    if current.is_some() {
        return Err(pdb_error!(stream, "function is missing its S_END"));
    }
    if offset != data.len() {
        log::debug!("{}: {} trailing bytes after the symbol records", stream, data.len() - offset);
    }

    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdb::oem::CustomDebugInfo;

    fn slot(slot: u32, name: &str) -> PdbSlot {
        PdbSlot {
            slot,
            name: name.into(),
            ..PdbSlot::default()
        }
    }

    fn sample() -> PdbFunction {
        let mut function = PdbFunction::new(0x0600_0001, "Main", 1, 0x2050, 0x30);
        function.used_namespaces = vec!["USystem".into()];
        function.slots = vec![slot(0, "args")];
        function.custom_debug_info = vec![CustomDebugInfo::UsingCounts(vec![1])];
        function.scopes = vec![
            PdbScope {
                parent: None,
                offset: 2,
                length: 0x20,
                slots: vec![slot(1, "i")],
                ..PdbScope::default()
            },
            PdbScope {
                parent: Some(0),
                offset: 4,
                length: 8,
                slots: vec![slot(2, "j")],
                ..PdbScope::default()
            },
            PdbScope {
                parent: None,
                offset: 0x24,
                length: 4,
                ..PdbScope::default()
            },
        ];
        function
    }

    #[test]
    fn round_trip() {
        let mut local = PdbFunction::new(0x0600_0002, "Helper", 1, 0x2080, 4);
        local.global = false;
        let functions = vec![sample(), local];

        let (data, offsets) = write_symbols(&functions).unwrap();
        assert_eq!(&data[..4], &[4, 0, 0, 0]);
        assert_eq!(offsets[0], 4);
        assert_eq!(&data[6..8], &S_GMANPROC.to_le_bytes());
        assert_eq!(data.len() % 4, 0);

        let read = read_symbols(&data, "Sample", &PdbReadOptions::strict()).unwrap();
        assert_eq!(read, functions);
    }

    #[test]
    fn tree_pointers() {
        let (data, _) = write_symbols(&[sample()]).unwrap();

        let record_at = |offset: usize| {
            let length = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
            let kind = u16::from_le_bytes([data[offset + 2], data[offset + 3]]);
            (kind, offset + 2 + length)
        };
        let u32_at = |offset: usize| u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());

        // walk to the first block and check its parent and end
        let mut offset = 4;
        while record_at(offset).0 != S_BLOCK32 {
            offset = record_at(offset).1;
        }
        assert_eq!(u32_at(offset + 4), 4);
        let end = u32_at(offset + 8) as usize;
        assert_eq!(record_at(end).0, S_END);
        // absolute offset on disk
        assert_eq!(u32_at(offset + 16), 0x2052);

        let proc_end = u32_at(4 + 8) as usize;
        assert_eq!(record_at(proc_end).0, S_END);
        assert_eq!(record_at(proc_end).1, data.len());
    }

    #[test]
    fn scope_order() {
        let mut function = sample();
        function.scopes[0].parent = Some(1);
        assert!(write_symbols(&[function]).is_err());

        // [A, B, child of A] is parent-first but not pre-order
        let mut function = sample();
        function.scopes[1].parent = None;
        function.scopes[2].parent = Some(0);
        assert!(check_scope_order(&function.scopes).is_err());
    }

    #[test]
    fn unknown_records() {
        let mut writer = RecordWriter::with_prefix(&C13_SIGNATURE.to_le_bytes());
        let start = writer.begin(0x1101);
        let (data, offset) = writer.data();
        write_bytes_at(data, offset, b"obj\0");
        writer.finish(start).unwrap();
        let (symbols, _) = write_symbols(&[sample()]).unwrap();
        let mut data = writer.into_inner();
        data.extend_from_slice(&symbols[4..]);

        assert!(matches!(
            read_symbols(&data, "Sample", &PdbReadOptions::strict()),
            Err(crate::Error::Pdb { .. })
        ));
        assert_eq!(
            read_symbols(&data, "Sample", &PdbReadOptions::lenient()).unwrap(),
            vec![sample()]
        );
    }

    #[test]
    fn unbalanced() {
        let (data, _) = write_symbols(&[sample()]).unwrap();
        // drop the final S_END
        let truncated = &data[..data.len() - 4];
        assert!(matches!(
            read_symbols(truncated, "Sample", &PdbReadOptions::lenient()),
            Err(crate::Error::Pdb { ref stream, .. }) if stream == "Sample"
        ));

        let mut stray = C13_SIGNATURE.to_le_bytes().to_vec();
        stray.extend([2, 0, 6, 0]);
        assert!(read_symbols(&stray, "Sample", &PdbReadOptions::lenient()).is_err());

        assert!(read_symbols(&[1, 0, 0, 0], "Sample", &PdbReadOptions::lenient()).is_err());
    }
}
