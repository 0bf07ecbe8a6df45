//! Managed OEM payloads attached to functions: the `MD2` custom debug information and the
//! `asyncMethodInfo` stepping information.
//!
//! Both travel in `S_OEM` records tagged with [`MANAGED_OEM_GUID`] and a UTF-16 name.
//!
//! The `MD2` blob is a global header (version 4, record count, two bytes of padding) followed
//! by records, each with an eight byte header:
//!
//! ```text
//! u8 version   u8 kind   u8 reserved   u8 alignment padding   u32 size (header included)
//! ```

use uguid::{guid, Guid};

use crate::{
    file::io::{
        pad_to, read_bytes_at, read_cstring_at, read_le_at, write_bytes_at, write_cstring_at,
        write_le_at, TextEncoding,
    },
    Result,
};

/// GUID of the managed OEM records
pub const MANAGED_OEM_GUID: Guid = guid!("C6EA3FC9-59B3-49D6-BC25-0902BBABB460");

/// OEM name of custom debug information
pub const MD2_NAME: &str = "MD2";

/// OEM name of async stepping information
pub const ASYNC_METHOD_INFO_NAME: &str = "asyncMethodInfo";

/// Version of the `MD2` blob and of the records it understands
pub const CDI_VERSION: u8 = 4;

const RECORD_HEADER_SIZE: usize = 8;

/// A hoisted local scope of a state machine, as IL offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoistedLocalScope {
    /// First IL offset
    pub start_offset: u32,
    /// Last IL offset
    pub end_offset: u32,
}

/// One custom debug information record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomDebugInfo {
    /// Number of `using` namespaces per nested namespace scope (kind 0)
    UsingCounts(Vec<u16>),
    /// Take the namespaces of another method (kind 1)
    ForwardMethod(u32),
    /// Take the module-level namespaces of another method (kind 2)
    ForwardModule(u32),
    /// Scopes of hoisted locals of a state machine (kind 3)
    StateMachineHoistedLocalScopes(Vec<HoistedLocalScope>),
    /// Name of the iterator class (kind 4)
    ForwardIterator(String),
    /// A record of another kind or version, kept verbatim
    Unknown {
        /// Record version
        version: u8,
        /// Record kind
        kind: u8,
        /// Payload without header and padding
        data: Vec<u8>,
    },
}

impl CustomDebugInfo {
    /// Record kind byte
    #[must_use]
    pub fn kind(&self) -> u8 {
        match self {
            CustomDebugInfo::UsingCounts(_) => 0,
            CustomDebugInfo::ForwardMethod(_) => 1,
            CustomDebugInfo::ForwardModule(_) => 2,
            CustomDebugInfo::StateMachineHoistedLocalScopes(_) => 3,
            CustomDebugInfo::ForwardIterator(_) => 4,
            CustomDebugInfo::Unknown { kind, .. } => *kind,
        }
    }

    fn read_payload(kind: u8, data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        Ok(match kind {
            0 => {
                let count = read_le_at::<u16>(data, &mut offset)?;
                let mut counts = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    counts.push(read_le_at::<u16>(data, &mut offset)?);
                }
                CustomDebugInfo::UsingCounts(counts)
            }
            1 => CustomDebugInfo::ForwardMethod(read_le_at::<u32>(data, &mut offset)?),
            2 => CustomDebugInfo::ForwardModule(read_le_at::<u32>(data, &mut offset)?),
            3 => {
                let count = read_le_at::<u32>(data, &mut offset)? as usize;
                if count > data.len() / 8 {
                    return Err(malformed_error!("{} hoisted scopes exceed their record", count));
                }
                let mut scopes = Vec::with_capacity(count);
                for _ in 0..count {
                    scopes.push(HoistedLocalScope {
                        start_offset: read_le_at::<u32>(data, &mut offset)?,
                        end_offset: read_le_at::<u32>(data, &mut offset)?,
                    });
                }
                CustomDebugInfo::StateMachineHoistedLocalScopes(scopes)
            }
            4 => CustomDebugInfo::ForwardIterator(read_cstring_at(
                data,
                &mut offset,
                TextEncoding::Utf16Le,
            )?),
            _ => CustomDebugInfo::Unknown {
                version: CDI_VERSION,
                kind,
                data: data.to_vec(),
            },
        })
    }

    fn write_payload(&self, data: &mut Vec<u8>, offset: &mut usize) -> Result<()> {
        match self {
            CustomDebugInfo::UsingCounts(counts) => {
                let count = u16::try_from(counts.len())
                    .map_err(|_| malformed_error!("{} using counts", counts.len()))?;
                write_le_at(data, offset, count);
                for value in counts {
                    write_le_at(data, offset, *value);
                }
            }
            CustomDebugInfo::ForwardMethod(token) | CustomDebugInfo::ForwardModule(token) => {
                write_le_at(data, offset, *token);
            }
            CustomDebugInfo::StateMachineHoistedLocalScopes(scopes) => {
                write_le_at(data, offset, scopes.len() as u32);
                for scope in scopes {
                    write_le_at(data, offset, scope.start_offset);
                    write_le_at(data, offset, scope.end_offset);
                }
            }
            CustomDebugInfo::ForwardIterator(name) => {
                write_cstring_at(data, offset, name, TextEncoding::Utf16Le)?;
            }
            CustomDebugInfo::Unknown { data: payload, .. } => {
                write_bytes_at(data, offset, payload);
            }
        }
        Ok(())
    }
}

/// Parse an `MD2` blob
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a blob of another version, a record whose size is
/// smaller than its header or runs past the blob
pub fn read_custom_debug_info(data: &[u8]) -> Result<Vec<CustomDebugInfo>> {
    let mut offset = 0;
    let version = read_le_at::<u8>(data, &mut offset)?;
    let count = read_le_at::<u8>(data, &mut offset)?;
    offset += 2;
    if version != CDI_VERSION {
        return Err(malformed_error!("Unsupported custom debug info version {}", version));
    }

    let mut records = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let start = offset;
        let record_version = read_le_at::<u8>(data, &mut offset)?;
        let kind = read_le_at::<u8>(data, &mut offset)?;
        let _reserved = read_le_at::<u8>(data, &mut offset)?;
        let padding = read_le_at::<u8>(data, &mut offset)? as usize;
        let size = read_le_at::<u32>(data, &mut offset)? as usize;
        if size < RECORD_HEADER_SIZE + padding {
            return Err(malformed_error!("Custom debug info record of size {}", size));
        }

        let mut payload_offset = offset;
        let payload = read_bytes_at(data, &mut payload_offset, size - RECORD_HEADER_SIZE - padding)?;
        offset = start + size;
        if offset > data.len() {
            return Err(malformed_error!("Custom debug info record runs past its blob"));
        }

        records.push(if record_version == CDI_VERSION {
            CustomDebugInfo::read_payload(kind, payload)?
        } else {
            log::debug!("keeping custom debug info of version {}", record_version);
            CustomDebugInfo::Unknown {
                version: record_version,
                kind,
                data: payload.to_vec(),
            }
        });
    }

    Ok(records)
}

/// Serialize an `MD2` blob
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for more than 255 records or a record that can not be
/// stored
pub fn write_custom_debug_info(records: &[CustomDebugInfo]) -> Result<Vec<u8>> {
    let count = u8::try_from(records.len())
        .map_err(|_| malformed_error!("{} custom debug info records", records.len()))?;

    let mut data = Vec::new();
    let mut offset = 0;
    write_le_at(&mut data, &mut offset, CDI_VERSION);
    write_le_at(&mut data, &mut offset, count);
    pad_to(&mut data, &mut offset, 4);

    for record in records {
        let version = match record {
            CustomDebugInfo::Unknown { version, .. } => *version,
            _ => CDI_VERSION,
        };

        let mut payload = Vec::new();
        let mut payload_size = 0;
        record.write_payload(&mut payload, &mut payload_size)?;
        let padding = crate::file::io::align4(payload_size) - payload_size;

        write_le_at(&mut data, &mut offset, version);
        write_le_at(&mut data, &mut offset, record.kind());
        write_le_at(&mut data, &mut offset, 0u8);
        write_le_at(&mut data, &mut offset, padding as u8);
        write_le_at(&mut data, &mut offset, (RECORD_HEADER_SIZE + payload_size + padding) as u32);
        write_bytes_at(&mut data, &mut offset, &payload);
        pad_to(&mut data, &mut offset, 4);
    }

    Ok(data)
}

/// One `await` of an async method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncStep {
    /// IL offset of the yield
    pub yield_offset: u32,
    /// IL offset where execution resumes
    pub resume_offset: u32,
    /// Token of the method that resumes
    pub resume_method: u32,
}

/// Stepping information of an async method's `MoveNext`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncMethodInfo {
    /// Token of the user-visible async method
    pub kickoff_method: u32,
    /// IL offset of the generated catch handler, `0xFFFFFFFF` if none
    pub catch_handler_offset: u32,
    /// Awaits in IL order
    pub steps: Vec<AsyncStep>,
}

impl AsyncMethodInfo {
    /// Parse the payload
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the steps exceed the payload
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let kickoff_method = read_le_at::<u32>(data, &mut offset)?;
        let catch_handler_offset = read_le_at::<u32>(data, &mut offset)?;
        let count = read_le_at::<u32>(data, &mut offset)? as usize;
        if count > data.len() / 12 {
            return Err(crate::Error::OutOfBounds);
        }

        let mut steps = Vec::with_capacity(count);
        for _ in 0..count {
            steps.push(AsyncStep {
                yield_offset: read_le_at::<u32>(data, &mut offset)?,
                resume_offset: read_le_at::<u32>(data, &mut offset)?,
                resume_method: read_le_at::<u32>(data, &mut offset)?,
            });
        }

        Ok(AsyncMethodInfo {
            kickoff_method,
            catch_handler_offset,
            steps,
        })
    }

    /// Serialize the payload
    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(12 + 12 * self.steps.len());
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, self.kickoff_method);
        write_le_at(&mut data, &mut offset, self.catch_handler_offset);
        write_le_at(&mut data, &mut offset, self.steps.len() as u32);
        for step in &self.steps {
            write_le_at(&mut data, &mut offset, step.yield_offset);
            write_le_at(&mut data, &mut offset, step.resume_offset);
            write_le_at(&mut data, &mut offset, step.resume_method);
        }
        data
    }
}
