//! CLI (Cor20) header, found through data directory 14 of a managed PE image.
//!
//! # Reference
//! - [ECMA-335 II.25.3.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::{
    file::{io::write_le_at, parser::Parser},
    metadata::token::Token,
    Error::OutOfBounds,
    Result,
};

/// Size of the header on disk; also the only valid value of [`Cor20Header::cb`]
pub const COR20_HEADER_SIZE: usize = 72;

bitflags! {
    /// Runtime flags of the CLI header
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ComImageFlags: u32 {
        /// The image contains only IL
        const IL_ONLY = 0x0000_0001;
        /// The image can only be loaded into a 32-bit process
        const REQUIRED_32BIT = 0x0000_0002;
        /// The image is an IL library
        const IL_LIBRARY = 0x0000_0004;
        /// The image carries a strong name signature
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// The entry point is a native RVA, not a token
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        /// Debug data is tracked
        const TRACK_DEBUG_DATA = 0x0001_0000;
        /// Prefer a 32-bit process where available
        const PREFERRED_32BIT = 0x0002_0000;
    }
}

/// The CLI header.
///
/// Unknown flag bits are kept, so a header reads and writes back unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cor20Header {
    /// Size of header in bytes, 72
    pub cb: u32,
    /// The minimum version of runtime required to run this program
    pub major_runtime_version: u16,
    /// The minor portion of the version
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata
    pub meta_data_size: u32,
    /// Flags describing this runtime
    pub flags: ComImageFlags,
    /// `MethodDef` or `File` token of the entry point, or a native RVA
    pub entry_point_token: Token,
    /// RVA of managed resources
    pub resource_rva: u32,
    /// Size of managed resources
    pub resource_size: u32,
    /// RVA of the strong name signature
    pub strong_name_signature_rva: u32,
    /// Size of the strong name signature
    pub strong_name_signature_size: u32,
    /// Always 0
    pub code_manager_table_rva: u32,
    /// Always 0
    pub code_manager_table_size: u32,
    /// RVA of the vtable fixup array
    pub vtable_fixups_rva: u32,
    /// Size of the vtable fixup array
    pub vtable_fixups_size: u32,
    /// Always 0
    pub export_address_table_jmp_rva: u32,
    /// Always 0
    pub export_address_table_jmp_size: u32,
    /// Always 0 outside of precompiled images
    pub managed_native_header_rva: u32,
    /// Always 0 outside of precompiled images
    pub managed_native_header_size: u32,
}

impl Default for Cor20Header {
    fn default() -> Self {
        Cor20Header {
            cb: COR20_HEADER_SIZE as u32,
            major_runtime_version: 2,
            minor_runtime_version: 5,
            meta_data_rva: 0,
            meta_data_size: 0,
            flags: ComImageFlags::IL_ONLY,
            entry_point_token: Token::new(0),
            resource_rva: 0,
            resource_size: 0,
            strong_name_signature_rva: 0,
            strong_name_signature_size: 0,
            code_manager_table_rva: 0,
            code_manager_table_size: 0,
            vtable_fixups_rva: 0,
            vtable_fixups_size: 0,
            export_address_table_jmp_rva: 0,
            export_address_table_jmp_size: 0,
            managed_native_header_rva: 0,
            managed_native_header_size: 0,
        }
    }
}

impl Cor20Header {
    /// Parse the header at the start of `data`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for short data and [`crate::Error::Malformed`] for
    /// a wrong size field, a missing metadata directory or inconsistent RVA/size pairs
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < COR20_HEADER_SIZE {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb as usize != COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let header = Cor20Header {
            cb,
            major_runtime_version: parser.read_le::<u16>()?,
            minor_runtime_version: parser.read_le::<u16>()?,
            meta_data_rva: parser.read_le::<u32>()?,
            meta_data_size: parser.read_le::<u32>()?,
            flags: ComImageFlags::from_bits_retain(parser.read_le::<u32>()?),
            entry_point_token: Token::new(parser.read_le::<u32>()?),
            resource_rva: parser.read_le::<u32>()?,
            resource_size: parser.read_le::<u32>()?,
            strong_name_signature_rva: parser.read_le::<u32>()?,
            strong_name_signature_size: parser.read_le::<u32>()?,
            code_manager_table_rva: parser.read_le::<u32>()?,
            code_manager_table_size: parser.read_le::<u32>()?,
            vtable_fixups_rva: parser.read_le::<u32>()?,
            vtable_fixups_size: parser.read_le::<u32>()?,
            export_address_table_jmp_rva: parser.read_le::<u32>()?,
            export_address_table_jmp_size: parser.read_le::<u32>()?,
            managed_native_header_rva: parser.read_le::<u32>()?,
            managed_native_header_size: parser.read_le::<u32>()?,
        };

        if header.meta_data_rva == 0 || header.meta_data_size == 0 {
            return Err(malformed_error!("CLI header has no metadata directory"));
        }

        for (name, rva, size) in [
            ("Resource", header.resource_rva, header.resource_size),
            (
                "Strong name",
                header.strong_name_signature_rva,
                header.strong_name_signature_size,
            ),
            (
                "VTable fixup",
                header.vtable_fixups_rva,
                header.vtable_fixups_size,
            ),
        ] {
            if (rva == 0) != (size == 0) {
                return Err(malformed_error!(
                    "{} directory is inconsistent - rva {:#x}, size {:#x}",
                    name,
                    rva,
                    size
                ));
            }
        }

        Ok(header)
    }

    /// Write the header at `offset`
    pub fn write(&self, buffer: &mut Vec<u8>, offset: &mut usize) {
        write_le_at(buffer, offset, self.cb);
        write_le_at(buffer, offset, self.major_runtime_version);
        write_le_at(buffer, offset, self.minor_runtime_version);
        for value in [
            self.meta_data_rva,
            self.meta_data_size,
            self.flags.bits(),
            self.entry_point_token.value(),
            self.resource_rva,
            self.resource_size,
            self.strong_name_signature_rva,
            self.strong_name_signature_size,
            self.code_manager_table_rva,
            self.code_manager_table_size,
            self.vtable_fixups_rva,
            self.vtable_fixups_size,
            self.export_address_table_jmp_rva,
            self.export_address_table_jmp_size,
            self.managed_native_header_rva,
            self.managed_native_header_size,
        ] {
            write_le_at(buffer, offset, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const HEADER: [u8; 72] = [
        0x48, 0x00, 0x00, 0x00, // cb = 72 (0x48)
        0x02, 0x00,             // major_runtime_version = 2
        0x05, 0x00,             // minor_runtime_version = 5
        0x00, 0x20, 0x00, 0x00, // meta_data_rva = 0x2000
        0x80, 0x01, 0x00, 0x00, // meta_data_size = 0x180
        0x09, 0x00, 0x02, 0x00, // flags = IL_ONLY | STRONG_NAME_SIGNED | PREFERRED_32BIT
        0x01, 0x00, 0x00, 0x06, // entry_point_token = 0x06000001
        0x00, 0x00, 0x00, 0x00, // resource_rva = 0 (no resources)
        0x00, 0x00, 0x00, 0x00, // resource_size = 0
        0x00, 0x30, 0x00, 0x00, // strong_name_signature_rva = 0x3000
        0x80, 0x00, 0x00, 0x00, // strong_name_signature_size = 0x80
        0x00, 0x00, 0x00, 0x00, // code_manager_table_rva = 0 (reserved)
        0x00, 0x00, 0x00, 0x00, // code_manager_table_size = 0 (reserved)
        0x00, 0x00, 0x00, 0x00, // vtable_fixups_rva = 0
        0x00, 0x00, 0x00, 0x00, // vtable_fixups_size = 0
        0x00, 0x00, 0x00, 0x00, // export_address_table_jmp_rva = 0 (reserved)
        0x00, 0x00, 0x00, 0x00, // export_address_table_jmp_size = 0 (reserved)
        0x00, 0x00, 0x00, 0x00, // managed_native_header_rva = 0 (reserved)
        0x00, 0x00, 0x00, 0x00  // managed_native_header_size = 0 (reserved)
    ];

    #[test]
    fn crafted() {
        let header = Cor20Header::read(&HEADER).unwrap();
        assert_eq!(header.cb, 72);
        assert_eq!(header.minor_runtime_version, 5);
        assert_eq!(header.meta_data_rva, 0x2000);
        assert!(header.flags.contains(ComImageFlags::STRONG_NAME_SIGNED));
        assert!(header.flags.contains(ComImageFlags::PREFERRED_32BIT));
        assert_eq!(header.entry_point_token.value(), 0x0600_0001);
        assert_eq!(header.strong_name_signature_size, 0x80);

        let mut buffer = Vec::new();
        header.write(&mut buffer, &mut 0);
        assert_eq!(buffer, HEADER);
    }

    #[test]
    fn invalid() {
        assert!(matches!(Cor20Header::read(&HEADER[..40]), Err(OutOfBounds)));

        let mut bad_size = HEADER;
        bad_size[0] = 0x40;
        assert!(Cor20Header::read(&bad_size).is_err());

        let mut half_pair = HEADER;
        half_pair[36] = 0;
        assert!(Cor20Header::read(&half_pair).is_err());
    }
}
