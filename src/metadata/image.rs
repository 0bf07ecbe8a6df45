//! Read access to the CLI parts of a managed PE image.
//!
//! [`CliImage`] parses the PE container with `goblin`, follows data directory 14 to the
//! [`Cor20Header`], reads the metadata [`Module`] and decodes every IL method body the
//! `MethodDef` table points at. Writing PE images is out of scope; the pieces a PE writer
//! needs ([`Cor20Header::write`], [`crate::metadata::write_module`], [`MethodBody::write`])
//! are available separately.
//!
//! # Example
//!
//! ```rust,no_run
//! use dotcodec::metadata::image::CliImage;
//! use std::path::Path;
//!
//! let image = CliImage::from_file(Path::new("HelloWorld.dll"))?;
//! for (method, body) in image.method_bodies() {
//!     println!("{method}: {} instructions", body.instructions.len());
//! }
//! # Ok::<(), dotcodec::Error>(())
//! ```

use std::{collections::BTreeMap, path::Path};

use goblin::pe::PE;

use crate::{
    metadata::{
        cor20header::{ComImageFlags, Cor20Header, COR20_HEADER_SIZE},
        method::MethodBody,
        module::Module,
        options::ReadOptions,
        reader::read_module,
        tables::{MethodDefRow, MethodImplAttributes, TableId},
        token::TableIndex,
    },
    Error::{Empty, GoblinErr, OutOfBounds},
    Result,
};

/// Code type bits of `MethodDef.ImplFlags`
const CODE_TYPE_MASK: u16 = 0x0003;

/// Placement of one PE section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSection {
    /// Section name, NUL padded
    pub name: [u8; 8],
    /// RVA of the first byte
    pub virtual_address: u32,
    /// Size once mapped
    pub virtual_size: u32,
    /// File offset of the raw data
    pub pointer_to_raw_data: u32,
    /// Size of the raw data in the file
    pub size_of_raw_data: u32,
}

impl ImageSection {
    /// The file offset of `rva` if it falls inside this section
    fn offset_of(&self, rva: u32) -> Option<usize> {
        let size = self.virtual_size.max(self.size_of_raw_data);
        let end = u64::from(self.virtual_address) + u64::from(size);
        if rva < self.virtual_address || u64::from(rva) >= end {
            return None;
        }

        let delta = rva - self.virtual_address;
        if delta >= self.size_of_raw_data {
            // Mapped but not backed by file data
            return None;
        }
        Some(self.pointer_to_raw_data as usize + delta as usize)
    }
}

/// A managed PE image with its metadata and method bodies decoded
pub struct CliImage {
    data: Vec<u8>,
    sections: Vec<ImageSection>,
    cor20: Cor20Header,
    module: Module,
    bodies: BTreeMap<TableIndex, MethodBody>,
}

impl CliImage {
    /// Load an image from disk
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, otherwise the errors of
    /// [`CliImage::from_mem`]
    pub fn from_file(path: &Path) -> Result<CliImage> {
        Self::from_mem(std::fs::read(path)?)
    }

    /// Load an image from memory with default [`ReadOptions`]
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::GoblinErr`] if the PE
    /// container does not parse, and [`crate::Error::Malformed`] if the CLI header, metadata
    /// or a method body is invalid
    pub fn from_mem(data: Vec<u8>) -> Result<CliImage> {
        Self::from_mem_with_options(data, &ReadOptions::default())
    }

    /// Load an image from memory
    ///
    /// # Errors
    /// Same as [`CliImage::from_mem`]
    pub fn from_mem_with_options(data: Vec<u8>, options: &ReadOptions) -> Result<CliImage> {
        if data.is_empty() {
            return Err(Empty);
        }

        let (sections, clr_rva, clr_size) = {
            let pe = PE::parse(&data).map_err(GoblinErr)?;
            let Some(optional_header) = pe.header.optional_header else {
                return Err(malformed_error!("File does not have an OptionalHeader"));
            };
            let Some(clr) = optional_header.data_directories.get_clr_runtime_header() else {
                return Err(malformed_error!(
                    "File does not have a CLR runtime header directory"
                ));
            };

            let sections = pe
                .sections
                .iter()
                .map(|section| ImageSection {
                    name: section.name,
                    virtual_address: section.virtual_address,
                    virtual_size: section.virtual_size,
                    pointer_to_raw_data: section.pointer_to_raw_data,
                    size_of_raw_data: section.size_of_raw_data,
                })
                .collect::<Vec<_>>();
            (sections, clr.virtual_address, clr.size)
        };

        if (clr_size as usize) < COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "CLR runtime header directory is {} bytes",
                clr_size
            ));
        }

        let mut image = CliImage {
            data,
            sections,
            cor20: Cor20Header::default(),
            module: Module::new(),
            bodies: BTreeMap::new(),
        };

        image.cor20 = Cor20Header::read(image.read_rva(clr_rva, COR20_HEADER_SIZE)?)?;
        image.module = read_module(
            image.read_rva(image.cor20.meta_data_rva, image.cor20.meta_data_size as usize)?,
            options,
        )?;
        image.bodies = image.decode_bodies()?;

        log::trace!(
            "Loaded image with {} sections and {} method bodies",
            image.sections.len(),
            image.bodies.len()
        );
        Ok(image)
    }

    fn decode_bodies(&self) -> Result<BTreeMap<TableIndex, MethodBody>> {
        let mut bodies = BTreeMap::new();
        let Some(methods) = self.module.table::<MethodDefRow>() else {
            return Ok(bodies);
        };

        for (index, method) in methods.iter().enumerate() {
            if method.rva == 0 || !has_il_body(method.impl_flags) {
                continue;
            }

            let offset = self.rva_to_offset(method.rva)?;
            let body = MethodBody::read(&self.data[offset..], self.module.user_strings())?;
            bodies.insert(TableIndex::from_usize(TableId::MethodDef.into(), index)?, body);
        }

        Ok(bodies)
    }

    /// The raw image bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The section table
    #[must_use]
    pub fn sections(&self) -> &[ImageSection] {
        &self.sections
    }

    /// The CLI header
    #[must_use]
    pub fn cor20_header(&self) -> &Cor20Header {
        &self.cor20
    }

    /// The metadata
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Take the metadata, dropping everything else
    #[must_use]
    pub fn into_module(self) -> Module {
        self.module
    }

    /// The body of a `MethodDef` row, `None` for abstract, runtime and native methods
    #[must_use]
    pub fn method_body(&self, method: TableIndex) -> Option<&MethodBody> {
        self.bodies.get(&method)
    }

    /// Every decoded body in `MethodDef` order
    pub fn method_bodies(&self) -> impl Iterator<Item = (TableIndex, &MethodBody)> {
        self.bodies.iter().map(|(index, body)| (*index, body))
    }

    /// Translate an RVA to a file offset
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no section maps `rva` to file data
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        self.sections
            .iter()
            .find_map(|section| section.offset_of(rva))
            .ok_or_else(|| malformed_error!("RVA could not be converted to offset - {:#x}", rva))
    }

    /// Borrow `len` bytes of file data at `rva`
    ///
    /// # Errors
    /// Returns an error if `rva` is unmapped or the range runs past the end of the file
    pub fn read_rva(&self, rva: u32, len: usize) -> Result<&[u8]> {
        let offset = self.rva_to_offset(rva)?;
        let end = offset.checked_add(len).ok_or(OutOfBounds)?;
        self.data.get(offset..end).ok_or(OutOfBounds)
    }
}

fn has_il_body(flags: MethodImplAttributes) -> bool {
    flags.bits() & CODE_TYPE_MASK == 0
}

/// Compares CLI headers, ignoring what an image writer regenerates.
///
/// Strong-name signing, metadata placement and resource placement all change when an image
/// is rebuilt from the same metadata, so by default they are not compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageComparer {
    /// Skip the strong-name signature directory and the `STRONG_NAME_SIGNED` flag
    pub ignore_strong_name: bool,
    /// Skip the metadata RVA and size
    pub ignore_metadata_location: bool,
    /// Skip the managed resources RVA
    pub ignore_resource_location: bool,
}

impl Default for ImageComparer {
    fn default() -> Self {
        ImageComparer {
            ignore_strong_name: true,
            ignore_metadata_location: true,
            ignore_resource_location: true,
        }
    }
}

impl ImageComparer {
    /// Compare every field
    #[must_use]
    pub fn exact() -> Self {
        ImageComparer {
            ignore_strong_name: false,
            ignore_metadata_location: false,
            ignore_resource_location: false,
        }
    }

    /// Names of the fields that differ
    #[must_use]
    pub fn differences(&self, left: &Cor20Header, right: &Cor20Header) -> Vec<&'static str> {
        let mut flag_mask = u32::MAX;
        if self.ignore_strong_name {
            flag_mask &= !ComImageFlags::STRONG_NAME_SIGNED.bits();
        }

        let mut checks = vec![
            ("cb", left.cb == right.cb),
            (
                "runtime_version",
                (left.major_runtime_version, left.minor_runtime_version)
                    == (right.major_runtime_version, right.minor_runtime_version),
            ),
            (
                "flags",
                left.flags.bits() & flag_mask == right.flags.bits() & flag_mask,
            ),
            (
                "entry_point_token",
                left.entry_point_token == right.entry_point_token,
            ),
            ("resource_size", left.resource_size == right.resource_size),
            (
                "code_manager_table",
                (left.code_manager_table_rva, left.code_manager_table_size)
                    == (right.code_manager_table_rva, right.code_manager_table_size),
            ),
            (
                "vtable_fixups",
                (left.vtable_fixups_rva, left.vtable_fixups_size)
                    == (right.vtable_fixups_rva, right.vtable_fixups_size),
            ),
            (
                "export_address_table_jmp",
                (left.export_address_table_jmp_rva, left.export_address_table_jmp_size)
                    == (right.export_address_table_jmp_rva, right.export_address_table_jmp_size),
            ),
            (
                "managed_native_header",
                (left.managed_native_header_rva, left.managed_native_header_size)
                    == (right.managed_native_header_rva, right.managed_native_header_size),
            ),
        ];
        if !self.ignore_strong_name {
            checks.push((
                "strong_name_signature",
                (left.strong_name_signature_rva, left.strong_name_signature_size)
                    == (right.strong_name_signature_rva, right.strong_name_signature_size),
            ));
        }
        if !self.ignore_metadata_location {
            checks.push((
                "meta_data",
                (left.meta_data_rva, left.meta_data_size)
                    == (right.meta_data_rva, right.meta_data_size),
            ));
        }
        if !self.ignore_resource_location {
            checks.push(("resource_rva", left.resource_rva == right.resource_rva));
        }

        checks
            .into_iter()
            .filter_map(|(name, equal)| (!equal).then_some(name))
            .collect()
    }

    /// True if no compared field differs
    #[must_use]
    pub fn equal(&self, left: &Cor20Header, right: &Cor20Header) -> bool {
        self.differences(left, right).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disassembler::{Instruction, Operand},
        metadata::{
            method::{ExceptionClause, ExceptionClauseKind},
            tables::{MemberRefRow, TypeDefRow, TypeRefRow},
            token::Token,
        },
        test::{build_image, ImageMethod},
        Error,
    };

    fn hello_world() -> (Module, Vec<ImageMethod>) {
        let mut module = Module::new();
        let console = module
            .table_mut::<TypeRefRow>()
            .unwrap()
            .push(TypeRefRow {
                name: "Console".into(),
                namespace: "System".into(),
                ..TypeRefRow::default()
            })
            .unwrap();
        let write_line = module
            .table_mut::<MemberRefRow>()
            .unwrap()
            .push(MemberRefRow {
                class: console,
                name: "WriteLine".into(),
                signature: vec![0x00, 0x01, 0x01, 0x0E],
            })
            .unwrap();
        module
            .table_mut::<TypeDefRow>()
            .unwrap()
            .push(TypeDefRow {
                name: "Program".into(),
                field_list: TableIndex::new(TableId::Field, 0).unwrap(),
                method_list: TableIndex::new(TableId::MethodDef, 0).unwrap(),
                ..TypeDefRow::default()
            })
            .unwrap();

        let main = MethodBody {
            instructions: vec![
                Instruction::new("ldstr", Operand::String("Hello, World!".into())).unwrap(),
                Instruction::new("call", Operand::Token(write_line)).unwrap(),
                Instruction::simple("ret").unwrap(),
            ],
            ..MethodBody::default()
        };
        let guarded = MethodBody {
            max_stack: 2,
            instructions: vec![
                Instruction::simple("nop").unwrap(),
                Instruction::new("leave.s", Operand::BranchShort(2)).unwrap(),
                Instruction::simple("nop").unwrap(),
                Instruction::simple("endfinally").unwrap(),
                Instruction::simple("ret").unwrap(),
            ],
            exception_clauses: vec![ExceptionClause {
                kind: ExceptionClauseKind::Finally,
                try_offset: 0,
                try_length: 3,
                handler_offset: 3,
                handler_length: 2,
            }],
            ..MethodBody::default()
        };

        let methods = vec![
            ImageMethod::with_body("Main", main),
            ImageMethod::abstract_method("Run"),
            ImageMethod::with_body("Guarded", guarded),
        ];
        (module, methods)
    }

    #[test]
    fn load_hello_world() {
        let (module, methods) = hello_world();
        let (bytes, written) = build_image(module, &methods).unwrap();

        let image = CliImage::from_mem(bytes).unwrap();
        assert_eq!(image.sections().len(), 1);
        assert_eq!(&image.sections()[0].name[..5], b".text");
        assert!(ImageComparer::exact().equal(image.cor20_header(), &written));

        let methods_table = image.module().table::<MethodDefRow>().unwrap();
        assert_eq!(methods_table.len(), 3);
        assert_eq!(image.method_bodies().count(), 2);

        let main = image
            .method_body(TableIndex::new(TableId::MethodDef, 0).unwrap())
            .unwrap();
        assert_eq!(
            main.instructions[0].operand,
            Operand::String("Hello, World!".into())
        );
        assert_eq!(main.max_stack, 8);

        assert!(image
            .method_body(TableIndex::new(TableId::MethodDef, 1).unwrap())
            .is_none());

        let guarded = image
            .method_body(TableIndex::new(TableId::MethodDef, 2).unwrap())
            .unwrap();
        assert_eq!(guarded.max_stack, 2);
        assert_eq!(guarded.exception_clauses.len(), 1);
    }

    #[test]
    fn rva_mapping() {
        let (module, methods) = hello_world();
        let (bytes, written) = build_image(module, &methods).unwrap();
        let image = CliImage::from_mem(bytes).unwrap();

        let text = image.sections()[0];
        assert_eq!(
            image.rva_to_offset(text.virtual_address).unwrap(),
            text.pointer_to_raw_data as usize
        );
        assert!(image.rva_to_offset(text.virtual_address - 1).is_err());
        assert!(image
            .rva_to_offset(text.virtual_address + text.size_of_raw_data)
            .is_err());

        let root = image.read_rva(written.meta_data_rva, 4).unwrap();
        assert_eq!(root, b"BSJB");
    }

    #[test]
    fn rejects_non_images() {
        assert!(matches!(CliImage::from_mem(Vec::new()), Err(Error::Empty)));
        assert!(matches!(
            CliImage::from_mem(vec![0u8; 256]),
            Err(Error::GoblinErr(_))
        ));
    }

    #[test]
    fn comparer() {
        let original = Cor20Header {
            meta_data_rva: 0x2050,
            meta_data_size: 0x400,
            flags: ComImageFlags::IL_ONLY | ComImageFlags::STRONG_NAME_SIGNED,
            entry_point_token: Token::new(0x0600_0001),
            strong_name_signature_rva: 0x2800,
            strong_name_signature_size: 0x80,
            ..Cor20Header::default()
        };
        let rebuilt = Cor20Header {
            meta_data_rva: 0x2100,
            meta_data_size: 0x420,
            flags: ComImageFlags::IL_ONLY,
            strong_name_signature_rva: 0,
            strong_name_signature_size: 0,
            ..original.clone()
        };

        assert!(ImageComparer::default().equal(&original, &rebuilt));
        assert_eq!(
            ImageComparer::exact().differences(&original, &rebuilt),
            vec!["flags", "strong_name_signature", "meta_data"]
        );

        let retargeted = Cor20Header {
            entry_point_token: Token::new(0x0600_0002),
            ..rebuilt
        };
        assert_eq!(
            ImageComparer::default().differences(&original, &retargeted),
            vec!["entry_point_token"]
        );
    }
}
