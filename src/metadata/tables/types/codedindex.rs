//! Coded indexes: table references multiplexed over several target tables.
//!
//! A coded index stores `(row << tag_bits) | tag`, where `row` is one-based and `tag` selects
//! one of the scheme's target tables (ECMA-335 II.24.2.6). Row `0` is the null reference
//! regardless of the tag.

use strum::{EnumCount, EnumIter};

use crate::{
    metadata::{
        tables::TableId,
        token::{TableIndex, TableKind},
    },
    Result,
};

/// The coded index schemes defined by ECMA-335.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef`, `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param`, `Property`
    HasConstant,
    /// Any table that can carry a custom attribute
    HasCustomAttribute,
    /// `Field`, `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef`, `Assembly`
    HasDeclSecurity,
    /// `TypeDef`, `TypeRef`, `ModuleRef`, `MethodDef`, `TypeSpec`
    MemberRefParent,
    /// `Event`, `Property`
    HasSemantics,
    /// `MethodDef`, `MemberRef`
    MethodDefOrRef,
    /// `Field`, `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef`, `ExportedType`
    Implementation,
    /// `MethodDef` or `MemberRef`, on tags 2 and 3 only
    CustomAttributeType,
    /// `Module`, `ModuleRef`, `AssemblyRef`, `TypeRef`
    ResolutionScope,
    /// `TypeDef`, `MethodDef`
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// Target table for each tag value; `None` marks tags the scheme reserves
    #[must_use]
    pub fn tables(&self) -> &'static [Option<TableId>] {
        match self {
            CodedIndexType::TypeDefOrRef => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasConstant => &[
                Some(TableId::Field),
                Some(TableId::Param),
                Some(TableId::Property),
            ],
            CodedIndexType::HasCustomAttribute => &[
                Some(TableId::MethodDef),
                Some(TableId::Field),
                Some(TableId::TypeRef),
                Some(TableId::TypeDef),
                Some(TableId::Param),
                Some(TableId::InterfaceImpl),
                Some(TableId::MemberRef),
                Some(TableId::Module),
                // Listed as 'Permission' in the standard, which is DeclSecurity
                Some(TableId::DeclSecurity),
                Some(TableId::Property),
                Some(TableId::Event),
                Some(TableId::StandAloneSig),
                Some(TableId::ModuleRef),
                Some(TableId::TypeSpec),
                Some(TableId::Assembly),
                Some(TableId::AssemblyRef),
                Some(TableId::File),
                Some(TableId::ExportedType),
                Some(TableId::ManifestResource),
                Some(TableId::GenericParam),
                Some(TableId::GenericParamConstraint),
                Some(TableId::MethodSpec),
            ],
            CodedIndexType::HasFieldMarshal => &[Some(TableId::Field), Some(TableId::Param)],
            CodedIndexType::HasDeclSecurity => &[
                Some(TableId::TypeDef),
                Some(TableId::MethodDef),
                Some(TableId::Assembly),
            ],
            CodedIndexType::MemberRefParent => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::ModuleRef),
                Some(TableId::MethodDef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasSemantics => &[Some(TableId::Event), Some(TableId::Property)],
            CodedIndexType::MethodDefOrRef => {
                &[Some(TableId::MethodDef), Some(TableId::MemberRef)]
            }
            CodedIndexType::MemberForwarded => &[Some(TableId::Field), Some(TableId::MethodDef)],
            CodedIndexType::Implementation => &[
                Some(TableId::File),
                Some(TableId::AssemblyRef),
                Some(TableId::ExportedType),
            ],
            CodedIndexType::CustomAttributeType => &[
                None,
                None,
                Some(TableId::MethodDef),
                Some(TableId::MemberRef),
                None,
            ],
            CodedIndexType::ResolutionScope => &[
                Some(TableId::Module),
                Some(TableId::ModuleRef),
                Some(TableId::AssemblyRef),
                Some(TableId::TypeRef),
            ],
            CodedIndexType::TypeOrMethodDef => &[Some(TableId::TypeDef), Some(TableId::MethodDef)],
        }
    }

    /// Number of low bits used for the tag
    #[must_use]
    pub fn tag_bits(&self) -> u32 {
        let options = self.tables().len() as u32;
        u32::BITS - (options - 1).leading_zeros()
    }

    /// Iterate over the concrete target tables of this scheme
    pub fn targets(&self) -> impl Iterator<Item = TableId> {
        self.tables().iter().flatten().copied()
    }

    /// True if `kind` is a legal target of this scheme
    #[must_use]
    pub fn accepts(&self, kind: TableKind) -> bool {
        self.targets().any(|id| TableKind::from(id) == kind)
    }

    /// Encode a reference, `None` becoming `0`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the referenced table is not a target of this scheme
    pub fn encode(&self, index: Option<TableIndex>) -> Result<u32> {
        let Some(index) = index else {
            return Ok(0);
        };

        let Some(tag) = self
            .tables()
            .iter()
            .position(|id| id.is_some_and(|id| TableKind::from(id) == index.kind()))
        else {
            return Err(malformed_error!(
                "{} is not a valid target of coded index {:?}",
                index,
                self
            ));
        };

        let row = index.index() + 1;
        if u64::from(row) << self.tag_bits() > u64::from(u32::MAX) {
            return Err(malformed_error!(
                "{} does not fit coded index {:?}",
                index,
                self
            ));
        }

        Ok((row << self.tag_bits()) | tag as u32)
    }

    /// Decode a raw coded index value
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the tag does not select a target table
    pub fn decode(&self, value: u32) -> Result<Option<TableIndex>> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let row = value >> bits;

        let target = self.tables().get(tag).copied().flatten();
        match (target, row) {
            (_, 0) if tag < self.tables().len() => Ok(None),
            (Some(id), row) if row > 0 => Ok(Some(TableIndex::new(id, row - 1)?)),
            _ => Err(malformed_error!(
                "Invalid tag {} in coded index {:?} (value {:#x})",
                tag,
                self,
                value
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn tag_bits() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasConstant.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::HasFieldMarshal.tag_bits(), 1);
        assert_eq!(CodedIndexType::HasDeclSecurity.tag_bits(), 2);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
        assert_eq!(CodedIndexType::HasSemantics.tag_bits(), 1);
        assert_eq!(CodedIndexType::MethodDefOrRef.tag_bits(), 1);
        assert_eq!(CodedIndexType::MemberForwarded.tag_bits(), 1);
        assert_eq!(CodedIndexType::Implementation.tag_bits(), 2);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
        assert_eq!(CodedIndexType::TypeOrMethodDef.tag_bits(), 1);
    }

    #[test]
    fn encode_decode() {
        let type_spec = TableIndex::new(TableId::TypeSpec, 4).unwrap();
        let encoded = CodedIndexType::TypeDefOrRef.encode(Some(type_spec)).unwrap();
        assert_eq!(encoded, (5 << 2) | 2);
        assert_eq!(
            CodedIndexType::TypeDefOrRef.decode(encoded).unwrap(),
            Some(type_spec)
        );

        let member_ref = TableIndex::new(TableId::MemberRef, 0).unwrap();
        let encoded = CodedIndexType::CustomAttributeType
            .encode(Some(member_ref))
            .unwrap();
        assert_eq!(encoded, (1 << 3) | 3);
    }

    #[test]
    fn null_reference() {
        for ci in CodedIndexType::iter() {
            assert_eq!(ci.encode(None).unwrap(), 0);
            assert_eq!(ci.decode(0).unwrap(), None);
        }
        // Row 0 with a valid tag is still null
        assert_eq!(CodedIndexType::TypeDefOrRef.decode(1).unwrap(), None);
    }

    #[test]
    fn invalid_targets() {
        let param = TableIndex::new(TableId::Param, 0).unwrap();
        assert!(CodedIndexType::TypeDefOrRef.encode(Some(param)).is_err());
        assert!(CodedIndexType::TypeDefOrRef.accepts(TableId::TypeSpec.into()));
        assert!(!CodedIndexType::TypeDefOrRef.accepts(TableId::Param.into()));

        // Tag 3 is unused for TypeDefOrRef
        assert!(CodedIndexType::TypeDefOrRef.decode((1 << 2) | 3).is_err());
        // Tags 0, 1 and 4 are unused for CustomAttributeType
        assert!(CodedIndexType::CustomAttributeType.decode((1 << 3) | 1).is_err());
        assert!(CodedIndexType::CustomAttributeType.decode((1 << 3) | 7).is_err());
    }
}
