//! Signature blobs (ECMA-335 II.23.2).
//!
//! Signatures describe method, field, property and local variable types in a compressed
//! binary form stored in the `#Blob` heap. Type references inside a signature are
//! `TypeDefOrRefOrSpecEncoded` and surface as [`crate::metadata::token::TableIndex`]
//! values, so a parsed signature can be remapped together with the tables it refers to.
//!
//! # Examples
//!
//! ```rust
//! use dotcodec::metadata::signatures::{
//!     encode_local_var_signature, parse_local_var_signature, TypeSignature,
//! };
//!
//! // 2 locals: int32, string
//! let locals = parse_local_var_signature(&[0x07, 0x02, 0x08, 0x0E])?;
//! assert_eq!(locals.locals[1].base, TypeSignature::String);
//! assert_eq!(encode_local_var_signature(&locals)?, [0x07, 0x02, 0x08, 0x0E]);
//! # Ok::<(), dotcodec::Error>(())
//! ```

mod encoders;
mod parser;
mod types;

pub use encoders::*;
pub use parser::*;
pub use types::*;

use crate::Result;

/// Parse a method signature from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    SignatureParser::new(data).parse_method_signature()
}

/// Parse a field signature from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    SignatureParser::new(data).parse_field_signature()
}

/// Parse a property signature from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn parse_property_signature(data: &[u8]) -> Result<SignatureProperty> {
    SignatureParser::new(data).parse_property_signature()
}

/// Parse a local variable signature from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn parse_local_var_signature(data: &[u8]) -> Result<SignatureLocalVariables> {
    SignatureParser::new(data).parse_local_var_signature()
}

/// Parse a type specification signature from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn parse_type_spec_signature(data: &[u8]) -> Result<SignatureTypeSpec> {
    SignatureParser::new(data).parse_type_spec_signature()
}

/// Parse a method specification signature from a byte slice
///
/// # Errors
/// Returns an error if the signature data is malformed or parsing fails
pub fn parse_method_spec_signature(data: &[u8]) -> Result<SignatureMethodSpec> {
    SignatureParser::new(data).parse_method_spec_signature()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_with_index() {
        let data = [0x28, 0x01, 0x0E, 0x08];
        let property = parse_property_signature(&data).unwrap();
        assert!(property.has_this);
        assert_eq!(property.base, TypeSignature::String);
        assert_eq!(property.params[0].base, TypeSignature::I4);
        assert_eq!(encode_property_signature(&property).unwrap(), data);
    }

    #[test]
    fn field_and_method_spec() {
        let field = parse_field_signature(&[0x06, 0x1D, 0x08]).unwrap();
        assert!(matches!(field.base, TypeSignature::SzArray(_)));
        assert_eq!(encode_field_signature(&field).unwrap(), [0x06, 0x1D, 0x08]);

        let spec = parse_method_spec_signature(&[0x0A, 0x02, 0x08, 0x1C]).unwrap();
        assert_eq!(spec.generic_args, [TypeSignature::I4, TypeSignature::Object]);
        assert_eq!(
            encode_method_spec_signature(&spec).unwrap(),
            [0x0A, 0x02, 0x08, 0x1C]
        );
    }

    #[test]
    fn generic_instance_type_spec() {
        // List<int32> where List is TypeRef row 3
        let data = [0x15, 0x12, 0x0D, 0x01, 0x08];
        let spec = parse_type_spec_signature(&data).unwrap();
        let TypeSignature::GenericInst(base, args) = &spec.base else {
            panic!("expected a generic instance");
        };
        assert!(matches!(**base, TypeSignature::Class(_)));
        assert_eq!(args, &[TypeSignature::I4]);
        assert_eq!(encode_typespec_signature(&spec).unwrap(), data);
    }
}
