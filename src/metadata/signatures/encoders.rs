//! Signature encoders, the inverse of [`super::SignatureParser`].
//!
//! Every encoder emits the canonical form: custom modifiers come before the `PINNED`
//! constraint and `BYREF`, and array sizes are written before lower bounds.

use crate::{
    file::io::write_compressed_uint_at,
    metadata::{
        signatures::{
            CustomModifier, SignatureField, SignatureLocalVariables, SignatureMethod,
            SignatureMethodSpec, SignatureParameter, SignatureProperty, SignatureTypeSpec,
            TypeSignature, ELEMENT_TYPE, SIGNATURE_HEADER,
        },
        tables::CodedIndexType,
        token::TableIndex,
    },
    Result,
};

fn push_compressed(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    let mut offset = buffer.len();
    write_compressed_uint_at(buffer, &mut offset, value)
}

fn push_count(buffer: &mut Vec<u8>, count: usize) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| malformed_error!("Signature list of {} entries is too long", count))?;
    push_compressed(buffer, count)
}

/// Write a compressed signed integer, using the same width the reader derives from the prefix
fn push_compressed_int(buffer: &mut Vec<u8>, value: i32) -> Result<()> {
    let sign = u32::from(value < 0);
    let (mask, prefix, width) = match value {
        -0x40..=0x3F => (0x7F_u32, 0x00_u32, 1),
        -0x2000..=0x1FFF => (0x3FFF, 0x8000, 2),
        -0x1000_0000..=0x0FFF_FFFF => (0x1FFF_FFFF, 0xC000_0000, 4),
        _ => {
            return Err(malformed_error!(
                "Value {} is too large for a compressed signed integer",
                value
            ))
        }
    };

    let encoded = prefix | (((value as u32) << 1) & mask & !1) | sign;
    buffer.extend_from_slice(&encoded.to_be_bytes()[4 - width..]);
    Ok(())
}

/// Encode a `TypeDefOrRefOrSpecEncoded` reference
fn push_type_token(buffer: &mut Vec<u8>, index: TableIndex) -> Result<()> {
    let coded = CodedIndexType::TypeDefOrRef.encode(Some(index))?;
    push_compressed(buffer, coded)
}

fn encode_custom_modifiers(modifiers: &[CustomModifier], buffer: &mut Vec<u8>) -> Result<()> {
    for modifier in modifiers {
        buffer.push(if modifier.is_required {
            ELEMENT_TYPE::CMOD_REQD
        } else {
            ELEMENT_TYPE::CMOD_OPT
        });
        push_type_token(buffer, modifier.modifier_type)?;
    }
    Ok(())
}

fn encode_parameter(parameter: &SignatureParameter, buffer: &mut Vec<u8>) -> Result<()> {
    encode_custom_modifiers(&parameter.modifiers, buffer)?;
    if parameter.by_ref {
        buffer.push(ELEMENT_TYPE::BYREF);
    }
    encode_type_signature(&parameter.base, buffer)
}

/// Append the encoding of a single type to `buffer`
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for type references outside `TypeDef`, `TypeRef` and
/// `TypeSpec`, or counts too large for a compressed integer
pub fn encode_type_signature(signature: &TypeSignature, buffer: &mut Vec<u8>) -> Result<()> {
    match signature {
        TypeSignature::Void => buffer.push(ELEMENT_TYPE::VOID),
        TypeSignature::Boolean => buffer.push(ELEMENT_TYPE::BOOLEAN),
        TypeSignature::Char => buffer.push(ELEMENT_TYPE::CHAR),
        TypeSignature::I1 => buffer.push(ELEMENT_TYPE::I1),
        TypeSignature::U1 => buffer.push(ELEMENT_TYPE::U1),
        TypeSignature::I2 => buffer.push(ELEMENT_TYPE::I2),
        TypeSignature::U2 => buffer.push(ELEMENT_TYPE::U2),
        TypeSignature::I4 => buffer.push(ELEMENT_TYPE::I4),
        TypeSignature::U4 => buffer.push(ELEMENT_TYPE::U4),
        TypeSignature::I8 => buffer.push(ELEMENT_TYPE::I8),
        TypeSignature::U8 => buffer.push(ELEMENT_TYPE::U8),
        TypeSignature::R4 => buffer.push(ELEMENT_TYPE::R4),
        TypeSignature::R8 => buffer.push(ELEMENT_TYPE::R8),
        TypeSignature::String => buffer.push(ELEMENT_TYPE::STRING),
        TypeSignature::TypedByRef => buffer.push(ELEMENT_TYPE::TYPEDBYREF),
        TypeSignature::I => buffer.push(ELEMENT_TYPE::I),
        TypeSignature::U => buffer.push(ELEMENT_TYPE::U),
        TypeSignature::Object => buffer.push(ELEMENT_TYPE::OBJECT),
        TypeSignature::Ptr(pointer) => {
            buffer.push(ELEMENT_TYPE::PTR);
            encode_custom_modifiers(&pointer.modifiers, buffer)?;
            encode_type_signature(&pointer.base, buffer)?;
        }
        TypeSignature::ByRef(inner) => {
            buffer.push(ELEMENT_TYPE::BYREF);
            encode_type_signature(inner, buffer)?;
        }
        TypeSignature::Pinned(inner) => {
            buffer.push(ELEMENT_TYPE::PINNED);
            encode_type_signature(inner, buffer)?;
        }
        TypeSignature::ValueType(index) => {
            buffer.push(ELEMENT_TYPE::VALUETYPE);
            push_type_token(buffer, *index)?;
        }
        TypeSignature::Class(index) => {
            buffer.push(ELEMENT_TYPE::CLASS);
            push_type_token(buffer, *index)?;
        }
        TypeSignature::GenericParamType(position) => {
            buffer.push(ELEMENT_TYPE::VAR);
            push_compressed(buffer, *position)?;
        }
        TypeSignature::GenericParamMethod(position) => {
            buffer.push(ELEMENT_TYPE::MVAR);
            push_compressed(buffer, *position)?;
        }
        TypeSignature::Array(array) => {
            buffer.push(ELEMENT_TYPE::ARRAY);
            encode_type_signature(&array.base, buffer)?;
            push_compressed(buffer, array.rank)?;

            let sizes: Vec<u32> = array
                .dimensions
                .iter()
                .map_while(|dimension| dimension.size)
                .collect();
            push_count(buffer, sizes.len())?;
            for size in sizes {
                push_compressed(buffer, size)?;
            }

            let bounds: Vec<i32> = array
                .dimensions
                .iter()
                .map_while(|dimension| dimension.lower_bound)
                .collect();
            push_count(buffer, bounds.len())?;
            for bound in bounds {
                push_compressed_int(buffer, bound)?;
            }
        }
        TypeSignature::GenericInst(base, args) => {
            if !matches!(**base, TypeSignature::Class(_) | TypeSignature::ValueType(_)) {
                return Err(malformed_error!(
                    "Generic instantiation of {:?}, expected a class or value type",
                    base
                ));
            }
            buffer.push(ELEMENT_TYPE::GENERICINST);
            encode_type_signature(base, buffer)?;
            push_count(buffer, args.len())?;
            for arg in args {
                encode_type_signature(arg, buffer)?;
            }
        }
        TypeSignature::FnPtr(method) => {
            buffer.push(ELEMENT_TYPE::FNPTR);
            buffer.extend(encode_method_signature(method)?);
        }
        TypeSignature::SzArray(array) => {
            buffer.push(ELEMENT_TYPE::SZARRAY);
            encode_custom_modifiers(&array.modifiers, buffer)?;
            encode_type_signature(&array.base, buffer)?;
        }
    }

    Ok(())
}

/// Encode a method signature (II.23.2.1)
///
/// # Errors
/// Returns an error if a parameter type cannot be encoded
pub fn encode_method_signature(signature: &SignatureMethod) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    let mut convention = signature.calling_convention.bits();
    if signature.has_this {
        convention |= 0x20;
    }
    if signature.explicit_this {
        convention |= 0x40;
    }
    if signature.generic_param_count > 0 {
        convention |= 0x10;
    }
    buffer.push(convention);

    if signature.generic_param_count > 0 {
        push_compressed(&mut buffer, signature.generic_param_count)?;
    }
    push_count(&mut buffer, signature.params.len() + signature.varargs.len())?;
    encode_parameter(&signature.return_type, &mut buffer)?;

    for param in &signature.params {
        encode_parameter(param, &mut buffer)?;
    }
    if !signature.varargs.is_empty() {
        buffer.push(ELEMENT_TYPE::SENTINEL);
        for param in &signature.varargs {
            encode_parameter(param, &mut buffer)?;
        }
    }

    Ok(buffer)
}

/// Encode a field signature (II.23.2.4)
///
/// # Errors
/// Returns an error if the field type cannot be encoded
pub fn encode_field_signature(signature: &SignatureField) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::FIELD];
    encode_custom_modifiers(&signature.modifiers, &mut buffer)?;
    encode_type_signature(&signature.base, &mut buffer)?;
    Ok(buffer)
}

/// Encode a property signature (II.23.2.5)
///
/// # Errors
/// Returns an error if a type cannot be encoded
pub fn encode_property_signature(signature: &SignatureProperty) -> Result<Vec<u8>> {
    let mut header = SIGNATURE_HEADER::PROPERTY;
    if signature.has_this {
        header |= 0x20;
    }

    let mut buffer = vec![header];
    push_count(&mut buffer, signature.params.len())?;
    encode_custom_modifiers(&signature.modifiers, &mut buffer)?;
    encode_type_signature(&signature.base, &mut buffer)?;
    for param in &signature.params {
        encode_parameter(param, &mut buffer)?;
    }

    Ok(buffer)
}

/// Encode a local variable signature (II.23.2.6)
///
/// # Errors
/// Returns an error if a variable type cannot be encoded
pub fn encode_local_var_signature(signature: &SignatureLocalVariables) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::LOCAL_SIG];
    push_count(&mut buffer, signature.locals.len())?;

    for local in &signature.locals {
        if local.base == TypeSignature::TypedByRef
            && local.modifiers.is_empty()
            && !local.is_pinned
            && !local.is_byref
        {
            buffer.push(ELEMENT_TYPE::TYPEDBYREF);
            continue;
        }

        encode_custom_modifiers(&local.modifiers, &mut buffer)?;
        if local.is_pinned {
            buffer.push(ELEMENT_TYPE::PINNED);
        }
        if local.is_byref {
            buffer.push(ELEMENT_TYPE::BYREF);
        }
        encode_type_signature(&local.base, &mut buffer)?;
    }

    Ok(buffer)
}

/// Encode a type specification signature (II.23.2.14)
///
/// # Errors
/// Returns an error if the type cannot be encoded
pub fn encode_typespec_signature(signature: &SignatureTypeSpec) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    encode_type_signature(&signature.base, &mut buffer)?;
    Ok(buffer)
}

/// Encode a generic method instantiation (II.23.2.15)
///
/// # Errors
/// Returns an error if an argument cannot be encoded
pub fn encode_method_spec_signature(signature: &SignatureMethodSpec) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::GENERIC_INST];
    push_count(&mut buffer, signature.generic_args.len())?;
    for arg in &signature.generic_args {
        encode_type_signature(arg, &mut buffer)?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        signatures::{
            parse_local_var_signature, parse_method_signature, ArrayDimensions, SignatureArray,
            SignatureLocalVariable,
        },
        tables::TableId,
    };

    #[test]
    fn compressed_signed() {
        let cases: [(i32, &[u8]); 6] = [
            (3, &[0x06]),
            (-3, &[0x7B]),
            (64, &[0x80, 0x80]),
            (-8192, &[0x80, 0x01]),
            (268_435_455, &[0xDF, 0xFF, 0xFF, 0xFE]),
            (-268_435_456, &[0xC0, 0x00, 0x00, 0x01]),
        ];

        for (value, expected) in cases {
            let mut buffer = Vec::new();
            push_compressed_int(&mut buffer, value).unwrap();
            assert_eq!(buffer, expected, "{}", value);
        }
        assert!(push_compressed_int(&mut Vec::new(), i32::MAX).is_err());
    }

    #[test]
    fn method_bytes() {
        let data = [0x20, 0x02, 0x01, 0x0E, 0x12, 0x09];
        let parsed = parse_method_signature(&data).unwrap();
        assert_eq!(encode_method_signature(&parsed).unwrap(), data);
    }

    #[test]
    fn locals_with_array() {
        let sig = SignatureLocalVariables {
            locals: vec![
                SignatureLocalVariable {
                    base: TypeSignature::Array(SignatureArray {
                        base: Box::new(TypeSignature::R8),
                        rank: 2,
                        dimensions: vec![
                            ArrayDimensions {
                                size: Some(4),
                                lower_bound: Some(-2),
                            },
                            ArrayDimensions {
                                size: Some(3),
                                lower_bound: Some(0),
                            },
                        ],
                    }),
                    ..SignatureLocalVariable::default()
                },
                SignatureLocalVariable {
                    is_pinned: true,
                    is_byref: true,
                    base: TypeSignature::U1,
                    ..SignatureLocalVariable::default()
                },
            ],
        };

        let bytes = encode_local_var_signature(&sig).unwrap();
        assert_eq!(
            bytes,
            [0x07, 0x02, 0x14, 0x0D, 0x02, 0x02, 0x04, 0x03, 0x02, 0x7D, 0x00, 0x45, 0x10, 0x05]
        );
        assert_eq!(parse_local_var_signature(&bytes).unwrap(), sig);
    }

    #[test]
    fn type_token_targets() {
        let class = TypeSignature::Class(TableIndex::new(TableId::TypeSpec, 0).unwrap());
        let mut buffer = Vec::new();
        encode_type_signature(&class, &mut buffer).unwrap();
        assert_eq!(buffer, [0x12, 0x06]);

        let wrong = TypeSignature::Class(TableIndex::new(TableId::MethodDef, 0).unwrap());
        assert!(encode_type_signature(&wrong, &mut Vec::new()).is_err());
    }
}
