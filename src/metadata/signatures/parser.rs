use crate::{
    file::parser::Parser,
    metadata::signatures::{
        ArrayDimensions, CallingConvention, CustomModifier, SignatureArray, SignatureField,
        SignatureLocalVariable, SignatureLocalVariables, SignatureMethod, SignatureMethodSpec,
        SignatureParameter, SignaturePointer, SignatureProperty, SignatureSzArray,
        SignatureTypeSpec, TypeSignature, ELEMENT_TYPE, SIGNATURE_HEADER,
    },
    Result,
};

/// Types may nest this deep before a blob is rejected
const MAX_NESTING: usize = 50;

/// Bits of the first byte of a method signature
const GENERIC: u8 = 0x10;
const HAS_THIS: u8 = 0x20;
const EXPLICIT_THIS: u8 = 0x40;

/// Element types that stand for themselves, without a payload
fn primitive(element: u8) -> Option<TypeSignature> {
    Some(match element {
        ELEMENT_TYPE::VOID => TypeSignature::Void,
        ELEMENT_TYPE::BOOLEAN => TypeSignature::Boolean,
        ELEMENT_TYPE::CHAR => TypeSignature::Char,
        ELEMENT_TYPE::I1 => TypeSignature::I1,
        ELEMENT_TYPE::U1 => TypeSignature::U1,
        ELEMENT_TYPE::I2 => TypeSignature::I2,
        ELEMENT_TYPE::U2 => TypeSignature::U2,
        ELEMENT_TYPE::I4 => TypeSignature::I4,
        ELEMENT_TYPE::U4 => TypeSignature::U4,
        ELEMENT_TYPE::I8 => TypeSignature::I8,
        ELEMENT_TYPE::U8 => TypeSignature::U8,
        ELEMENT_TYPE::R4 => TypeSignature::R4,
        ELEMENT_TYPE::R8 => TypeSignature::R8,
        ELEMENT_TYPE::I => TypeSignature::I,
        ELEMENT_TYPE::U => TypeSignature::U,
        ELEMENT_TYPE::STRING => TypeSignature::String,
        ELEMENT_TYPE::OBJECT => TypeSignature::Object,
        ELEMENT_TYPE::TYPEDBYREF => TypeSignature::TypedByRef,
        _ => return None,
    })
}

/// Reader for the signature blobs of ECMA-335 II.23.2
///
/// One reader consumes one blob.
///
/// # Example
///
/// ```rust
/// use dotcodec::metadata::signatures::{SignatureParser, TypeSignature};
///
/// let mut parser = SignatureParser::new(&[0x20, 0x01, 0x01, 0x0E]);
/// let sig = parser.parse_method_signature()?;
/// assert!(sig.has_this);
/// assert_eq!(sig.params[0].base, TypeSignature::String);
/// # Ok::<(), dotcodec::Error>(())
/// ```
pub struct SignatureParser<'a> {
    input: Parser<'a>,
    nesting: usize,
}

impl<'a> SignatureParser<'a> {
    /// A reader positioned at the start of `blob`
    #[must_use]
    pub fn new(blob: &'a [u8]) -> Self {
        SignatureParser {
            input: Parser::new(blob),
            nesting: 0,
        }
    }

    /// Consume the next byte if it equals `element`
    fn take(&mut self, element: u8) -> Result<bool> {
        if self.input.has_more_data() && self.input.peek_byte()? == element {
            self.input.advance_by(1)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn header(&mut self, what: &str, accept: impl Fn(u8) -> bool) -> Result<u8> {
        let header = self.input.read_le::<u8>()?;
        if !accept(header) {
            return Err(malformed_error!("{} signature starts with {:#04x}", what, header));
        }
        Ok(header)
    }

    fn count(&mut self) -> Result<u32> {
        self.input.read_compressed_uint()
    }

    fn types(&mut self, count: u32) -> Result<Vec<TypeSignature>> {
        (0..count).map(|_| self.parse_type()).collect()
    }

    fn parse_type(&mut self) -> Result<TypeSignature> {
        if self.nesting + 1 >= MAX_NESTING {
            return Err(malformed_error!("Signature nests deeper than {} types", MAX_NESTING));
        }
        self.nesting += 1;
        let parsed = self.parse_element();
        self.nesting -= 1;
        parsed
    }

    fn parse_element(&mut self) -> Result<TypeSignature> {
        let element = self.input.read_le::<u8>()?;
        if let Some(simple) = primitive(element) {
            return Ok(simple);
        }

        Ok(match element {
            ELEMENT_TYPE::CLASS => TypeSignature::Class(self.input.read_compressed_token()?),
            ELEMENT_TYPE::VALUETYPE => {
                TypeSignature::ValueType(self.input.read_compressed_token()?)
            }
            ELEMENT_TYPE::VAR => TypeSignature::GenericParamType(self.count()?),
            ELEMENT_TYPE::MVAR => TypeSignature::GenericParamMethod(self.count()?),
            ELEMENT_TYPE::BYREF => TypeSignature::ByRef(Box::new(self.parse_type()?)),
            ELEMENT_TYPE::PINNED => TypeSignature::Pinned(Box::new(self.parse_type()?)),
            ELEMENT_TYPE::PTR => TypeSignature::Ptr(SignaturePointer {
                modifiers: self.modifiers()?,
                base: Box::new(self.parse_type()?),
            }),
            ELEMENT_TYPE::SZARRAY => TypeSignature::SzArray(SignatureSzArray {
                modifiers: self.modifiers()?,
                base: Box::new(self.parse_type()?),
            }),
            ELEMENT_TYPE::ARRAY => TypeSignature::Array(self.array_shape()?),
            ELEMENT_TYPE::GENERICINST => self.generic_instance()?,
            ELEMENT_TYPE::FNPTR => TypeSignature::FnPtr(Box::new(self.parse_method_signature()?)),
            other => return Err(malformed_error!("Unknown element type {:#04x}", other)),
        })
    }

    /// `ARRAY` payload: element type, rank, sizes and lower bounds (II.23.2.13)
    fn array_shape(&mut self) -> Result<SignatureArray> {
        let base = Box::new(self.parse_type()?);
        let rank = self.count()?;

        let size_count = self.count()?;
        let sizes = (0..size_count)
            .map(|_| self.input.read_compressed_uint())
            .collect::<Result<Vec<u32>>>()?;
        let bound_count = self.count()?;
        let bounds = (0..bound_count)
            .map(|_| self.input.read_compressed_int())
            .collect::<Result<Vec<i32>>>()?;

        let dimensions = (0..sizes.len().max(bounds.len()))
            .map(|i| ArrayDimensions {
                size: sizes.get(i).copied(),
                lower_bound: bounds.get(i).copied(),
            })
            .collect();

        Ok(SignatureArray {
            base,
            rank,
            dimensions,
        })
    }

    fn generic_instance(&mut self) -> Result<TypeSignature> {
        let open = self.input.peek_byte()?;
        if !matches!(open, ELEMENT_TYPE::CLASS | ELEMENT_TYPE::VALUETYPE) {
            return Err(malformed_error!(
                "Generic instance over {:#04x} instead of a class or value type",
                open
            ));
        }

        let definition = self.parse_type()?;
        let arity = self.count()?;
        Ok(TypeSignature::GenericInst(Box::new(definition), self.types(arity)?))
    }

    /// Any run of `modreq`/`modopt` prefixes
    fn modifiers(&mut self) -> Result<Vec<CustomModifier>> {
        let mut modifiers = Vec::new();
        loop {
            let is_required = if self.take(ELEMENT_TYPE::CMOD_REQD)? {
                true
            } else if self.take(ELEMENT_TYPE::CMOD_OPT)? {
                false
            } else {
                return Ok(modifiers);
            };
            modifiers.push(CustomModifier {
                is_required,
                modifier_type: self.input.read_compressed_token()?,
            });
        }
    }

    /// `RetType` and `Param` share one shape
    fn parameter(&mut self) -> Result<SignatureParameter> {
        let modifiers = self.modifiers()?;
        let by_ref = self.take(ELEMENT_TYPE::BYREF)?;
        Ok(SignatureParameter {
            modifiers,
            by_ref,
            base: self.parse_type()?,
        })
    }

    fn local(&mut self) -> Result<SignatureLocalVariable> {
        let mut local = SignatureLocalVariable::default();
        loop {
            let found = self.modifiers()?;
            if !found.is_empty() {
                local.modifiers.extend(found);
            } else if self.take(ELEMENT_TYPE::PINNED)? {
                local.is_pinned = true;
            } else {
                break;
            }
        }
        local.is_byref = self.take(ELEMENT_TYPE::BYREF)?;
        local.base = self.parse_type()?;
        Ok(local)
    }

    /// Parse a `MethodDefSig`, `MethodRefSig` or `StandAloneMethodSig`
    ///
    /// Parameters after a `SENTINEL` land in [`SignatureMethod::varargs`].
    ///
    /// # Errors
    /// Returns an error for an unknown calling convention or truncated data
    pub fn parse_method_signature(&mut self) -> Result<SignatureMethod> {
        let first = self.header("Method", |byte| byte & 0x0F <= 0x05)?;
        let generic_param_count = if first & GENERIC != 0 {
            self.count()?
        } else {
            0
        };
        let param_count = self.count()?;

        let mut method = SignatureMethod {
            has_this: first & HAS_THIS != 0,
            explicit_this: first & EXPLICIT_THIS != 0,
            calling_convention: CallingConvention::from_bits(first),
            generic_param_count,
            return_type: self.parameter()?,
            ..SignatureMethod::default()
        };

        let mut variadic = false;
        for _ in 0..param_count {
            variadic = variadic || self.take(ELEMENT_TYPE::SENTINEL)?;
            let parameter = self.parameter()?;
            if variadic {
                method.varargs.push(parameter);
            } else {
                method.params.push(parameter);
            }
        }
        Ok(method)
    }

    /// Parse a `FieldSig` (II.23.2.4)
    ///
    /// # Errors
    /// Returns an error for another header or an unreadable type
    pub fn parse_field_signature(&mut self) -> Result<SignatureField> {
        self.header("Field", |byte| byte == SIGNATURE_HEADER::FIELD)?;
        Ok(SignatureField {
            modifiers: self.modifiers()?,
            base: self.parse_type()?,
        })
    }

    /// Parse a `PropertySig` (II.23.2.5)
    ///
    /// # Errors
    /// Returns an error if the `PROPERTY` kind is missing or a type is unreadable
    pub fn parse_property_signature(&mut self) -> Result<SignatureProperty> {
        let first = self.header("Property", |byte| byte & 0x0F == SIGNATURE_HEADER::PROPERTY)?;
        let param_count = self.count()?;
        let modifiers = self.modifiers()?;
        let base = self.parse_type()?;
        let params = (0..param_count)
            .map(|_| self.parameter())
            .collect::<Result<Vec<_>>>()?;

        Ok(SignatureProperty {
            has_this: first & HAS_THIS != 0,
            modifiers,
            base,
            params,
        })
    }

    /// Parse a `LocalVarSig` (II.23.2.6)
    ///
    /// # Errors
    /// Returns an error for another header or an unreadable local
    pub fn parse_local_var_signature(&mut self) -> Result<SignatureLocalVariables> {
        self.header("Locals", |byte| byte == SIGNATURE_HEADER::LOCAL_SIG)?;
        let count = self.count()?;
        let locals = (0..count).map(|_| self.local()).collect::<Result<Vec<_>>>()?;
        Ok(SignatureLocalVariables { locals })
    }

    /// Parse a `TypeSpec` blob (II.23.2.14)
    ///
    /// # Errors
    /// Returns an error if the type is unreadable
    pub fn parse_type_spec_signature(&mut self) -> Result<SignatureTypeSpec> {
        Ok(SignatureTypeSpec {
            base: self.parse_type()?,
        })
    }

    /// Parse a `MethodSpec` blob (II.23.2.15)
    ///
    /// # Errors
    /// Returns an error for another header or an unreadable argument
    pub fn parse_method_spec_signature(&mut self) -> Result<SignatureMethodSpec> {
        self.header("MethodSpec", |byte| byte == SIGNATURE_HEADER::GENERIC_INST)?;
        let arity = self.count()?;
        Ok(SignatureMethodSpec {
            generic_args: self.types(arity)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{tables::TableId, token::TableIndex};

    fn type_spec(blob: &[u8]) -> Result<TypeSignature> {
        SignatureParser::new(blob)
            .parse_type_spec_signature()
            .map(|spec| spec.base)
    }

    #[test]
    fn primitives() {
        for (element, expected) in [
            (0x02, TypeSignature::Boolean),
            (0x08, TypeSignature::I4),
            (0x0B, TypeSignature::U8),
            (0x0D, TypeSignature::R8),
            (0x0E, TypeSignature::String),
            (0x16, TypeSignature::TypedByRef),
            (0x18, TypeSignature::I),
            (0x1C, TypeSignature::Object),
        ] {
            assert_eq!(type_spec(&[element]).unwrap(), expected);
        }
    }

    #[test]
    fn class_tokens() {
        // CLASS TypeRef[0], VALUETYPE TypeDef[1]
        let mut parser = SignatureParser::new(&[0x07, 0x02, 0x12, 0x05, 0x11, 0x08]);
        let locals = parser.parse_local_var_signature().unwrap();
        assert_eq!(
            locals.locals[0].base,
            TypeSignature::Class(TableIndex::new(TableId::TypeRef, 0).unwrap())
        );
        assert_eq!(
            locals.locals[1].base,
            TypeSignature::ValueType(TableIndex::new(TableId::TypeDef, 1).unwrap())
        );
    }

    #[test]
    fn pinned_and_byref_locals() {
        let mut parser = SignatureParser::new(&[0x07, 0x03, 0x45, 0x10, 0x08, 0x16, 0x1D, 0x05]);
        let locals = parser.parse_local_var_signature().unwrap().locals;
        assert!(locals[0].is_pinned);
        assert!(locals[0].is_byref);
        assert_eq!(locals[0].base, TypeSignature::I4);
        assert_eq!(locals[1].base, TypeSignature::TypedByRef);
        assert!(!locals[1].is_pinned);
        assert!(matches!(locals[2].base, TypeSignature::SzArray(_)));
    }

    #[test]
    fn array_bounds_without_sizes() {
        // generic, one type parameter, two params: !!0 and int32[-1..., ]
        let blob = [
            0x10, 0x01, 0x02, 0x01, 0x1E, 0x00, 0x14, 0x08, 0x02, 0x00, 0x01, 0x7F,
        ];
        let sig = SignatureParser::new(&blob).parse_method_signature().unwrap();
        assert_eq!(sig.generic_param_count, 1);
        assert_eq!(sig.params[0].base, TypeSignature::GenericParamMethod(0));
        let TypeSignature::Array(array) = &sig.params[1].base else {
            panic!("expected an array");
        };
        assert_eq!(array.rank, 2);
        assert_eq!(
            array.dimensions,
            vec![ArrayDimensions {
                size: None,
                lower_bound: Some(-1),
            }]
        );
    }

    #[test]
    fn generic_instance() {
        // List`1<int32> with List`1 as TypeRef[2]
        let base = type_spec(&[0x15, 0x12, 0x0D, 0x01, 0x08]).unwrap();
        assert_eq!(
            base,
            TypeSignature::GenericInst(
                Box::new(TypeSignature::Class(TableIndex::new(TableId::TypeRef, 2).unwrap())),
                vec![TypeSignature::I4],
            )
        );
    }

    #[test]
    fn vararg_sentinel() {
        let blob = [0x05, 0x02, 0x01, 0x08, 0x41, 0x0E];
        let sig = SignatureParser::new(&blob).parse_method_signature().unwrap();
        assert_eq!(sig.calling_convention, CallingConvention::VarArg);
        assert_eq!(sig.params.len(), 1);
        assert_eq!(sig.varargs.len(), 1);
    }

    #[test]
    fn invalid() {
        assert!(SignatureParser::new(&[0x06]).parse_field_signature().is_err());
        assert!(SignatureParser::new(&[0x07, 0x01, 0x17])
            .parse_local_var_signature()
            .is_err());
        assert!(SignatureParser::new(&[0x0A, 0x01, 0x15, 0x08])
            .parse_method_spec_signature()
            .is_err());
        assert!(SignatureParser::new(&[0x0E]).parse_method_signature().is_err());
        assert!(type_spec(&[0x0F; 64]).is_err());
    }
}
