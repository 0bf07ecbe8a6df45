use crate::metadata::token::TableIndex;

#[allow(non_snake_case, dead_code, missing_docs)]
/// Element type bytes used in signature blobs (ECMA-335 II.23.1.16)
pub mod ELEMENT_TYPE {
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDefOrRefOrSpecEncoded
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDefOrRefOrSpecEncoded
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 … loCount lo1 …
    pub const ARRAY: u8 = 0x14;
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const FNPTR: u8 = 0x1b;
    pub const OBJECT: u8 = 0x1c;
    pub const SZARRAY: u8 = 0x1d;
    pub const MVAR: u8 = 0x1e;
    pub const CMOD_REQD: u8 = 0x1f;
    pub const CMOD_OPT: u8 = 0x20;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
}

#[allow(non_snake_case, dead_code, missing_docs)]
/// Leading bytes of the non-method signature kinds
pub mod SIGNATURE_HEADER {
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const GENERIC_INST: u8 = 0x0a;
}

/// Calling convention of a method signature, the low nibble of its first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallingConvention {
    /// Managed default
    #[default]
    Default,
    /// Unmanaged `cdecl`
    C,
    /// Unmanaged `stdcall`
    StdCall,
    /// Unmanaged `thiscall`
    ThisCall,
    /// Unmanaged `fastcall`
    FastCall,
    /// Managed variable argument list
    VarArg,
    /// Any other value, kept verbatim
    Other(u8),
}

impl CallingConvention {
    /// Decode the low nibble of a signature's first byte
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x0F {
            0 => CallingConvention::Default,
            1 => CallingConvention::C,
            2 => CallingConvention::StdCall,
            3 => CallingConvention::ThisCall,
            4 => CallingConvention::FastCall,
            5 => CallingConvention::VarArg,
            other => CallingConvention::Other(other),
        }
    }

    /// The low nibble this convention encodes to
    #[must_use]
    pub fn bits(self) -> u8 {
        match self {
            CallingConvention::Default => 0,
            CallingConvention::C => 1,
            CallingConvention::StdCall => 2,
            CallingConvention::ThisCall => 3,
            CallingConvention::FastCall => 4,
            CallingConvention::VarArg => 5,
            CallingConvention::Other(bits) => bits & 0x0F,
        }
    }
}

/// A `modreq` or `modopt` custom modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomModifier {
    /// `modreq` when set, `modopt` otherwise
    pub is_required: bool,
    /// The modifier type, a `TypeDef`, `TypeRef` or `TypeSpec`
    pub modifier_type: TableIndex,
}

/// A single dimension of a general array
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArrayDimensions {
    /// The size of this dimension
    pub size: Option<u32>,
    /// The lower bound of this dimension
    pub lower_bound: Option<i32>,
}

/// Represents a parsed type in various signatures
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TypeSignature {
    /// void
    #[default]
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// System.String
    String,
    /// A pointer to a type
    Ptr(SignaturePointer),
    /// Type by reference
    ByRef(Box<TypeSignature>),
    /// CIL value-type
    ValueType(TableIndex),
    /// CIL Class
    Class(TableIndex),
    /// Generic type parameter, by position
    GenericParamType(u32),
    /// General array
    Array(SignatureArray),
    /// Generic type and its arguments
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Typed reference
    TypedByRef,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
    /// System.Object
    Object,
    /// Single dimension, zero based array
    SzArray(SignatureSzArray),
    /// Generic method parameter, by position
    GenericParamMethod(u32),
    /// A pinned type, only valid for locals
    Pinned(Box<TypeSignature>),
}

/// A general array
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureArray {
    /// The element type
    pub base: Box<TypeSignature>,
    /// The number of dimensions
    pub rank: u32,
    /// Sizes and lower bounds, in order; may be shorter than `rank`
    pub dimensions: Vec<ArrayDimensions>,
}

/// A single dimension array
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureSzArray {
    /// Custom modifiers of the element type
    pub modifiers: Vec<CustomModifier>,
    /// The element type
    pub base: Box<TypeSignature>,
}

/// A pointer to a type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignaturePointer {
    /// Custom modifiers of the pointee
    pub modifiers: Vec<CustomModifier>,
    /// The type pointed to
    pub base: Box<TypeSignature>,
}

/// Parameter or return type with optional custom modifiers
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureParameter {
    /// Custom modifiers of the parameter
    pub modifiers: Vec<CustomModifier>,
    /// Parameter is passed by reference
    pub by_ref: bool,
    /// The type of the parameter
    pub base: TypeSignature,
}

/// Method signature (II.23.2.1 - II.23.2.3)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureMethod {
    /// Instance method, `this` is passed implicitly
    pub has_this: bool,
    /// `this` is passed as the first explicit parameter
    pub explicit_this: bool,
    /// Calling convention
    pub calling_convention: CallingConvention,
    /// Number of generic parameters, 0 for non-generic methods
    pub generic_param_count: u32,
    /// The return type
    pub return_type: SignatureParameter,
    /// The fixed parameters
    pub params: Vec<SignatureParameter>,
    /// Parameters after the vararg sentinel, call sites only
    pub varargs: Vec<SignatureParameter>,
}

/// Field signature (II.23.2.4)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureField {
    /// Custom modifiers of the field type
    pub modifiers: Vec<CustomModifier>,
    /// The field type
    pub base: TypeSignature,
}

/// Property signature (II.23.2.5)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureProperty {
    /// Instance property
    pub has_this: bool,
    /// Custom modifiers of the property type
    pub modifiers: Vec<CustomModifier>,
    /// The property type
    pub base: TypeSignature,
    /// Indexer parameters
    pub params: Vec<SignatureParameter>,
}

/// Local variable signature (II.23.2.6), the blob behind a method body's locals token
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureLocalVariables {
    /// The local variables, by slot
    pub locals: Vec<SignatureLocalVariable>,
}

/// Shorter name for the locals signature of a method body
pub type LocalVarSig = SignatureLocalVariables;

/// One local variable slot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureLocalVariable {
    /// Custom modifiers
    pub modifiers: Vec<CustomModifier>,
    /// Is a managed reference
    pub is_byref: bool,
    /// Pins the referenced object
    pub is_pinned: bool,
    /// The variable type
    pub base: TypeSignature,
}

/// Type specification signature (II.23.2.14)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureTypeSpec {
    /// The specified type
    pub base: TypeSignature,
}

/// Generic method instantiation (II.23.2.15)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureMethodSpec {
    /// The generic arguments
    pub generic_args: Vec<TypeSignature>,
}
