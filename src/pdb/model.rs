//! The in-memory model of a managed PDB.

use uguid::Guid;

use crate::pdb::{
    lines::PdbLines,
    oem::{AsyncMethodInfo, CustomDebugInfo},
    sources::PdbSource,
};

/// A managed PDB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbFile {
    /// Matches the image's debug directory
    pub guid: Guid,
    /// Incremented on every rewrite
    pub age: u32,
    /// Timestamp signature
    pub signature: u32,
    /// Modules, usually one per assembly
    pub modules: Vec<PdbModule>,
    /// Source documents; line blocks refer to them by index
    pub sources: Vec<PdbSource>,
    /// Metadata row remapping written by tools that reorder tables
    pub token_remap: Option<Vec<u32>>,
}

impl PdbFile {
    /// An empty PDB
    #[must_use]
    pub fn new(guid: Guid, age: u32) -> Self {
        PdbFile {
            guid,
            age,
            signature: 0,
            modules: Vec::new(),
            sources: Vec::new(),
            token_remap: None,
        }
    }

    /// The function with metadata token `token`
    #[must_use]
    pub fn function(&self, token: u32) -> Option<&PdbFunction> {
        self.modules
            .iter()
            .flat_map(|module| &module.functions)
            .find(|function| function.token == token)
    }

    /// Index of the source named `name`
    #[must_use]
    pub fn source_index(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|source| source.name == name)
    }
}

/// One module of the DBI stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdbModule {
    /// Module name
    pub name: String,
    /// Object file name
    pub object_name: String,
    /// Functions in stream order
    pub functions: Vec<PdbFunction>,
}

impl PdbModule {
    /// An empty module whose object name equals its name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        PdbModule {
            object_name: name.clone(),
            name,
            functions: Vec::new(),
        }
    }
}

/// Debug information of one method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdbFunction {
    /// MethodDef token
    pub token: u32,
    /// Section of the method body
    pub segment: u16,
    /// Offset of the method body in its section
    pub offset: u32,
    /// Bytes of IL
    pub length: u32,
    /// Symbol name
    pub name: String,
    /// Emitted as `S_GMANPROC` rather than `S_LMANPROC`
    pub global: bool,
    /// Locals of the outermost scope
    pub slots: Vec<PdbSlot>,
    /// Namespaces imported by the outermost scope
    pub used_namespaces: Vec<String>,
    /// Nested scopes in pre-order
    pub scopes: Vec<PdbScope>,
    /// Sequence points per document
    pub lines: Vec<PdbLines>,
    /// `MD2` records
    pub custom_debug_info: Vec<CustomDebugInfo>,
    /// Stepping information of async methods
    pub async_info: Option<AsyncMethodInfo>,
}

impl PdbFunction {
    /// A global function without locals or lines
    #[must_use]
    pub fn new(token: u32, name: impl Into<String>, segment: u16, offset: u32, length: u32) -> Self {
        PdbFunction {
            token,
            segment,
            offset,
            length,
            name: name.into(),
            global: true,
            ..PdbFunction::default()
        }
    }

    /// Indices of the scopes directly inside `parent`, `None` for the outermost ones
    pub fn child_scopes(&self, parent: Option<usize>) -> impl Iterator<Item = usize> + '_ {
        self.scopes
            .iter()
            .enumerate()
            .filter(move |(_, scope)| scope.parent == parent)
            .map(|(index, _)| index)
    }
}

/// A lexical scope inside a function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdbScope {
    /// Enclosing scope, always before this one; `None` for the function itself
    pub parent: Option<usize>,
    /// IL offset relative to the function start
    pub offset: u32,
    /// Bytes of IL covered
    pub length: u32,
    /// Locals of the scope
    pub slots: Vec<PdbSlot>,
    /// Namespaces imported by the scope
    pub used_namespaces: Vec<String>,
}

/// A local variable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdbSlot {
    /// Index in the local signature
    pub slot: u32,
    /// Type index, 0 for managed locals
    pub type_index: u32,
    /// `S_MANSLOT` flags; bit 0 marks compiler-generated locals
    pub flags: u16,
    /// Name
    pub name: String,
}
