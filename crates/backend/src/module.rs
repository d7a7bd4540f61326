//! The backend module being populated: declarations, constants, metadata.

use crate::{DebugBuilder, Signature, Type};
use core::fmt;
use cranelift_entity::{entity_impl, PrimaryMap};
use std::collections::hash_map::{Entry, HashMap};

/// An opaque reference to an external data declaration.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId(u32);
entity_impl!(DataId, "data");

/// An opaque reference to a function declaration.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(u32);
entity_impl!(FuncId, "fn");

/// An opaque reference to a constant.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constant(u32);
entity_impl!(Constant, "const");

/// An opaque reference to a piece of interned metadata.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetadataId(u32);
entity_impl!(MetadataId, "md");

/// An external data declaration: a named symbol of the given type, defined
/// elsewhere and resolved at link time.
#[derive(Clone, Debug)]
pub struct DataDecl {
    /// The declaration's external symbol.
    pub name: String,
    /// The declared type of the symbol's contents.
    pub ty: Type,
}

/// A function declaration.
///
/// The body, if any, is produced separately by a function-body emitter; this
/// record carries the declaration surface the linker and unwinder consume.
#[derive(Clone, Debug)]
pub struct FunctionDecl {
    /// The function's external symbol.
    pub name: String,
    /// The function's signature.
    pub signature: Signature,
    /// The exception personality the unwinder consults for this function.
    pub personality: Option<FuncId>,
    /// Machine words laid out immediately before the function's entry point.
    pub prefix_data: Option<Constant>,
}

/// The value of a constant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstantData {
    /// The address of a data declaration, as a pointer.
    SymbolAddress(DataId),
    /// The address of a data declaration, cast to a machine-word integer.
    PtrToInt(DataId),
    /// An array of machine-word constants.
    WordArray(Box<[Constant]>),
}

/// A piece of module-level metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataData {
    /// A branch-weight pair attached to conditional branches.
    BranchWeights {
        /// Weight of the taken edge.
        taken: i32,
        /// Weight of the not-taken edge.
        not_taken: i32,
    },
    /// An uninterpreted metadata string.
    Str(&'static str),
}

/// Either kind of symbol-owning declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolId {
    /// A data declaration.
    Data(DataId),
    /// A function declaration.
    Func(FuncId),
}

/// An error produced while building a module.
#[derive(Debug)]
pub enum ModuleError {
    /// A declaration reused an already-declared symbol name.
    DuplicateSymbol(String),
    /// Writing the DWARF debug sections failed.
    Dwarf(gimli::write::Error),
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleError::DuplicateSymbol(name) => write!(f, "duplicate symbol `{name}`"),
            ModuleError::Dwarf(error) => write!(f, "DWARF emission failed: {error}"),
        }
    }
}

impl std::error::Error for ModuleError {}

impl From<gimli::write::Error> for ModuleError {
    fn from(error: gimli::write::Error) -> Self {
        ModuleError::Dwarf(error)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    SymbolAddress(DataId),
    PtrToInt(DataId),
}

/// A backend module under construction.
pub struct Module {
    name: String,
    data: PrimaryMap<DataId, DataDecl>,
    functions: PrimaryMap<FuncId, FunctionDecl>,
    constants: PrimaryMap<Constant, ConstantData>,
    metadata: PrimaryMap<MetadataId, MetadataData>,
    symbols: HashMap<String, SymbolId>,
    interned_constants: HashMap<ConstKey, Constant>,
    /// The module's debug-info builder.
    pub debug: DebugBuilder,
}

impl Module {
    /// Creates an empty module with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: PrimaryMap::new(),
            functions: PrimaryMap::new(),
            constants: PrimaryMap::new(),
            metadata: PrimaryMap::new(),
            symbols: HashMap::new(),
            interned_constants: HashMap::new(),
            debug: DebugBuilder::new(),
        }
    }

    /// The module's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn claim_symbol(&mut self, name: &str, id: SymbolId) -> Result<(), ModuleError> {
        match self.symbols.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ModuleError::DuplicateSymbol(name.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(id);
                Ok(())
            }
        }
    }

    /// Declares an external data symbol of the given type.
    pub fn declare_data(&mut self, name: &str, ty: Type) -> Result<DataId, ModuleError> {
        let id = self.data.next_key();
        self.claim_symbol(name, SymbolId::Data(id))?;
        self.data.push(DataDecl {
            name: name.to_string(),
            ty,
        });
        Ok(id)
    }

    /// Declares an external function with the given signature.
    pub fn declare_function(
        &mut self,
        name: &str,
        signature: Signature,
    ) -> Result<FuncId, ModuleError> {
        let id = self.functions.next_key();
        self.claim_symbol(name, SymbolId::Func(id))?;
        self.functions.push(FunctionDecl {
            name: name.to_string(),
            signature,
            personality: None,
            prefix_data: None,
        });
        Ok(id)
    }

    /// Returns the pointer-typed constant holding `data`'s address.
    ///
    /// Constants derived from the same declaration are uniqued, so two calls
    /// with the same `data` return the same handle.
    pub fn symbol_address(&mut self, data: DataId) -> Constant {
        match self.interned_constants.entry(ConstKey::SymbolAddress(data)) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                *entry.insert(self.constants.push(ConstantData::SymbolAddress(data)))
            }
        }
    }

    /// Returns the machine-word constant holding `data`'s address cast to an
    /// integer. Uniqued like [`Module::symbol_address`].
    pub fn ptr_to_int(&mut self, data: DataId) -> Constant {
        match self.interned_constants.entry(ConstKey::PtrToInt(data)) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => *entry.insert(self.constants.push(ConstantData::PtrToInt(data))),
        }
    }

    /// Creates an array-of-machine-words constant.
    pub fn word_array(&mut self, elements: Vec<Constant>) -> Constant {
        self.constants
            .push(ConstantData::WordArray(elements.into_boxed_slice()))
    }

    /// Interns a branch-weight metadata pair.
    pub fn branch_weights(&mut self, taken: i32, not_taken: i32) -> MetadataId {
        self.metadata
            .push(MetadataData::BranchWeights { taken, not_taken })
    }

    /// Interns a metadata string.
    pub fn metadata_str(&mut self, value: &'static str) -> MetadataId {
        self.metadata.push(MetadataData::Str(value))
    }

    /// Attaches an exception personality to a function.
    pub fn set_personality(&mut self, func: FuncId, personality: FuncId) {
        self.functions[func].personality = Some(personality);
    }

    /// Attaches prefix data to a function.
    pub fn set_prefix_data(&mut self, func: FuncId, data: Constant) {
        self.functions[func].prefix_data = Some(data);
    }

    /// Looks up a declared symbol by name.
    pub fn symbol(&self, name: &str) -> Option<SymbolId> {
        self.symbols.get(name).copied()
    }

    /// Returns `true` if `name` has been declared.
    pub fn contains_symbol(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// Iterates over all declared symbol names, in no particular order.
    pub fn symbol_names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    /// Looks up the function declared under `name`.
    pub fn function_named(&self, name: &str) -> Option<FuncId> {
        match self.symbol(name)? {
            SymbolId::Func(id) => Some(id),
            SymbolId::Data(_) => None,
        }
    }

    /// Looks up the data declared under `name`.
    pub fn data_named(&self, name: &str) -> Option<DataId> {
        match self.symbol(name)? {
            SymbolId::Data(id) => Some(id),
            SymbolId::Func(_) => None,
        }
    }

    /// Returns a data declaration.
    pub fn data(&self, id: DataId) -> &DataDecl {
        &self.data[id]
    }

    /// Returns a function declaration.
    pub fn function(&self, id: FuncId) -> &FunctionDecl {
        &self.functions[id]
    }

    /// Returns a constant's value.
    pub fn constant(&self, id: Constant) -> &ConstantData {
        &self.constants[id]
    }

    /// Returns a piece of metadata.
    pub fn metadata(&self, id: MetadataId) -> &MetadataData {
        &self.metadata[id]
    }

    /// The number of function declarations.
    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    /// The number of data declarations.
    pub fn num_data(&self) -> usize {
        self.data.len()
    }
}
