//! Data structures for representing validated wasm modules.
//!
//! Everything here is immutable during module emission; each declared object
//! is identified by its index, and indices are typed with `cranelift_entity`
//! newtypes so the parallel arrays in the emitter cannot be crossed up.

use crate::{FunctionType, ValueType};
use cranelift_entity::{entity_impl, PrimaryMap};
use serde::{Deserialize, Serialize};

/// Index type of a function signature inside the module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct TypeIndex(u32);
entity_impl!(TypeIndex);

/// Index type of a function (imported or defined) inside the module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct FuncIndex(u32);
entity_impl!(FuncIndex);

/// Index type of a defined function inside the module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct DefinedFuncIndex(u32);
entity_impl!(DefinedFuncIndex);

/// Index type of a table inside the module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct TableIndex(u32);
entity_impl!(TableIndex);

/// Index type of a linear memory inside the module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct MemoryIndex(u32);
entity_impl!(MemoryIndex);

/// Index type of a global variable inside the module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct GlobalIndex(u32);
entity_impl!(GlobalIndex);

/// Index type of an exception type inside the module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct ExceptionTypeIndex(u32);
entity_impl!(ExceptionTypeIndex);

/// Minimum and optional maximum size of a table or memory, in elements or
/// wasm pages respectively.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Limits {
    /// Initial size.
    pub min: u64,
    /// Optional maximum size.
    pub max: Option<u64>,
}

/// A declared wasm table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Table {
    /// The type of the table's elements.
    pub element: ValueType,
    /// The table's size limits.
    pub limits: Limits,
}

/// A declared wasm linear memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Memory {
    /// The memory's size limits, in pages.
    pub limits: Limits,
    /// Whether the memory may be shared between threads.
    pub shared: bool,
}

/// A declared wasm global variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Global {
    /// The type of the global's value.
    pub ty: ValueType,
    /// Whether wasm code may mutate the global.
    pub mutable: bool,
}

/// A declared wasm exception type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExceptionType {
    /// Types of the exception's payload values.
    pub params: Vec<ValueType>,
}

/// An imported function: its signature plus the import's two-level name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionImport {
    /// Index of the function's signature in [`Module::types`].
    pub type_index: TypeIndex,
    /// The name of the module the function is imported from.
    pub module: String,
    /// The name of the function within that module.
    pub field: String,
}

/// A function defined inside the module: its signature, declared locals, and
/// raw opcode stream.
///
/// The opcode stream is carried opaquely; decoding it belongs to the
/// function-body emitter, not to this crate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionDef {
    /// Index of the function's signature in [`Module::types`].
    pub type_index: TypeIndex,
    /// Types of the function's declared locals, in order.
    pub locals: Vec<ValueType>,
    /// The function's validated opcode stream.
    pub body: Vec<u8>,
}

/// The module's functions, partitioned into imports followed by definitions.
///
/// A [`FuncIndex`] spans both partitions: imports occupy the index range
/// `0..imports.len()`, and the `k`-th definition lives at index
/// `imports.len() + k`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Functions {
    /// The imported functions, in declaration order.
    pub imports: Vec<FunctionImport>,
    /// The functions defined in this module, in declaration order.
    pub defs: PrimaryMap<DefinedFuncIndex, FunctionDef>,
}

impl Functions {
    /// Total number of functions, imported and defined.
    pub fn len(&self) -> usize {
        self.imports.len() + self.defs.len()
    }

    /// Returns `true` if the module has no functions at all.
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.defs.is_empty()
    }

    /// Returns `true` if `index` refers to an imported function.
    pub fn is_imported(&self, index: FuncIndex) -> bool {
        index.as_u32() < self.imports.len() as u32
    }

    /// Converts a defined-function index to the module-wide function index.
    pub fn func_index(&self, defined: DefinedFuncIndex) -> FuncIndex {
        FuncIndex::from_u32(self.imports.len() as u32 + defined.as_u32())
    }

    /// Converts a module-wide function index to a defined-function index, or
    /// `None` if the index refers to an import.
    pub fn defined_func_index(&self, index: FuncIndex) -> Option<DefinedFuncIndex> {
        index
            .as_u32()
            .checked_sub(self.imports.len() as u32)
            .map(DefinedFuncIndex::from_u32)
    }

    /// Returns the signature index of the function at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn type_of(&self, index: FuncIndex) -> TypeIndex {
        match self.defined_func_index(index) {
            Some(defined) => self.defs[defined].type_index,
            None => self.imports[index.as_u32() as usize].type_index,
        }
    }

    /// Iterates over all function indices in order.
    pub fn indices(&self) -> impl Iterator<Item = FuncIndex> + '_ {
        (0..self.len() as u32).map(FuncIndex::from_u32)
    }
}

/// A validated wasm module, ready for emission.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Module {
    /// The module's declared function signatures, referenced by index.
    pub types: PrimaryMap<TypeIndex, FunctionType>,
    /// The module's functions, imports followed by definitions.
    pub functions: Functions,
    /// The module's declared tables.
    pub tables: PrimaryMap<TableIndex, Table>,
    /// The module's declared linear memories.
    pub memories: PrimaryMap<MemoryIndex, Memory>,
    /// The module's declared global variables.
    pub globals: PrimaryMap<GlobalIndex, Global>,
    /// The module's declared exception types.
    pub exception_types: PrimaryMap<ExceptionTypeIndex, ExceptionType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_functions(num_imports: usize, num_defs: usize) -> Module {
        let mut module = Module::default();
        let ty = module.types.push(FunctionType::default());
        for i in 0..num_imports {
            module.functions.imports.push(FunctionImport {
                type_index: ty,
                module: "env".to_string(),
                field: format!("f{i}"),
            });
        }
        for _ in 0..num_defs {
            module.functions.defs.push(FunctionDef {
                type_index: ty,
                locals: Vec::new(),
                body: Vec::new(),
            });
        }
        module
    }

    #[test]
    fn function_index_partition() {
        let module = module_with_functions(2, 3);
        let functions = &module.functions;
        assert_eq!(functions.len(), 5);

        assert!(functions.is_imported(FuncIndex::from_u32(0)));
        assert!(functions.is_imported(FuncIndex::from_u32(1)));
        assert!(!functions.is_imported(FuncIndex::from_u32(2)));

        assert_eq!(functions.defined_func_index(FuncIndex::from_u32(1)), None);
        assert_eq!(
            functions.defined_func_index(FuncIndex::from_u32(2)),
            Some(DefinedFuncIndex::from_u32(0))
        );
        for k in 0..3 {
            let defined = DefinedFuncIndex::from_u32(k);
            let index = functions.func_index(defined);
            assert_eq!(index.as_u32(), 2 + k);
            assert_eq!(functions.defined_func_index(index), Some(defined));
        }
    }

    #[test]
    fn type_of_spans_both_partitions() {
        let mut module = module_with_functions(1, 1);
        let other = module.types.push(FunctionType::new(vec![ValueType::I32], vec![]));
        module.functions.defs[DefinedFuncIndex::from_u32(0)].type_index = other;

        assert_eq!(
            module.functions.type_of(FuncIndex::from_u32(0)),
            TypeIndex::from_u32(0)
        );
        assert_eq!(module.functions.type_of(FuncIndex::from_u32(1)), other);
    }
}
