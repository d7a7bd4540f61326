//! Function tables and the functions stored in them.

use ingot_environ::{FunctionType, Trap};
use std::fmt;
use std::sync::Arc;

/// A host-invokable function paired with its canonical signature.
///
/// Signatures come from the runtime's [`crate::SignatureRegistry`], so
/// checking one is a pointer comparison.
#[derive(Clone)]
pub struct FunctionInstance {
    signature: Arc<FunctionType>,
    callee: Arc<dyn Fn(i32) -> Result<(), Trap> + Send + Sync>,
}

impl FunctionInstance {
    /// Creates a function instance from its canonical signature and entry
    /// point.
    pub fn new(
        signature: Arc<FunctionType>,
        callee: impl Fn(i32) -> Result<(), Trap> + Send + Sync + 'static,
    ) -> Self {
        Self {
            signature,
            callee: Arc::new(callee),
        }
    }

    /// The function's canonical signature.
    pub fn signature(&self) -> &Arc<FunctionType> {
        &self.signature
    }

    /// Invokes the function. A returned trap unwinds no further than this
    /// call.
    pub fn invoke(&self, argument: i32) -> Result<(), Trap> {
        (self.callee)(argument)
    }
}

impl fmt::Debug for FunctionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionInstance")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// A table of function elements, indexed by wasm code.
#[derive(Debug, Default)]
pub struct TableInstance {
    elements: Vec<Option<FunctionInstance>>,
}

impl TableInstance {
    /// Creates a table with `len` undefined elements.
    pub fn with_size(len: usize) -> Self {
        Self {
            elements: vec![None; len],
        }
    }

    /// The number of elements, defined or not.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the table has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Defines the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn define(&mut self, index: usize, function: FunctionInstance) {
        self.elements[index] = Some(function);
    }

    /// Resolves the element at `index`, checking bounds and that the stored
    /// signature is pointer-identical to `expected`.
    pub fn get_function(
        &self,
        expected: &Arc<FunctionType>,
        index: u32,
    ) -> Result<&FunctionInstance, Trap> {
        let function = self
            .elements
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(Trap::UndefinedTableElement)?;
        if !Arc::ptr_eq(function.signature(), expected) {
            return Err(Trap::IndirectCallSignatureMismatch);
        }
        Ok(function)
    }
}
