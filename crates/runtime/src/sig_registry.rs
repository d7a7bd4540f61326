//! Implement a registry of function signatures, for fast indirect call
//! signature checking.

use ingot_environ::FunctionType;
use std::collections::hash_map::{Entry, HashMap};
use std::sync::{Arc, Mutex};

/// Wasm requires that the caller and callee signatures in an indirect call
/// match. To implement this efficiently, keep a registry of all signatures,
/// shared by all instances, so that call sites can just do a pointer
/// comparison.
#[derive(Debug, Default)]
pub struct SignatureRegistry {
    signatures: Mutex<HashMap<FunctionType, Arc<FunctionType>>>,
}

impl SignatureRegistry {
    /// Registers a signature and returns its canonical instance.
    ///
    /// Two calls with equal signatures return pointer-identical `Arc`s, so
    /// `Arc::ptr_eq` is a complete signature check.
    pub fn register(&self, ty: &FunctionType) -> Arc<FunctionType> {
        let mut signatures = self.signatures.lock().unwrap();
        match signatures.entry(ty.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(Arc::new(ty.clone())).clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingot_environ::ValueType;

    #[test]
    fn equal_signatures_are_pointer_identical() {
        let registry = SignatureRegistry::default();
        let a = registry.register(&FunctionType::new(vec![ValueType::I32], vec![]));
        let b = registry.register(&FunctionType::new(vec![ValueType::I32], vec![]));
        let c = registry.register(&FunctionType::new(vec![ValueType::I64], vec![]));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
