//! Errors reported while emitting a module.

use crate::ValueType;
use core::fmt;

/// A module emission error.
///
/// Emission errors are reported synchronously to the caller of module
/// emission; the partially populated backend module is abandoned. There are
/// no retries.
#[derive(Debug)]
pub enum EmitError {
    /// Two declarations produced the same external symbol name.
    DuplicateSymbol(String),
    /// A wasm value type that has no backend lowering appeared in a position
    /// that requires one.
    TypeLowering(ValueType),
    /// Writing the module's debug info failed.
    DebugInfo(String),
}

/// A convenient alias for a `Result` that uses `EmitError` as the error type.
pub type EmitResult<T> = Result<T, EmitError>;

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::DuplicateSymbol(name) => {
                write!(f, "duplicate external symbol `{name}`")
            }
            EmitError::TypeLowering(ty) => {
                write!(f, "value type {ty} cannot be lowered to a backend type")
            }
            EmitError::DebugInfo(message) => {
                write!(f, "debug info emission failed: {message}")
            }
        }
    }
}

impl std::error::Error for EmitError {}
