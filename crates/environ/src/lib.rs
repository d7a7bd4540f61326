//! Internal dependency of the `ingot` runtime crates.
//!
//! This crate defines the data structures shared between compilation and
//! execution: the validated wasm module representation handed to the module
//! emitter, the trap taxonomy surfaced to wasm code, the external-symbol
//! naming scheme the runtime linker resolves against, and the declarations
//! of the runtime intrinsic functions.

#![deny(missing_docs)]

mod error;
#[macro_use]
mod intrinsic;
mod module;
pub mod symbols;
mod trap;
mod types;

pub use crate::error::*;
pub use crate::intrinsic::*;
pub use crate::module::*;
pub use crate::trap::*;
pub use crate::types::*;
