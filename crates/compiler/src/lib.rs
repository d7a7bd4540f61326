//! Lowering of validated wasm modules into the backend compiler IR.
//!
//! The emitter populates a [`ingot_backend::Module`] with one declaration
//! per wasm object, one function shell per wasm function, and the external
//! symbols the runtime linker resolves against per-instance runtime data.
//! Lowering the opcode stream of each function body is delegated to a
//! [`FunctionBodyEmitter`] supplied by the caller.

#![deny(missing_docs)]

mod emit;

pub use crate::emit::*;
