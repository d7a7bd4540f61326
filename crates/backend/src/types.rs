//! Backend value types and function signatures.

use core::fmt;

/// A backend value type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// 8-bit integer.
    I8,
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 128-bit vector.
    V128,
    /// An opaque pointer.
    Ptr,
    /// A machine-word-sized integer.
    Word,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Type::I8 => "i8",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::V128 => "v128",
            Type::Ptr => "ptr",
            Type::Word => "word",
        })
    }
}

/// The calling convention of a backend function.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CallConv {
    /// The host's native C calling convention.
    #[default]
    Native,
    /// The calling convention used between compiled wasm functions.
    Wasm,
}

/// A backend function signature.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Parameter types, in order.
    pub params: Vec<Type>,
    /// Result types, in order.
    pub returns: Vec<Type>,
    /// The function's calling convention.
    pub call_conv: CallConv,
}

impl Signature {
    /// Creates a signature from parameter and result types.
    pub fn new(params: Vec<Type>, returns: Vec<Type>, call_conv: CallConv) -> Self {
        Self {
            params,
            returns,
            call_conv,
        }
    }
}
