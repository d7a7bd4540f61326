//! Value and function types for validated wasm modules.

use core::fmt;
use serde::{Deserialize, Serialize};

/// The type of a value that wasm code operates on.
///
/// `Any` is the bottom type used by unreachable code and carries no runtime
/// representation of its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    /// The bottom type; no concrete representation.
    Any = 0,
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
    /// An opaque reference to any object.
    Anyref,
    /// An opaque reference to a function.
    Anyfunc,
    /// The type of a null reference.
    Nullref,
}

/// The number of distinct [`ValueType`]s.
pub const NUM_VALUE_TYPES: usize = 9;

impl ValueType {
    /// Returns the index of this type, usable with parallel arrays sized
    /// [`NUM_VALUE_TYPES`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Any => "any",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::V128 => "v128",
            ValueType::Anyref => "anyref",
            ValueType::Anyfunc => "anyfunc",
            ValueType::Nullref => "nullref",
        })
    }
}

/// A function signature: a tuple of parameter types and a tuple of result
/// types.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    /// Types of the function's parameters, in order.
    pub params: Vec<ValueType>,
    /// Types of the function's results, in order.
    pub results: Vec<ValueType>,
}

impl FunctionType {
    /// Creates a signature from parameter and result tuples.
    pub fn new(params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        Self { params, results }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> (")?;
        for (i, result) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{result}")?;
        }
        write!(f, ")")
    }
}
