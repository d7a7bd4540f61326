//! Trap codes surfaced to wasm code.

use core::fmt;

/// The condition that caused a wasm trap.
///
/// Traps unwind to the nearest embedder-installed catch scope; they are not
/// recoverable from the wasm side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Trap {
    /// An atomic memory access whose address was not naturally aligned.
    MisalignedAtomicMemoryAccess,
    /// A memory access outside the bounds of a linear memory.
    AccessViolation,
    /// A table access to an element that was never initialized.
    UndefinedTableElement,
    /// An indirect call whose callee signature did not match the expected
    /// signature.
    IndirectCallSignatureMismatch,
    /// An integer division by zero, or an integer operation that overflowed.
    IntegerDivideByZeroOrIntegerOverflow,
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trap::MisalignedAtomicMemoryAccess => "misaligned atomic memory access",
            Trap::AccessViolation => "out of bounds memory access",
            Trap::UndefinedTableElement => "undefined table element",
            Trap::IndirectCallSignatureMismatch => "indirect call signature mismatch",
            Trap::IntegerDivideByZeroOrIntegerOverflow => {
                "integer divide by zero or integer overflow"
            }
        })
    }
}

impl std::error::Error for Trap {}
