//! Declarations of the runtime intrinsic functions.
//!
//! Compiled wasm calls into the runtime through a fixed set of intrinsic
//! symbols resolved at link time. This module enumerates those symbols and
//! their wire signatures; the implementations live in the runtime crate.

use crate::ValueType;
use cranelift_entity::entity_impl;

/// Helper macro to iterate over all intrinsic functions, their link-time
/// symbols, and their wire signatures.
#[macro_export]
macro_rules! foreach_intrinsic_function {
    ($mac:ident) => {
        $mac! {
            // Wakes up to `count` threads waiting on a shared-memory address.
            atomic_wake = "wavmIntrinsics.atomic_wake":
                (offset: i32, count: i32, memory_id: i64) -> i32;
            // Parks the calling thread until the 32-bit cell changes hands.
            atomic_wait_i32 = "wavmIntrinsics.atomic_wait_i32":
                (offset: i32, expected: i32, timeout: f64, memory_id: i64) -> i32;
            // Parks the calling thread until the 64-bit cell changes hands.
            atomic_wait_i64 = "wavmIntrinsics.atomic_wait_i64":
                (offset: i32, expected: i64, timeout: f64, memory_id: i64) -> i32;
            // Traps unconditionally; called for statically misaligned accesses.
            misaligned_atomic_trap = "wavmIntrinsics.misalignedAtomicTrap":
                (address: i32);
            // Spawns a wasm thread running a function out of the given table.
            launch_thread = "wavmIntrinsics.launchThread":
                (entry: i32, argument: i32, error: i32, table_id: i64);
        }
    };
}

/// The wire signature of an intrinsic function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntrinsicSignature {
    /// Parameter types, in order.
    pub params: &'static [ValueType],
    /// The result type, if the intrinsic returns a value.
    pub result: Option<ValueType>,
}

/// Index type of an intrinsic function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct IntrinsicIndex(u32);
entity_impl!(IntrinsicIndex);

macro_rules! intrinsic_value_type {
    (i32) => {
        ValueType::I32
    };
    (i64) => {
        ValueType::I64
    };
    (f64) => {
        ValueType::F64
    };
}

macro_rules! intrinsic_result_type {
    () => {
        None
    };
    ($result:ident) => {
        Some(intrinsic_value_type!($result))
    };
}

macro_rules! declare_indexes {
    (
        $(
            $name:ident = $sym:literal :
                ( $( $pname:ident: $param:ident ),* ) $( -> $result:ident )?;
        )*
    ) => {
        impl IntrinsicIndex {
            declare_indexes!(@indices; 0; $( $name; )*);
        }

        const INTRINSIC_SYMBOLS: &[&str] = &[ $( $sym, )* ];

        const INTRINSIC_SIGNATURES: &[IntrinsicSignature] = &[
            $(
                IntrinsicSignature {
                    params: &[ $( intrinsic_value_type!($param) ),* ],
                    result: intrinsic_result_type!($( $result )?),
                },
            )*
        ];
    };
    (@indices; $len:expr;) => {
        /// Returns the total number of intrinsic functions.
        pub const fn total() -> u32 {
            $len
        }
    };
    (@indices; $index:expr; $name:ident; $( $rest:ident; )*) => {
        /// Returns the index of the named intrinsic function.
        pub const fn $name() -> Self {
            Self($index)
        }
        declare_indexes!(@indices; ($index + 1); $( $rest; )*);
    };
}

foreach_intrinsic_function!(declare_indexes);

impl IntrinsicIndex {
    /// Returns the link-time symbol of this intrinsic.
    pub fn symbol(self) -> &'static str {
        INTRINSIC_SYMBOLS[self.0 as usize]
    }

    /// Returns the wire signature of this intrinsic.
    pub fn signature(self) -> &'static IntrinsicSignature {
        &INTRINSIC_SIGNATURES[self.0 as usize]
    }

    /// Iterates over all intrinsic indices in declaration order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..Self::total()).map(Self::from_u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_fixed() {
        let symbols: Vec<_> = IntrinsicIndex::all().map(|i| i.symbol()).collect();
        assert_eq!(
            symbols,
            [
                "wavmIntrinsics.atomic_wake",
                "wavmIntrinsics.atomic_wait_i32",
                "wavmIntrinsics.atomic_wait_i64",
                "wavmIntrinsics.misalignedAtomicTrap",
                "wavmIntrinsics.launchThread",
            ]
        );
    }

    #[test]
    fn wait_signatures() {
        let wait32 = IntrinsicIndex::atomic_wait_i32().signature();
        assert_eq!(
            wait32.params,
            [ValueType::I32, ValueType::I32, ValueType::F64, ValueType::I64]
        );
        assert_eq!(wait32.result, Some(ValueType::I32));

        let wait64 = IntrinsicIndex::atomic_wait_i64().signature();
        assert_eq!(
            wait64.params,
            [ValueType::I32, ValueType::I64, ValueType::F64, ValueType::I64]
        );

        let trap = IntrinsicIndex::misaligned_atomic_trap().signature();
        assert_eq!(trap.params, [ValueType::I32]);
        assert_eq!(trap.result, None);
    }
}
