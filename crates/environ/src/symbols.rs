//! The external-symbol naming scheme.
//!
//! Every name here is emitted as an external-linkage declaration and resolved
//! by the runtime linker against per-instance runtime data or intrinsic
//! implementations. The scheme is stable ASCII and must match the linker's
//! expectations exactly.

use target_lexicon::{OperatingSystem, Triple};

/// The external global that points at the module instance.
pub const MODULE_INSTANCE: &str = "moduleInstance";

/// The external global whose address is the bias applied to all references
/// stored in a table.
pub const TABLE_REFERENCE_BIAS: &str = "tableReferenceBias";

/// The exception personality consulted by the Windows SEH unwinder.
pub const PERSONALITY_SEH: &str = "__C_specific_handler";

/// The exception personality consulted by the Itanium unwinder.
pub const PERSONALITY_ITANIUM: &str = "__gxx_personality_v0";

/// The Itanium runtime entry point referenced by emitted landing pads.
pub const CXA_BEGIN_CATCH: &str = "__cxa_begin_catch";

/// Produces an indexed external name such as `typeId0` or `functionDef12`.
pub fn external_name(base: &str, index: usize) -> String {
    format!("{base}{index}")
}

/// Returns `true` if `triple` unwinds with Windows structured exception
/// handling rather than the Itanium ABI.
pub fn uses_seh(triple: &Triple) -> bool {
    matches!(triple.operating_system, OperatingSystem::Windows)
}

/// Returns the personality symbol appropriate for `triple`.
pub fn personality_symbol(triple: &Triple) -> &'static str {
    if uses_seh(triple) {
        PERSONALITY_SEH
    } else {
        PERSONALITY_ITANIUM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn indexed_names() {
        assert_eq!(external_name("typeId", 0), "typeId0");
        assert_eq!(external_name("tableOffset", 3), "tableOffset3");
        assert_eq!(external_name("functionDefInstance", 12), "functionDefInstance12");
    }

    #[test]
    fn personality_by_target() {
        let windows = Triple::from_str("x86_64-pc-windows-msvc").unwrap();
        let linux = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        let macos = Triple::from_str("aarch64-apple-darwin").unwrap();

        assert!(uses_seh(&windows));
        assert_eq!(personality_symbol(&windows), "__C_specific_handler");
        assert!(!uses_seh(&linux));
        assert_eq!(personality_symbol(&linux), "__gxx_personality_v0");
        assert_eq!(personality_symbol(&macos), "__gxx_personality_v0");
    }
}
