//! Small handle types standing in for native pointers.
//!
//! The reader and analyzer grow the module's arrays (types, values, basic
//! blocks) while parsing, so every cross reference is an index rather than a
//! pointer: nothing is ever invalidated by a later `push`.

use crate::consts::INVALID_ID;
use core::fmt;

macro_rules! handle {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel used for "no such id", e.g. the root call frame's
            /// function id, or a not-yet-computed predecessor slot.
            pub const INVALID: Self = Self(INVALID_ID);

            /// Construct from a raw, already-range-checked index.
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// The raw index into the owning array.
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Whether this is the [`Self::INVALID`] sentinel.
            pub const fn is_valid(self) -> bool {
                self.0 != INVALID_ID
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                } else {
                    write!(f, concat!(stringify!($name), "(invalid)"))
                }
            }
        }

        impl From<u32> for $name {
            fn from(index: u32) -> Self {
                Self(index)
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                Self(index as u32)
            }
        }
    };
}

handle!(TypeId, "Index into the module's interned type table.");
handle!(
    ValueId,
    "Index of an SSA value: module-scope values first, then, inside a \
     function, args, constants and instruction results in declaration order."
);
handle!(FunctionId, "Index into the module's function table.");
handle!(BasicBlockId, "Index of a basic block within its function.");
handle!(GlobalVarId, "Index into the module's global variable table.");

/// Identifier for an IRT built-in function, dispatched outside the normal
/// call-frame protocol. Any function pointer value `< MAX_BUILTINS << 2`
/// names one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuiltinId(u32);

impl BuiltinId {
    /// Construct from a raw built-in table index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for BuiltinId {
    fn from(index: u32) -> Self {
        Self(index)
    }
}
