//! Atomic types shared by the pexe bitcode reader, analyzer and interpreter.
#![cfg_attr(not(feature = "std"), no_std)]

mod consts;
mod errno;
mod ids;
mod runtime_value;

pub use consts::*;
pub use errno::Errno;
pub use ids::{BasicBlockId, BuiltinId, FunctionId, GlobalVarId, TypeId, ValueId};
pub use runtime_value::{decode_sign_rotated, encode_sign_rotated, RuntimeValue};

/// A PNaCl register/pointer-sized word; the unit of everything in linear
/// memory and in the module's untyped constant payloads.
pub type Word = u64;

/// The derived type tag that opcode specialization dispatches on.
///
/// Every [`crate::TypeId`]-indexed [`Type`](https://docs.rs/pexe-reader) carries
/// one of these; function pointers are always tagged `I32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum BasicType {
    /// `i1`, the type of boolean/condition values.
    I1,
    /// `i8`
    I8,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `void`, used only for `ret void` and for functions with no result.
    Void,
}

impl BasicType {
    /// Size of a value of this type in linear memory, in bytes. `Void` has no
    /// in-memory representation.
    pub const fn size_of(self) -> Option<usize> {
        match self {
            BasicType::I1 | BasicType::I8 => Some(1),
            BasicType::I16 => Some(2),
            BasicType::I32 | BasicType::F32 => Some(4),
            BasicType::I64 | BasicType::F64 => Some(8),
            BasicType::Void => None,
        }
    }

    /// Whether this is one of the floating point basic types.
    pub const fn is_float(self) -> bool {
        matches!(self, BasicType::F32 | BasicType::F64)
    }

    /// Whether this is one of the integer basic types (`i1` included).
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            BasicType::I1 | BasicType::I8 | BasicType::I16 | BasicType::I32 | BasicType::I64
        )
    }
}
