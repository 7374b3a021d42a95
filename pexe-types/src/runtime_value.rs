//! The untagged 64-bit constant/register payload.
//!
//! A [`RuntimeValue`] carries no type tag of its own; the surrounding
//! [`crate::BasicType`] (on the constant, the instruction result, or the
//! memory operation) says how to reinterpret the bits.

/// An untagged 64-bit payload, reinterpretable as any scalar PNaCl type.
#[derive(Clone, Copy, PartialEq)]
pub struct RuntimeValue(u64);

macro_rules! accessor {
    ($get:ident, $set:ident, $from:ident, $ty:ty) => {
        /// Reinterpret the low bits of this payload as
        #[doc = concat!("`", stringify!($ty), "`.")]
        pub fn $get(self) -> $ty {
            <$ty>::from_ne_bytes(self.0.to_ne_bytes()[..core::mem::size_of::<$ty>()].try_into().unwrap())
        }

        /// Build a payload whose low bits are this
        #[doc = concat!("`", stringify!($ty), "`,")]
        /// zero-extended.
        pub fn $from(v: $ty) -> Self {
            let mut buf = [0u8; 8];
            buf[..core::mem::size_of::<$ty>()].copy_from_slice(&v.to_ne_bytes());
            Self(u64::from_ne_bytes(buf))
        }

        #[allow(dead_code)]
        fn $set(&mut self, v: $ty) {
            *self = Self::$from(v);
        }
    };
}

impl RuntimeValue {
    /// The zero payload.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw 64-bit payload, e.g. as read from memory or the constant
    /// table.
    pub const fn from_u64(bits: u64) -> Self {
        Self(bits)
    }

    /// The raw 64-bit payload.
    pub const fn to_u64(self) -> u64 {
        self.0
    }

    accessor!(as_i8, set_i8, from_i8, i8);
    accessor!(as_u8, set_u8, from_u8, u8);
    accessor!(as_i16, set_i16, from_i16, i16);
    accessor!(as_u16, set_u16, from_u16, u16);
    accessor!(as_i32, set_i32, from_i32, i32);
    accessor!(as_u32, set_u32, from_u32, u32);
    accessor!(as_i64, set_i64, from_i64, i64);
    accessor!(as_u64, set_u64, from_u64_bits, u64);

    /// Reinterpret as `f32`.
    pub fn as_f32(self) -> f32 {
        f32::from_bits(self.as_u32())
    }

    /// Build a payload from `f32`.
    pub fn from_f32(v: f32) -> Self {
        Self::from_u32(v.to_bits())
    }

    /// Reinterpret as `f64`.
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Build a payload from `f64`.
    pub fn from_f64(v: f64) -> Self {
        Self(v.to_bits())
    }
}

impl core::fmt::Debug for RuntimeValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RuntimeValue(0x{:016x})", self.0)
    }
}

/// Decode a sign-rotated integer constant: bit 0 is the sign, the remaining
/// bits are the magnitude. The encoding `1` decodes as `i64::MIN`.
///
/// This is the PNaCl bitcode wire format for `CST_CODE_INTEGER` and switch
/// case values; see spec.md's "Invariant — monotonic ids" sidebar on
/// `Constant`.
pub fn decode_sign_rotated(v: u64) -> i64 {
    if v & 1 == 0 {
        (v >> 1) as i64
    } else if v != 1 {
        -((v >> 1) as i64)
    } else {
        i64::MIN
    }
}

/// Inverse of [`decode_sign_rotated`].
pub fn encode_sign_rotated(v: i64) -> u64 {
    if v == i64::MIN {
        1
    } else if v < 0 {
        ((-v as u64) << 1) | 1
    } else {
        (v as u64) << 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_rotation_known_values() {
        assert_eq!(decode_sign_rotated(0), 0);
        assert_eq!(decode_sign_rotated(1), i64::MIN);
        assert_eq!(decode_sign_rotated(2), 1);
        assert_eq!(decode_sign_rotated(3), -1);
        assert_eq!(encode_sign_rotated(0), 0);
        assert_eq!(encode_sign_rotated(1), 2);
        assert_eq!(encode_sign_rotated(-1), 3);
        assert_eq!(encode_sign_rotated(i64::MIN), 1);
    }

    #[quickcheck_macros::quickcheck]
    fn sign_rotation_round_trips(x: i64) -> bool {
        decode_sign_rotated(encode_sign_rotated(x)) == x
    }

    #[test]
    fn payload_reinterprets_float_bits() {
        let v = RuntimeValue::from_f64(core::f64::consts::PI);
        assert_eq!(v.as_f64(), core::f64::consts::PI);
        let v = RuntimeValue::from_i32(-7);
        assert_eq!(v.as_i32(), -7);
    }
}
