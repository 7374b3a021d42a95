//! The runtime instruction variants, one group per spec §3 "Instruction"
//! opcode group, specialized by operand [`BasicType`].

use alloc::vec::Vec;
use pexe_types::{BasicType, BuiltinId, FunctionId, ValueId};

/// A binary arithmetic/logic operation, specialized by [`BasicType`] at
/// dispatch time rather than at encode time — the operand type lives
/// alongside the op in [`RuntimeOp::Binop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// signed `/`
    SDiv,
    /// unsigned `/`
    UDiv,
    /// signed `%`
    SRem,
    /// unsigned `%`
    URem,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `<<`
    Shl,
    /// logical `>>`
    LShr,
    /// arithmetic `>>`
    AShr,
}

/// `icmp`/`fcmp` predicates. `CMP2` forms always produce a `u8` `0`/`1`
/// result regardless of the operand [`BasicType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// signed `<`
    SLt,
    /// signed `<=`
    SLe,
    /// unsigned `<`
    ULt,
    /// unsigned `<=`
    ULe,
    /// ordered float `<`
    OLt,
    /// ordered float `<=`
    OLe,
    /// ordered `==`
    OEq,
}

/// A `cast` specialization: truncate, zero/sign-extend, or a float/int
/// bit- or value-conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
pub enum CastOp {
    /// Narrow an integer, dropping high bits.
    Trunc,
    /// Widen an integer, filling with zero.
    ZExt,
    /// Widen an integer, filling with the sign bit.
    SExt,
    /// Reinterpret bits between same-width int and float.
    Bitcast,
    /// Convert an integer value to the nearest float value.
    IntToFloat { signed: bool },
    /// Convert a float value to the nearest integer value (truncating
    /// toward zero).
    FloatToInt { signed: bool },
    /// Widen or narrow between `f32` and `f64`.
    FloatCast,
}

/// Intrinsics lowered to their own opcode (spec §4.5 "Intrinsics").
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
pub enum Intrinsic {
    /// `llvm.memcpy`
    Memcpy,
    /// `llvm.memmove`
    Memmove,
    /// `llvm.memset`
    Memset,
    /// `llvm.bswap`
    Bswap,
    /// `llvm.ctlz`
    Ctlz,
    /// `llvm.cttz`
    Cttz,
    /// `llvm.fabs`
    Fabs,
    /// `llvm.sqrt`
    Sqrt,
    /// `llvm.trap`
    Trap,
    /// `llvm.stacksave`
    StackSave,
    /// `llvm.stackrestore`
    StackRestore,
    /// `llvm.nacl.setjmp`
    SetJmp,
    /// `llvm.nacl.longjmp`
    LongJmp,
    /// `llvm.nacl.read.tp`, thread pointer read.
    NaclReadTp,
    /// An atomic load.
    AtomicLoad,
    /// An atomic store.
    AtomicStore,
    /// An atomic fence.
    AtomicFence,
    /// An atomic compare-and-swap.
    AtomicCmpXchg,
    /// An atomic read-modify-write, specialized on the `op` immediate when
    /// it is a compile-time constant (spec §3 "Instruction").
    AtomicRmw { op: AtomicRmwOp },
}

/// The specialized operation of an atomic read-modify-write intrinsic.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
pub enum AtomicRmwOp {
    /// Fetch-and-add
    #[default]
    Add,
    /// Fetch-and-sub
    Sub,
    /// Fetch-and-and
    And,
    /// Fetch-and-or
    Or,
    /// Fetch-and-xor
    Xor,
    /// Exchange
    Xchg,
}

/// One `(dest, source)` write a predecessor must perform on the edge to a
/// successor's φ node, per spec §4.4 step 3 "Phi-assigns".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiAssign {
    /// The φ destination value, local to the successor block.
    pub dest: ValueId,
    /// The value to copy in, as seen from the predecessor.
    pub source: ValueId,
}

/// A single runtime instruction: already-specialized, ready to execute
/// without further type dispatch beyond matching this enum.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeOp {
    /// A binary arithmetic/logic op, `dest = lhs op rhs`.
    Binop {
        op: BinOp,
        ty: BasicType,
        dest: ValueId,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// A cast, `dest = cast(src)`.
    Cast {
        op: CastOp,
        from: BasicType,
        to: BasicType,
        dest: ValueId,
        src: ValueId,
    },
    /// A `cmp2` (`icmp`/`fcmp`) producing a `u8` `0`/`1`.
    Cmp2 {
        op: CmpOp,
        ty: BasicType,
        dest: ValueId,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// A `select`/`vselect`, `dest = cond ? t : f`.
    Select {
        ty: BasicType,
        dest: ValueId,
        cond: ValueId,
        if_true: ValueId,
        if_false: ValueId,
    },
    /// `alloca`: bump the frame-local stack allocator.
    Alloca {
        dest: ValueId,
        size: ValueId,
        align: u32,
    },
    /// `load`.
    Load {
        ty: BasicType,
        dest: ValueId,
        addr: ValueId,
    },
    /// `store`.
    Store {
        ty: BasicType,
        addr: ValueId,
        value: ValueId,
    },
    /// Unconditional branch. `target` is an absolute byte offset into the
    /// owning function's runtime stream.
    Br { target: u32, phi: Vec<PhiAssign> },
    /// Conditional branch on a `u8`/`i1` condition.
    BrInt1 {
        cond: ValueId,
        if_true: u32,
        phi_true: Vec<PhiAssign>,
        if_false: u32,
        phi_false: Vec<PhiAssign>,
    },
    /// Multi-way branch on an integer value.
    Switch {
        ty: BasicType,
        value: ValueId,
        default_target: u32,
        default_phi: Vec<PhiAssign>,
        /// `(case value, target offset, phi writes for that edge)`.
        cases: Vec<(i64, u32, Vec<PhiAssign>)>,
    },
    /// `ret void`.
    RetVoid,
    /// `ret <value>`.
    RetValue { ty: BasicType, value: ValueId },
    /// `unreachable`: always a fatal fault when executed.
    Unreachable,
    /// A direct call to a known function.
    Call {
        dest: Option<ValueId>,
        ret_ty: BasicType,
        callee: FunctionId,
        args: Vec<ValueId>,
    },
    /// An indirect call through a function-pointer value, which may name
    /// either a built-in or a regular function.
    CallIndirect {
        dest: Option<ValueId>,
        ret_ty: BasicType,
        callee: ValueId,
        args: Vec<ValueId>,
    },
    /// A direct call to a known IRT built-in (resolved at lowering time when
    /// the callee is a module-scope function value already known to alias
    /// a built-in).
    CallBuiltin {
        dest: Option<ValueId>,
        ret_ty: BasicType,
        builtin: BuiltinId,
        args: Vec<ValueId>,
    },
    /// An intrinsic call, lowered to its own dedicated opcode.
    Intrinsic {
        kind: Intrinsic,
        dest: Option<ValueId>,
        ty: BasicType,
        args: Vec<ValueId>,
    },
}

impl RuntimeOp {
    /// Whether this instruction ends a basic block (spec §4.3 FUNCTION:
    /// "terminators... close a block").
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            RuntimeOp::Br { .. }
                | RuntimeOp::BrInt1 { .. }
                | RuntimeOp::Switch { .. }
                | RuntimeOp::RetVoid
                | RuntimeOp::RetValue { .. }
                | RuntimeOp::Unreachable
        )
    }
}
