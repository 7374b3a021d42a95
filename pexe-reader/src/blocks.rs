//! Block-id-specific record interpretation. [`crate::reader`] owns the
//! generic ENTER_SUBBLOCK/END_BLOCK/DEFINE_ABBREV walk; this module turns
//! each block's records into the pieces of [`crate::ir::Module`].

use pexe_types::{decode_sign_rotated, BasicBlockId, BasicType, FunctionId, RuntimeValue, TypeId};

use crate::error::BitstreamError;
use crate::ir::{BasicBlock, Constant, Function, GlobalVar, Instruction, IntrinsicName, Module, Type};
use crate::record::Record;

pub const BLOCKID_BLOCKINFO: u32 = 0;
pub const BLOCKID_MODULE: u32 = 8;
pub const BLOCKID_CONSTANTS: u32 = 11;
pub const BLOCKID_FUNCTION: u32 = 12;
pub const BLOCKID_VALUE_SYMTAB: u32 = 14;
pub const BLOCKID_TYPE: u32 = 17;
pub const BLOCKID_GLOBALVAR: u32 = 19;

const BLOCKINFO_CODE_SETBID: u32 = 1;

const MODULE_CODE_FUNCTION: u32 = 8;

const TYPE_CODE_NUMENTRY: u32 = 1;
const TYPE_CODE_VOID: u32 = 2;
const TYPE_CODE_FLOAT: u32 = 3;
const TYPE_CODE_DOUBLE: u32 = 4;
const TYPE_CODE_INTEGER: u32 = 7;
const TYPE_CODE_FUNCTION: u32 = 21;

const GLOBALVAR_CODE_VAR: u32 = 0;
const GLOBALVAR_CODE_COMPOUND: u32 = 1;
const GLOBALVAR_CODE_ZEROFILL: u32 = 2;
const GLOBALVAR_CODE_DATA: u32 = 3;
const GLOBALVAR_CODE_RELOC: u32 = 4;

const VALUESYMTAB_CODE_ENTRY: u32 = 1;
const VALUESYMTAB_CODE_BBENTRY: u32 = 2;

const FUNCTION_CODE_DECLAREBLOCKS: u32 = 1;
const FUNCTION_CODE_INST_BINOP: u32 = 2;
const FUNCTION_CODE_INST_CAST: u32 = 3;
const FUNCTION_CODE_INST_RET: u32 = 10;
const FUNCTION_CODE_INST_BR: u32 = 11;
const FUNCTION_CODE_INST_SWITCH: u32 = 12;
const FUNCTION_CODE_INST_UNREACHABLE: u32 = 15;
const FUNCTION_CODE_INST_PHI: u32 = 16;
const FUNCTION_CODE_INST_ALLOCA: u32 = 19;
const FUNCTION_CODE_INST_LOAD: u32 = 20;
const FUNCTION_CODE_INST_STORE: u32 = 24;
const FUNCTION_CODE_INST_CMP2: u32 = 28;
const FUNCTION_CODE_INST_VSELECT: u32 = 29;
const FUNCTION_CODE_INST_CALL: u32 = 34;
const FUNCTION_CODE_INST_CALL_INDIRECT: u32 = 44;

const CONSTANTS_CODE_SETTYPE: u32 = 1;
const CONSTANTS_CODE_UNDEF: u32 = 3;
const CONSTANTS_CODE_INTEGER: u32 = 4;
const CONSTANTS_CODE_FLOAT: u32 = 6;

/// Maps a relative value number (as encountered in a FUNCTION block
/// operand) to an absolute [`pexe_types::ValueId`] given how many values are
/// already in scope. PNaCl encodes most operands as `current - relative`.
pub fn relative_to_value_id(current_value_count: u32, relative: u32) -> pexe_types::ValueId {
    pexe_types::ValueId::new(current_value_count.wrapping_sub(relative))
}

/// Interpret one TYPE block record, appending to `types`.
pub fn handle_type_record(types: &mut Vec<Type>, rec: &Record) -> Result<(), BitstreamError> {
    match rec.code {
        TYPE_CODE_NUMENTRY => {
            let n = rec.get_u32(0).unwrap_or(0) as usize;
            types.reserve(n);
        }
        TYPE_CODE_VOID => types.push(Type::Void),
        TYPE_CODE_FLOAT => types.push(Type::Float),
        TYPE_CODE_DOUBLE => types.push(Type::Double),
        TYPE_CODE_INTEGER => {
            let width = rec.get_u32(0).ok_or(BitstreamError::MissingOperand { code: rec.code, index: 0 })?;
            types.push(Type::Integer(width));
        }
        TYPE_CODE_FUNCTION => {
            let is_varargs = rec.get_u32(0).unwrap_or(0) != 0;
            let return_type = TypeId::new(rec.get_u32(1).unwrap_or(0));
            let params = rec.values[2..].iter().map(|&v| TypeId::new(v as u32)).collect();
            types.push(Type::Function { return_type, is_varargs, params });
        }
        other => return Err(BitstreamError::UnknownRecordCode { block_id: BLOCKID_TYPE, code: other }),
    }
    Ok(())
}

/// Interpret one MODULE-scope record that isn't itself a subblock entry.
pub fn handle_module_record(functions: &mut Vec<Function>, rec: &Record) -> Result<(), BitstreamError> {
    match rec.code {
        MODULE_CODE_FUNCTION => {
            let type_id = TypeId::new(rec.get_u32(0).unwrap_or(0));
            // fields: type, callingconv, is_proto, linkage ... we only need
            // type and whether this is a declaration (is_proto != 0).
            let is_proto = rec.get_u32(2).unwrap_or(0) != 0;
            functions.push(Function {
                type_id,
                is_declaration_only: is_proto,
                ..Function::default()
            });
        }
        other => return Err(BitstreamError::UnknownRecordCode { block_id: BLOCKID_MODULE, code: other }),
    }
    Ok(())
}

/// Interpret one GLOBALVAR-block record, threading the "current" global
/// being built since COMPOUND/ZEROFILL/DATA/RELOC records build up a single
/// global across several records.
pub fn handle_globalvar_record(
    global_vars: &mut Vec<GlobalVar>,
    current: &mut Option<GlobalVar>,
    remaining_compound: &mut u32,
    rec: &Record,
) -> Result<(), BitstreamError> {
    match rec.code {
        GLOBALVAR_CODE_VAR => {
            if let Some(prev) = current.take() {
                global_vars.push(prev);
            }
            let alignment = rec.get_u32(0).unwrap_or(0);
            let is_constant = rec.get_u32(1).unwrap_or(0) != 0;
            *current = Some(GlobalVar { alignment, is_constant, ..GlobalVar::default() });
            *remaining_compound = 1;
        }
        GLOBALVAR_CODE_COMPOUND => {
            *remaining_compound = rec.get_u32(0).unwrap_or(1);
        }
        GLOBALVAR_CODE_ZEROFILL => {
            let len = rec.get_u32(0).unwrap_or(0) as usize;
            if let Some(g) = current.as_mut() {
                g.data.resize(g.data.len() + len, 0);
            }
            *remaining_compound = remaining_compound.saturating_sub(1);
        }
        GLOBALVAR_CODE_DATA => {
            if let Some(g) = current.as_mut() {
                g.data.extend(rec.values.iter().map(|&v| v as u8));
            }
            *remaining_compound = remaining_compound.saturating_sub(1);
        }
        GLOBALVAR_CODE_RELOC => {
            let target = rec.get_u32(0).unwrap_or(0);
            let addend = rec.get_i64_rotated(1).unwrap_or(0);
            if let Some(g) = current.as_mut() {
                let offset = g.data.len();
                g.relocations.push((offset, target, addend));
                g.data.resize(offset + 4, 0);
            }
            *remaining_compound = remaining_compound.saturating_sub(1);
        }
        other => return Err(BitstreamError::UnknownRecordCode { block_id: BLOCKID_GLOBALVAR, code: other }),
    }
    if *remaining_compound == 0 {
        if let Some(g) = current.take() {
            global_vars.push(g);
        }
    }
    Ok(())
}

/// What a VALUE_SYMTAB `ENTRY` record names.
pub enum SymtabTarget {
    Function(usize),
    GlobalVar(usize),
}

/// Resolve a VALUE_SYMTAB absolute value id against the module's
/// functions-then-globals numbering.
pub fn resolve_symtab_target(num_functions: usize, value_id: u32) -> SymtabTarget {
    let value_id = value_id as usize;
    if value_id < num_functions {
        SymtabTarget::Function(value_id)
    } else {
        SymtabTarget::GlobalVar(value_id - num_functions)
    }
}

pub fn decode_symtab_name(rec: &Record, skip: usize) -> String {
    rec.values[skip..].iter().map(|&c| c as u8 as char).collect()
}

/// Interpret one CONSTANTS-block record for `function`, threading the
/// "current constant type" set by `SETTYPE`.
pub fn handle_constants_record(
    function: &mut Function,
    types: &[Type],
    current_type: &mut TypeId,
    rec: &Record,
) -> Result<(), BitstreamError> {
    match rec.code {
        CONSTANTS_CODE_SETTYPE => {
            *current_type = TypeId::new(rec.get_u32(0).ok_or(BitstreamError::MissingOperand { code: rec.code, index: 0 })?);
        }
        CONSTANTS_CODE_UNDEF => {
            function.constants.push(Constant { ty: *current_type, value: RuntimeValue::ZERO });
        }
        CONSTANTS_CODE_INTEGER => {
            let raw = rec.get(0).ok_or(BitstreamError::MissingOperand { code: rec.code, index: 0 })?;
            let signed = decode_sign_rotated(raw);
            let basic = types.get(current_type.index()).and_then(Type::basic_type).unwrap_or(BasicType::I32);
            let value = match basic {
                BasicType::I1 | BasicType::I8 => RuntimeValue::from_i8(signed as i8),
                BasicType::I16 => RuntimeValue::from_i16(signed as i16),
                BasicType::I32 => RuntimeValue::from_i32(signed as i32),
                _ => RuntimeValue::from_i64(signed),
            };
            function.constants.push(Constant { ty: *current_type, value });
        }
        CONSTANTS_CODE_FLOAT => {
            let raw = rec.get(0).ok_or(BitstreamError::MissingOperand { code: rec.code, index: 0 })?;
            let basic = types.get(current_type.index()).and_then(Type::basic_type).unwrap_or(BasicType::F64);
            let value = if basic == BasicType::F32 {
                RuntimeValue::from_f32(f32::from_bits(raw as u32))
            } else {
                RuntimeValue::from_f64(f64::from_bits(raw))
            };
            function.constants.push(Constant { ty: *current_type, value });
        }
        other => return Err(BitstreamError::UnknownRecordCode { block_id: BLOCKID_CONSTANTS, code: other }),
    }
    Ok(())
}

/// Well-known intrinsic symbol names (sans the PNaCl type-mangling suffix),
/// matched by prefix.
fn intrinsic_by_name(name: &str) -> Option<IntrinsicName> {
    let base = name.split('.').take(2).collect::<Vec<_>>().join(".");
    Some(match base.as_str() {
        "llvm.memcpy" => IntrinsicName::Memcpy,
        "llvm.memmove" => IntrinsicName::Memmove,
        "llvm.memset" => IntrinsicName::Memset,
        "llvm.bswap" => IntrinsicName::Bswap,
        "llvm.ctlz" => IntrinsicName::Ctlz,
        "llvm.cttz" => IntrinsicName::Cttz,
        "llvm.fabs" => IntrinsicName::Fabs,
        "llvm.sqrt" => IntrinsicName::Sqrt,
        "llvm.trap" => IntrinsicName::Trap,
        "llvm.stacksave" => IntrinsicName::StackSave,
        "llvm.stackrestore" => IntrinsicName::StackRestore,
        "llvm.nacl" if name.contains("setjmp") => IntrinsicName::SetJmp,
        "llvm.nacl" if name.contains("longjmp") => IntrinsicName::LongJmp,
        "llvm.nacl" if name.contains("read.tp") => IntrinsicName::NaclReadTp,
        "llvm.nacl" if name.contains("atomic.load") => IntrinsicName::AtomicLoad,
        "llvm.nacl" if name.contains("atomic.store") => IntrinsicName::AtomicStore,
        "llvm.nacl" if name.contains("atomic.rmw") => IntrinsicName::AtomicRmw,
        "llvm.nacl" if name.contains("atomic.cmpxchg") => IntrinsicName::AtomicCmpXchg,
        "llvm.nacl" if name.contains("atomic.fence") => IntrinsicName::AtomicFence,
        _ => return None,
    })
}

/// Interpret one FUNCTION-block instruction record, given the number of
/// values already in scope (args + constants + prior instruction results)
/// so relative operand ids can be resolved. `symbol_names` resolves a
/// direct callee to a declared function's symbol, for intrinsic matching.
#[allow(clippy::too_many_arguments)]
pub fn handle_function_record(
    block: &mut BasicBlock,
    value_count: u32,
    num_functions: usize,
    bb_ids: &[BasicBlockId],
    callee_names: impl Fn(u32) -> Option<String>,
    rec: &Record,
) -> Result<Instruction, BitstreamError> {
    let rel = |i: usize| -> pexe_types::ValueId {
        relative_to_value_id(value_count, rec.get_u32(i).unwrap_or(0))
    };
    let bb = |i: usize| -> BasicBlockId {
        bb_ids.get(rec.get_u32(i).unwrap_or(0) as usize).copied().unwrap_or(BasicBlockId::INVALID)
    };

    let inst = match rec.code {
        FUNCTION_CODE_INST_BINOP => Instruction::Binop {
            opcode: rec.get_u32(2).unwrap_or(0),
            ty: TypeId::INVALID,
            lhs: rel(0),
            rhs: rel(1),
        },
        FUNCTION_CODE_INST_CAST => Instruction::Cast {
            opcode: rec.get_u32(2).unwrap_or(0),
            from: TypeId::INVALID,
            to: TypeId::new(rec.get_u32(1).unwrap_or(0)),
            src: rel(0),
        },
        FUNCTION_CODE_INST_CMP2 => Instruction::Cmp2 {
            predicate: rec.get_u32(2).unwrap_or(0),
            ty: TypeId::INVALID,
            lhs: rel(0),
            rhs: rel(1),
        },
        FUNCTION_CODE_INST_VSELECT => Instruction::VSelect {
            ty: TypeId::INVALID,
            cond: rel(2),
            if_true: rel(0),
            if_false: rel(1),
        },
        FUNCTION_CODE_INST_ALLOCA => Instruction::Alloca {
            size: rel(0),
            align: 1u32 << rec.get_u32(1).unwrap_or(0).saturating_sub(1).min(30),
        },
        FUNCTION_CODE_INST_LOAD => Instruction::Load { ty: TypeId::new(rec.get_u32(2).unwrap_or(0)), addr: rel(0) },
        FUNCTION_CODE_INST_STORE => Instruction::Store { ty: TypeId::INVALID, addr: rel(0), value: rel(1) },
        FUNCTION_CODE_INST_RET => {
            if rec.values.is_empty() {
                Instruction::Ret { value: None }
            } else {
                Instruction::Ret { value: Some(rel(0)) }
            }
        }
        FUNCTION_CODE_INST_BR => {
            if rec.values.len() == 1 {
                Instruction::Br { target: bb(0) }
            } else {
                Instruction::BrCond { cond: rel(2), if_true: bb(0), if_false: bb(1) }
            }
        }
        FUNCTION_CODE_INST_SWITCH => {
            let value = rel(1);
            let default = bb(2);
            let mut cases = Vec::new();
            let mut i = 3;
            while i + 1 < rec.values.len() {
                let case_value = rec.get_i64_rotated(i).unwrap_or(0);
                let target = bb(i + 1);
                cases.push((case_value, target));
                i += 2;
            }
            Instruction::Switch { ty: TypeId::INVALID, value, default, cases }
        }
        FUNCTION_CODE_INST_UNREACHABLE => Instruction::Unreachable,
        FUNCTION_CODE_INST_PHI => {
            let ty = TypeId::new(rec.get_u32(0).unwrap_or(0));
            let mut incoming = Vec::new();
            let mut i = 1;
            while i + 1 < rec.values.len() {
                let raw = rec.get(i).unwrap_or(0);
                let signed = decode_sign_rotated(raw) as i64;
                let value = pexe_types::ValueId::new((value_count as i64 - signed) as u32);
                let block_id = bb(i + 1);
                incoming.push((value, block_id));
                i += 2;
            }
            Instruction::Phi { ty, incoming }
        }
        FUNCTION_CODE_INST_CALL | FUNCTION_CODE_INST_CALL_INDIRECT => {
            let callee = rel(2);
            let args: Vec<_> = (3..rec.values.len()).map(rel).collect();
            let direct = (callee.index() < num_functions).then(|| FunctionId::new(callee.index() as u32));
            let symbol = callee_names(callee.index() as u32);
            if let Some(name) = symbol.as_deref().and_then(intrinsic_by_name) {
                Instruction::Intrinsic { name, return_ty: TypeId::INVALID, args }
            } else {
                Instruction::Call { callee, direct, is_tail: false, return_ty: TypeId::INVALID, args }
            }
        }
        other => return Err(BitstreamError::UnknownRecordCode { block_id: BLOCKID_FUNCTION, code: other }),
    };
    Ok(inst)
}

/// Interpret a `BLOCKINFO_CODE_SETBID` record, returning the new target
/// block id for subsequent `DEFINE_ABBREV`s.
pub fn handle_blockinfo_setbid(rec: &Record) -> Result<u32, BitstreamError> {
    if rec.code != BLOCKINFO_CODE_SETBID {
        return Err(BitstreamError::UnknownRecordCode { block_id: BLOCKID_BLOCKINFO, code: rec.code });
    }
    rec.get_u32(0).ok_or(BitstreamError::MissingOperand { code: rec.code, index: 0 })
}

pub const fn is_bbentry(code: u32) -> bool {
    code == VALUESYMTAB_CODE_BBENTRY
}

pub const fn is_symtab_entry(code: u32) -> bool {
    code == VALUESYMTAB_CODE_ENTRY
}

pub const fn is_declareblocks(code: u32) -> bool {
    code == FUNCTION_CODE_DECLAREBLOCKS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_block_builds_expected_types() {
        let mut types = Vec::new();
        handle_type_record(&mut types, &Record { code: TYPE_CODE_VOID, values: vec![], blob: None }).unwrap();
        handle_type_record(&mut types, &Record { code: TYPE_CODE_INTEGER, values: vec![32], blob: None }).unwrap();
        assert_eq!(types[0], Type::Void);
        assert_eq!(types[1], Type::Integer(32));
        assert_eq!(types[1].basic_type(), Some(BasicType::I32));
    }

    #[test]
    fn globalvar_zerofill_then_finalizes() {
        let mut globals = Vec::new();
        let mut current = None;
        let mut remaining = 0;
        handle_globalvar_record(
            &mut globals,
            &mut current,
            &mut remaining,
            &Record { code: GLOBALVAR_CODE_VAR, values: vec![2, 0], blob: None },
        )
        .unwrap();
        handle_globalvar_record(
            &mut globals,
            &mut current,
            &mut remaining,
            &Record { code: GLOBALVAR_CODE_ZEROFILL, values: vec![8], blob: None },
        )
        .unwrap();
        assert_eq!(globals.len(), 1);
        assert_eq!(globals[0].data.len(), 8);
        assert_eq!(globals[0].alignment, 2);
    }

    #[test]
    fn relative_operand_resolves_backward() {
        let id = relative_to_value_id(10, 3);
        assert_eq!(id.index(), 7);
    }

    #[test]
    fn intrinsic_recognized_by_mangled_prefix() {
        assert_eq!(intrinsic_by_name("llvm.memcpy.p0i8.p0i8.i32"), Some(IntrinsicName::Memcpy));
        assert_eq!(intrinsic_by_name("llvm.nacl.atomic.rmw.i32"), Some(IntrinsicName::AtomicRmw));
        assert_eq!(intrinsic_by_name("my_function"), None);
    }
}
