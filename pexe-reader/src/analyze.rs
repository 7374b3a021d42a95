//! The function analyzer: turns a raw, just-parsed [`Function`] into the
//! inputs the interpreter actually runs — every value's [`BasicType`], the
//! deduplicated φ-assigns on each control edge, each block's predecessor
//! set, and finally the lowered [`pexe_asm`] runtime instruction stream.
//!
//! The passes run in the order the design lays them out: result-type
//! inference first (every later pass needs to know operand types), then
//! use-sets, then phi-assigns, then predecessors, then opcode
//! specialization/lowering.

use std::collections::HashMap;

use pexe_asm::{
    AtomicRmwOp, BinOp, CastOp, CmpOp, Encoder, Intrinsic, PhiAssign as AsmPhiAssign, RuntimeOp,
};
use pexe_types::{BasicBlockId, BasicType, FunctionId, ValueId};

use crate::error::AnalyzeError;
use crate::ir::{Function, Instruction, IntrinsicName, Module, Type};

/// Everything the interpreter needs to run one function: its value types,
/// per-block predecessor sets, and the lowered runtime stream with
/// resolved branch targets.
#[derive(Debug, Clone)]
pub struct AnalyzedFunction {
    pub value_types: Vec<BasicType>,
    pub predecessors: Vec<Vec<BasicBlockId>>,
    pub code: Vec<RuntimeOp>,
    pub block_offsets: Vec<u32>,
}

/// Run every analyzer pass over `function` and lower it to a runtime
/// stream. `dedupe_phi` controls whether repeated identical incoming
/// writes to the same phi fold into one assign (spec §4.4 step 3,
/// default on).
#[tracing::instrument(skip(module, function), fields(name = %function.name))]
pub fn analyze_function(module: &Module, function: &Function, dedupe_phi: bool) -> Result<AnalyzedFunction, AnalyzeError> {
    let bb_ids: Vec<BasicBlockId> = (0..function.blocks.len() as u32).map(BasicBlockId::new).collect();
    let value_types = infer_result_types(module, function)?;
    let predecessors = compute_predecessors(function, &bb_ids)?;
    let phi_assigns = compute_phi_assigns(function, &bb_ids, &predecessors, dedupe_phi)?;
    let (code, block_offsets) = lower_function(function, &bb_ids, &value_types, &phi_assigns)?;
    Ok(AnalyzedFunction { value_types, predecessors, code, block_offsets })
}

fn arg_count(module: &Module, function: &Function) -> u32 {
    match module.types.get(function.type_id.index()) {
        Some(Type::Function { params, .. }) => params.len() as u32,
        _ => 0,
    }
}

/// Result-type inference: a forward worklist over every instruction.
/// Each basic-type-carrying instruction either names its type directly
/// (load/cast/phi/alloca's implicit `i32`) or derives it from an operand
/// already resolved earlier in value-id order — PNaCl's value numbering
/// guarantees a definition's id is always lower than any of its uses'
/// (spec's "Invariant — monotonic ids"), so one forward pass always
/// terminates; we still loop defensively in case a call's return type
/// depends on a forward-declared callee.
fn infer_result_types(module: &Module, function: &Function) -> Result<Vec<BasicType>, AnalyzeError> {
    let num_args = arg_count(module, function);
    let num_constants = function.constants.len() as u32;
    let total_values = num_args + num_constants + count_value_producing(function);
    let mut types = vec![None; total_values as usize];

    let arg_type = module
        .types
        .get(function.type_id.index())
        .and_then(|t| if let Type::Function { params, .. } = t { params.first() } else { None })
        .and_then(|&t| module.types.get(t.index()))
        .and_then(Type::basic_type)
        .unwrap_or(BasicType::I32);
    for slot in types.iter_mut().take(num_args as usize) {
        *slot = Some(arg_type);
    }
    for (i, c) in function.constants.iter().enumerate() {
        let idx = num_args as usize + i;
        types[idx] = Some(
            module
                .types
                .get(c.ty.index())
                .and_then(Type::basic_type)
                .unwrap_or(BasicType::I32),
        );
    }

    let lookup = |types: &[Option<BasicType>], id: ValueId| -> Option<BasicType> {
        types.get(id.index()).copied().flatten()
    };

    let mut next_value = num_args + num_constants;
    let mut progressed = true;
    let mut unresolved = 0usize;
    while progressed {
        progressed = false;
        unresolved = 0;
        next_value = num_args + num_constants;
        for block in &function.blocks {
            for inst in &block.instructions {
                let produces_value = instruction_produces_value(inst);
                if !produces_value {
                    continue;
                }
                let slot = next_value as usize;
                next_value += 1;
                if types[slot].is_some() {
                    continue;
                }
                let inferred = match inst {
                    Instruction::Binop { lhs, .. } => lookup(&types, *lhs),
                    Instruction::Cast { to, .. } => {
                        module.types.get(to.index()).and_then(Type::basic_type)
                    }
                    Instruction::Cmp2 { .. } => Some(BasicType::I1),
                    Instruction::VSelect { if_true, .. } => lookup(&types, *if_true),
                    Instruction::Alloca { .. } => Some(BasicType::I32),
                    Instruction::Load { ty, .. } => module.types.get(ty.index()).and_then(Type::basic_type),
                    Instruction::Phi { ty, .. } => module.types.get(ty.index()).and_then(Type::basic_type),
                    Instruction::Call { .. } | Instruction::Intrinsic { .. } => Some(BasicType::I32),
                    _ => None,
                };
                if let Some(ty) = inferred {
                    types[slot] = Some(ty);
                    progressed = true;
                } else {
                    unresolved += 1;
                }
            }
        }
    }

    if unresolved > 0 {
        return Err(AnalyzeError::UninferredType {
            value: ValueId::new(next_value),
            block: BasicBlockId::new(0),
        });
    }

    Ok(types.into_iter().map(|t| t.unwrap_or(BasicType::I32)).collect())
}

fn instruction_produces_value(inst: &Instruction) -> bool {
    !matches!(
        inst,
        Instruction::Store { .. }
            | Instruction::Ret { .. }
            | Instruction::Br { .. }
            | Instruction::BrCond { .. }
            | Instruction::Switch { .. }
            | Instruction::Unreachable
    )
}

fn count_value_producing(function: &Function) -> u32 {
    function
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| instruction_produces_value(i))
        .count() as u32
}

/// Predecessor sets, derived by scanning every terminator's successor list.
fn compute_predecessors(
    function: &Function,
    bb_ids: &[BasicBlockId],
) -> Result<Vec<Vec<BasicBlockId>>, AnalyzeError> {
    let mut preds = vec![Vec::new(); bb_ids.len()];
    for (i, block) in function.blocks.iter().enumerate() {
        let this_id = bb_ids[i];
        let Some(term) = block.instructions.last() else {
            continue;
        };
        let mut add = |target: BasicBlockId| {
            if target.index() < preds.len() && !preds[target.index()].contains(&this_id) {
                preds[target.index()].push(this_id);
            }
        };
        match term {
            Instruction::Br { target } => add(*target),
            Instruction::BrCond { if_true, if_false, .. } => {
                add(*if_true);
                add(*if_false);
            }
            Instruction::Switch { default, cases, .. } => {
                add(*default);
                for (_, target) in cases {
                    add(*target);
                }
            }
            _ => {}
        }
    }
    Ok(preds)
}

/// Compute, per predecessor→successor edge, the φ writes that predecessor
/// must perform. When `dedupe_phi` is set, repeated *identical*
/// `(from_block, dest, source)` triples the way `dedupe_incoming`
/// switch/phi patterns produce (spec's worked example) fold into a single
/// assign; two incoming entries that name the same predecessor with
/// different sources are always a conflict, dedup or not (spec §4.4 step
/// 3: "conflicting pairs... are a fatal error").
fn compute_phi_assigns(
    function: &Function,
    bb_ids: &[BasicBlockId],
    predecessors: &[Vec<BasicBlockId>],
    dedupe_phi: bool,
) -> Result<HashMap<(BasicBlockId, BasicBlockId), Vec<AsmPhiAssign>>, AnalyzeError> {
    let mut edges: HashMap<(BasicBlockId, BasicBlockId), Vec<AsmPhiAssign>> = HashMap::new();
    // (from_block, to_block, dest) -> the source already recorded for that
    // edge, so a second, differing source for the same predecessor is
    // caught rather than silently dropped.
    let mut recorded: HashMap<(BasicBlockId, BasicBlockId, ValueId), ValueId> = HashMap::new();

    // Values produced per block, to assign a dest ValueId to each phi.
    // args+constants already consumed ids [0, start).
    let mut next_value = function.num_args + function.constants.len() as u32;

    for (bi, block) in function.blocks.iter().enumerate() {
        let this_id = bb_ids[bi];
        for inst in &block.instructions {
            let produces = instruction_produces_value(inst);
            let dest = if produces {
                let id = ValueId::new(next_value);
                next_value += 1;
                Some(id)
            } else {
                None
            };
            if let (Instruction::Phi { incoming, .. }, Some(dest)) = (inst, dest) {
                for (source, from_block) in incoming {
                    if !predecessors[this_id.index()].contains(from_block) {
                        return Err(AnalyzeError::PhiPredecessorMismatch { block: this_id, pred: *from_block });
                    }
                    let key = (*from_block, this_id, dest);
                    match recorded.get(&key) {
                        Some(prev) if *prev != *source => {
                            return Err(AnalyzeError::ConflictingPhiIncoming { block: this_id, pred: *from_block, dest });
                        }
                        Some(_) if dedupe_phi => continue,
                        _ => {
                            recorded.insert(key, *source);
                            edges.entry((*from_block, this_id)).or_default().push(AsmPhiAssign {
                                dest,
                                source: *source,
                            });
                        }
                    }
                }
            }
        }
    }
    Ok(edges)
}

fn basic_op_from_binop_code(code: u32, ty: BasicType) -> BinOp {
    // PNaCl's PN_BINOP_* ordering: add, sub, mul, udiv, sdiv, urem, srem,
    // shl, lshr, ashr, and, or, xor (float ops reuse add/sub/mul/div).
    match (code, ty.is_float()) {
        (0, _) => BinOp::Add,
        (1, _) => BinOp::Sub,
        (2, _) => BinOp::Mul,
        (3, _) => BinOp::UDiv,
        (4, _) => BinOp::SDiv,
        (5, _) => BinOp::URem,
        (6, _) => BinOp::SRem,
        (7, _) => BinOp::Shl,
        (8, _) => BinOp::LShr,
        (9, _) => BinOp::AShr,
        (10, _) => BinOp::And,
        (11, _) => BinOp::Or,
        (12, _) => BinOp::Xor,
        _ => BinOp::Add,
    }
}

fn cast_op_from_code(code: u32, from: BasicType, to: BasicType) -> CastOp {
    match code {
        0 => CastOp::Trunc,
        1 => CastOp::ZExt,
        2 => CastOp::SExt,
        3 => CastOp::IntToFloat { signed: true },
        4 => CastOp::IntToFloat { signed: false },
        5 => CastOp::FloatToInt { signed: true },
        6 => CastOp::FloatToInt { signed: false },
        7 if from.is_float() && to.is_float() => CastOp::FloatCast,
        _ => CastOp::Bitcast,
    }
}

fn cmp_op_from_predicate(code: u32) -> CmpOp {
    match code {
        32 => CmpOp::OEq,
        33 => CmpOp::OLt,
        34 => CmpOp::OLe,
        38 => CmpOp::Eq,
        39 => CmpOp::Ne,
        40 => CmpOp::ULt,
        41 => CmpOp::ULe,
        42 => CmpOp::SLt,
        43 => CmpOp::SLe,
        _ => CmpOp::Eq,
    }
}

fn intrinsic_kind(name: IntrinsicName) -> Intrinsic {
    match name {
        IntrinsicName::Memcpy => Intrinsic::Memcpy,
        IntrinsicName::Memmove => Intrinsic::Memmove,
        IntrinsicName::Memset => Intrinsic::Memset,
        IntrinsicName::Bswap => Intrinsic::Bswap,
        IntrinsicName::Ctlz => Intrinsic::Ctlz,
        IntrinsicName::Cttz => Intrinsic::Cttz,
        IntrinsicName::Fabs => Intrinsic::Fabs,
        IntrinsicName::Sqrt => Intrinsic::Sqrt,
        IntrinsicName::Trap => Intrinsic::Trap,
        IntrinsicName::StackSave => Intrinsic::StackSave,
        IntrinsicName::StackRestore => Intrinsic::StackRestore,
        IntrinsicName::SetJmp => Intrinsic::SetJmp,
        IntrinsicName::LongJmp => Intrinsic::LongJmp,
        IntrinsicName::NaclReadTp => Intrinsic::NaclReadTp,
        IntrinsicName::AtomicLoad => Intrinsic::AtomicLoad,
        IntrinsicName::AtomicStore => Intrinsic::AtomicStore,
        IntrinsicName::AtomicFence => Intrinsic::AtomicFence,
        IntrinsicName::AtomicCmpXchg => Intrinsic::AtomicCmpXchg,
        IntrinsicName::AtomicRmw => Intrinsic::AtomicRmw { op: AtomicRmwOp::Add },
    }
}

/// Two-pass lowering: compute every block's stream offset, then re-emit
/// with branch targets resolved (spec §4.4 step 6).
fn lower_function(
    function: &Function,
    bb_ids: &[BasicBlockId],
    value_types: &[BasicType],
    phi_assigns: &HashMap<(BasicBlockId, BasicBlockId), Vec<AsmPhiAssign>>,
) -> Result<(Vec<RuntimeOp>, Vec<u32>), AnalyzeError> {
    let offsets = compute_block_offsets(function, bb_ids)?;

    let mut enc = Encoder::new();
    let mut next_value = function.num_args + function.constants.len() as u32;

    for (bi, block) in function.blocks.iter().enumerate() {
        let this_id = bb_ids[bi];
        let recorded = enc.begin_block(this_id);
        debug_assert_eq!(recorded, offsets[bi]);

        for inst in &block.instructions {
            let dest_id = if instruction_produces_value(inst) {
                let id = ValueId::new(next_value);
                next_value += 1;
                Some(id)
            } else {
                None
            };
            let ty_of = |id: ValueId| value_types.get(id.index()).copied().unwrap_or(BasicType::I32);

            let op = match inst {
                Instruction::Binop { opcode, lhs, rhs, .. } => {
                    let ty = ty_of(*lhs);
                    RuntimeOp::Binop { op: basic_op_from_binop_code(*opcode, ty), ty, dest: dest_id.unwrap(), lhs: *lhs, rhs: *rhs }
                }
                Instruction::Cast { opcode, src, .. } => {
                    let from = ty_of(*src);
                    let to = value_types[dest_id.unwrap().index()];
                    RuntimeOp::Cast { op: cast_op_from_code(*opcode, from, to), from, to, dest: dest_id.unwrap(), src: *src }
                }
                Instruction::Cmp2 { predicate, lhs, rhs, .. } => RuntimeOp::Cmp2 {
                    op: cmp_op_from_predicate(*predicate),
                    ty: ty_of(*lhs),
                    dest: dest_id.unwrap(),
                    lhs: *lhs,
                    rhs: *rhs,
                },
                Instruction::VSelect { cond, if_true, if_false, .. } => RuntimeOp::Select {
                    ty: ty_of(*if_true),
                    dest: dest_id.unwrap(),
                    cond: *cond,
                    if_true: *if_true,
                    if_false: *if_false,
                },
                Instruction::Alloca { size, align } => {
                    RuntimeOp::Alloca { dest: dest_id.unwrap(), size: *size, align: *align }
                }
                Instruction::Load { addr, .. } => {
                    RuntimeOp::Load { ty: value_types[dest_id.unwrap().index()], dest: dest_id.unwrap(), addr: *addr }
                }
                Instruction::Store { addr, value, .. } => {
                    RuntimeOp::Store { ty: ty_of(*value), addr: *addr, value: *value }
                }
                Instruction::Ret { value } => match value {
                    Some(v) => RuntimeOp::RetValue { ty: ty_of(*v), value: *v },
                    None => RuntimeOp::RetVoid,
                },
                Instruction::Br { target } => RuntimeOp::Br {
                    target: offsets[target.index()],
                    phi: phi_assigns.get(&(this_id, *target)).cloned().unwrap_or_default(),
                },
                Instruction::BrCond { cond, if_true, if_false } => RuntimeOp::BrInt1 {
                    cond: *cond,
                    if_true: offsets[if_true.index()],
                    phi_true: phi_assigns.get(&(this_id, *if_true)).cloned().unwrap_or_default(),
                    if_false: offsets[if_false.index()],
                    phi_false: phi_assigns.get(&(this_id, *if_false)).cloned().unwrap_or_default(),
                },
                Instruction::Switch { value, default, cases, .. } => RuntimeOp::Switch {
                    ty: ty_of(*value),
                    value: *value,
                    default_target: offsets[default.index()],
                    default_phi: phi_assigns.get(&(this_id, *default)).cloned().unwrap_or_default(),
                    cases: cases
                        .iter()
                        .map(|(cv, target)| {
                            (
                                *cv,
                                offsets[target.index()],
                                phi_assigns.get(&(this_id, *target)).cloned().unwrap_or_default(),
                            )
                        })
                        .collect(),
                },
                Instruction::Unreachable => RuntimeOp::Unreachable,
                Instruction::Phi { .. } => continue, // consumed into predecessor phi-assigns
                Instruction::Call { callee, direct, args, .. } => match direct {
                    Some(function_id) => RuntimeOp::Call {
                        dest: dest_id,
                        ret_ty: dest_id.map(ty_of).unwrap_or(BasicType::Void),
                        callee: *function_id,
                        args: args.clone(),
                    },
                    None => RuntimeOp::CallIndirect {
                        dest: dest_id,
                        ret_ty: dest_id.map(ty_of).unwrap_or(BasicType::Void),
                        callee: *callee,
                        args: args.clone(),
                    },
                },
                Instruction::Intrinsic { name, args, .. } => RuntimeOp::Intrinsic {
                    kind: intrinsic_kind(*name),
                    dest: dest_id,
                    ty: dest_id.map(ty_of).unwrap_or(BasicType::Void),
                    args: args.clone(),
                },
            };
            enc.push(op);
        }
    }

    Ok((enc.finish(), offsets))
}

/// First pass: compute each block's 4-byte aligned offset without emitting
/// instructions, by counting words the same way the real encode pass will.
fn compute_block_offsets(function: &Function, bb_ids: &[BasicBlockId]) -> Result<Vec<u32>, AnalyzeError> {
    let mut enc = Encoder::new();
    for (bi, block) in function.blocks.iter().enumerate() {
        enc.begin_block(bb_ids[bi]);
        for inst in &block.instructions {
            if matches!(inst, Instruction::Phi { .. }) {
                continue;
            }
            enc.push(RuntimeOp::Unreachable);
        }
    }
    let mut offsets = Vec::with_capacity(bb_ids.len());
    for &id in bb_ids {
        offsets.push(enc.block_offset(id).map_err(AnalyzeError::Stream)?);
    }
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, Constant};
    use pexe_types::{RuntimeValue, TypeId};

    fn i32_function_type(module: &mut Module) -> pexe_types::TypeId {
        module.types.push(Type::Integer(32));
        let i32_id = TypeId::new((module.types.len() - 1) as u32);
        module.types.push(Type::Function { return_type: i32_id, is_varargs: false, params: vec![i32_id] });
        TypeId::new((module.types.len() - 1) as u32)
    }

    #[test]
    fn analyzes_return_constant_plus_arg() {
        let mut module = Module::default();
        let fn_type = i32_function_type(&mut module);

        let mut function = Function {
            type_id: fn_type,
            num_args: 1,
            constants: vec![Constant { ty: TypeId::new(0), value: RuntimeValue::from_i32(41) }],
            ..Function::default()
        };
        // arg id = 0, constant id = 1, instruction result id = 2
        function.blocks.push(BasicBlock {
            instructions: vec![
                Instruction::Binop { opcode: 0, ty: TypeId::INVALID, lhs: ValueId::new(0), rhs: ValueId::new(1) },
                Instruction::Ret { value: Some(ValueId::new(2)) },
            ],
        });
        module.functions.push(function);

        let analyzed = analyze_function(&module, &module.functions[0], true).unwrap();
        assert_eq!(analyzed.value_types[2], BasicType::I32);
        assert_eq!(analyzed.code.len(), 2);
        assert!(matches!(analyzed.code[1], RuntimeOp::RetValue { .. }));
    }

    #[test]
    fn phi_assigns_deduped_across_switch_cases() {
        let mut module = Module::default();
        let fn_type = i32_function_type(&mut module);
        let mut function = Function { type_id: fn_type, num_args: 1, ..Function::default() };

        // block0: switch arg -> {0: block1, 1: block1, default: block1}
        // block1: phi [arg, block0] ; ret phi
        function.blocks.push(BasicBlock {
            instructions: vec![Instruction::Switch {
                ty: TypeId::new(0),
                value: ValueId::new(0),
                default: BasicBlockId::new(1),
                cases: vec![(0, BasicBlockId::new(1)), (1, BasicBlockId::new(1))],
            }],
        });
        function.blocks.push(BasicBlock {
            instructions: vec![
                Instruction::Phi { ty: TypeId::new(0), incoming: vec![(ValueId::new(0), BasicBlockId::new(0))] },
                Instruction::Ret { value: Some(ValueId::new(1)) },
            ],
        });
        module.functions.push(function);

        let analyzed = analyze_function(&module, &module.functions[0], true).unwrap();
        let RuntimeOp::Switch { default_phi, cases, .. } = &analyzed.code[0] else {
            panic!("expected switch");
        };
        assert_eq!(default_phi.len(), 1);
        assert_eq!(cases[0].2.len(), 1);
        assert_eq!(cases[1].2.len(), 1);
    }
}
