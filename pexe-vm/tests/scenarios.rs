//! End-to-end interpreter scenarios: one hand-built module per test,
//! exercising the dispatch loop, the IRT built-ins, and the scheduler
//! together rather than any one piece in isolation.

use pexe_asm::{AtomicRmwOp, Intrinsic, RuntimeOp};
use pexe_reader::{AnalyzedFunction, Constant, Function, Module};
use pexe_types::{BasicBlockId, BasicType, BuiltinId, FunctionId, RuntimeValue, TypeId, ValueId, GUARD_SIZE};
use pexe_vm::{Config, Executor};

fn module_with(functions: Vec<(Function, AnalyzedFunction)>) -> (Module, Vec<AnalyzedFunction>) {
    let mut module = Module::default();
    let mut analyzed = Vec::new();
    for (f, a) in functions {
        module.functions.push(f);
        analyzed.push(a);
    }
    (module, analyzed)
}

fn analyzed(num_values: usize, code: Vec<RuntimeOp>) -> AnalyzedFunction {
    AnalyzedFunction {
        value_types: vec![BasicType::I32; num_values],
        predecessors: vec![Vec::new()],
        code,
        block_offsets: vec![0],
    }
}

fn const_value(v: i64) -> Constant {
    Constant { ty: TypeId::new(0), value: RuntimeValue::from_i64(v) }
}

#[test]
fn write_builtin_call_is_captured_as_program_output() {
    // v0 = fd, v1 = buf, v2 = count, v3 = nwrite_out, v4 = exit code.
    let code = vec![
        RuntimeOp::CallBuiltin {
            dest: None,
            ret_ty: BasicType::Void,
            builtin: BuiltinId::new(10), // nacl-irt-fdio-0.1: write
            args: vec![ValueId::new(0), ValueId::new(1), ValueId::new(2), ValueId::new(3)],
        },
        RuntimeOp::RetValue { ty: BasicType::I32, value: ValueId::new(4) },
    ];
    let function = Function { num_args: 0, ..Default::default() };
    let (module, functions) = module_with(vec![(function, analyzed(5, code))]);

    let mut config = Config::default();
    config.memory_size = 64 * 1024;
    let mut exec = Executor::new(module, functions, config);
    exec.spawn_main(FunctionId::new(0)).unwrap();

    let buf = GUARD_SIZE;
    let nwrite_out = buf + 16;
    exec.memory_mut().write_bytes(buf, b"hi\n").unwrap();
    {
        let frame = &mut exec.scheduler_mut().thread_mut(0).current_frame;
        frame.values[0] = RuntimeValue::from_i32(1);
        frame.values[1] = RuntimeValue::from_u32(buf);
        frame.values[2] = RuntimeValue::from_i32(3);
        frame.values[3] = RuntimeValue::from_u32(nwrite_out);
        frame.values[4] = RuntimeValue::from_i32(0);
    }

    let code = exec.run().unwrap();
    assert_eq!(code, 0);
    assert_eq!(exec.stdout(), b"hi\n");
    assert_eq!(exec.memory().load(nwrite_out, 4).unwrap(), 3);
}

#[test]
fn setjmp_returns_again_with_longjmps_value_and_resumes_past_the_branch() {
    // Caller: v0 = jmpbuf addr, v1 = setjmp's own result, v2 = call's (unused) dest.
    //   [0] setjmp(v0) -> v1
    //   [1] br_i1 v1, if_true=3, if_false=2
    //   [2] call callee(v0) -> v2   (never returns: callee always longjmps)
    //   [3] ret v1
    let caller_code = vec![
        RuntimeOp::Intrinsic {
            kind: Intrinsic::SetJmp,
            dest: Some(ValueId::new(1)),
            ty: BasicType::I32,
            args: vec![ValueId::new(0)],
        },
        RuntimeOp::BrInt1 { cond: ValueId::new(1), if_true: 3, phi_true: vec![], if_false: 2, phi_false: vec![] },
        RuntimeOp::Call {
            dest: Some(ValueId::new(2)),
            ret_ty: BasicType::I32,
            callee: FunctionId::new(1),
            args: vec![ValueId::new(0)],
        },
        RuntimeOp::RetValue { ty: BasicType::I32, value: ValueId::new(1) },
    ];
    let caller = Function { num_args: 0, ..Default::default() };

    // Callee: v0 = jmpbuf addr (arg), v1 = 99 (constant). longjmp(v0, v1).
    let callee_code = vec![RuntimeOp::Intrinsic {
        kind: Intrinsic::LongJmp,
        dest: None,
        ty: BasicType::I32,
        args: vec![ValueId::new(0), ValueId::new(1)],
    }];
    let callee = Function { num_args: 1, constants: vec![const_value(99)], ..Default::default() };

    let (module, functions) = module_with(vec![(caller, analyzed(3, caller_code)), (callee, analyzed(2, callee_code))]);

    let mut config = Config::default();
    config.memory_size = 64 * 1024;
    let mut exec = Executor::new(module, functions, config);
    exec.spawn_main(FunctionId::new(0)).unwrap();
    let buf = GUARD_SIZE;
    exec.scheduler_mut().thread_mut(0).current_frame.values[0] = RuntimeValue::from_u32(buf);

    let code = exec.run().unwrap();
    assert_eq!(code, 99);
}

#[test]
fn two_threads_synchronize_through_futex_wait_and_wake() {
    let flag = GUARD_SIZE;

    // Main: wait while *flag == 0, then read it back as the exit code.
    // v0 = flag addr, v1 = expected (0), v2 = abstime (0), v3 = loaded value.
    let main_code = vec![
        RuntimeOp::CallBuiltin {
            dest: None,
            ret_ty: BasicType::Void,
            builtin: BuiltinId::new(38), // nacl-irt-futex-0.1: wait_abs
            args: vec![ValueId::new(0), ValueId::new(1), ValueId::new(2)],
        },
        RuntimeOp::Load { ty: BasicType::I32, dest: ValueId::new(3), addr: ValueId::new(0) },
        RuntimeOp::RetValue { ty: BasicType::I32, value: ValueId::new(3) },
    ];
    let main_fn = Function { num_args: 0, constants: vec![const_value(flag as i64), const_value(0), const_value(0)], ..Default::default() };

    // Worker: store 1 into *flag, then wake the waiter.
    // v0 = flag addr, v1 = 1 (value to store and the wake count), v2 = count_out addr.
    let worker_code = vec![
        RuntimeOp::Store { ty: BasicType::I32, addr: ValueId::new(0), value: ValueId::new(1) },
        RuntimeOp::CallBuiltin {
            dest: None,
            ret_ty: BasicType::Void,
            builtin: BuiltinId::new(39), // nacl-irt-futex-0.1: wake
            args: vec![ValueId::new(0), ValueId::new(1), ValueId::new(2)],
        },
        RuntimeOp::RetVoid,
    ];
    let worker_fn =
        Function { num_args: 0, constants: vec![const_value(flag as i64), const_value(1), const_value(flag as i64 + 4)], ..Default::default() };

    let (module, functions) = module_with(vec![(main_fn, analyzed(4, main_code)), (worker_fn, analyzed(3, worker_code))]);

    let mut config = Config::default();
    config.memory_size = 64 * 1024;
    let mut exec = Executor::new(module, functions, config);
    exec.spawn_main(FunctionId::new(0)).unwrap();
    let worker_ptr = Executor::function_pointer(FunctionId::new(1));
    exec.spawn_thread(worker_ptr, 0, 0).unwrap();

    let code = exec.run().unwrap();
    assert_eq!(code, 1);
}

#[test]
fn four_threads_atomically_accumulate_into_a_shared_sum_before_the_joiner_reads_it() {
    let sum_addr = GUARD_SIZE;
    let remaining_addr = GUARD_SIZE + 4;
    let worker_count = 4i64;
    let increments = [1000i64, 2000, 3000, 4000];

    // Joiner: reload `remaining`; if zero, read the sum and exit with it;
    // otherwise wait on it (expecting whatever was just observed) and retry.
    // v0 = remaining_addr, v1 = sum_addr, v2 = 0 (both abstime and the
    // zero-comparison rhs), v3 = loaded remaining, v4 = remaining == 0, v5 = sum.
    let joiner_code = vec![
        RuntimeOp::Load { ty: BasicType::I32, dest: ValueId::new(3), addr: ValueId::new(0) },
        RuntimeOp::Cmp2 { op: pexe_asm::CmpOp::Eq, ty: BasicType::I32, dest: ValueId::new(4), lhs: ValueId::new(3), rhs: ValueId::new(2) },
        RuntimeOp::BrInt1 { cond: ValueId::new(4), if_true: 5, phi_true: vec![], if_false: 3, phi_false: vec![] },
        RuntimeOp::CallBuiltin {
            dest: None,
            ret_ty: BasicType::Void,
            builtin: BuiltinId::new(38),
            args: vec![ValueId::new(0), ValueId::new(3), ValueId::new(2)],
        },
        RuntimeOp::Br { target: 0, phi: vec![] },
        RuntimeOp::Load { ty: BasicType::I32, dest: ValueId::new(5), addr: ValueId::new(1) },
        RuntimeOp::RetValue { ty: BasicType::I32, value: ValueId::new(5) },
    ];
    let joiner_fn = Function {
        num_args: 0,
        constants: vec![const_value(remaining_addr as i64), const_value(sum_addr as i64), const_value(0)],
        ..Default::default()
    };

    let mut functions = vec![(joiner_fn, analyzed(6, joiner_code))];
    for &increment in &increments {
        // v0 = sum_addr, v1 = this worker's increment, v2 = remaining_addr,
        // v3 = 1 (the atomic sub amount and the wake count), v4 = scratch count_out addr.
        let code = vec![
            RuntimeOp::Intrinsic {
                kind: Intrinsic::AtomicRmw { op: AtomicRmwOp::Add },
                dest: None,
                ty: BasicType::I32,
                args: vec![ValueId::new(0), ValueId::new(1)],
            },
            RuntimeOp::Intrinsic {
                kind: Intrinsic::AtomicRmw { op: AtomicRmwOp::Sub },
                dest: None,
                ty: BasicType::I32,
                args: vec![ValueId::new(2), ValueId::new(3)],
            },
            RuntimeOp::CallBuiltin {
                dest: None,
                ret_ty: BasicType::Void,
                builtin: BuiltinId::new(39),
                args: vec![ValueId::new(2), ValueId::new(3), ValueId::new(4)],
            },
            RuntimeOp::RetVoid,
        ];
        let worker_fn = Function {
            num_args: 0,
            constants: vec![
                const_value(sum_addr as i64),
                const_value(increment),
                const_value(remaining_addr as i64),
                const_value(1),
                const_value(sum_addr as i64 + 8),
            ],
            ..Default::default()
        };
        functions.push((worker_fn, analyzed(5, code)));
    }

    let (module, analyzed_functions) = module_with(functions);
    let mut config = Config::default();
    config.memory_size = 64 * 1024;
    let mut exec = Executor::new(module, analyzed_functions, config);
    exec.memory_mut().store(remaining_addr, worker_count as u64, 4).unwrap();

    exec.spawn_main(FunctionId::new(0)).unwrap();
    for i in 1..=increments.len() {
        let ptr = Executor::function_pointer(FunctionId::new(i as u32));
        exec.spawn_thread(ptr, 0, 0).unwrap();
    }

    let code = exec.run().unwrap();
    assert_eq!(code, increments.iter().sum::<i64>() as i32);
}
