//! The threaded dispatch loop (spec §4.5): fetch, decode, execute, advance.

use pexe_asm::{AtomicRmwOp, BinOp, CastOp, CmpOp, Decoder, Intrinsic, RuntimeOp};
use pexe_reader::{AnalyzedFunction, Module};
use pexe_types::{
    BasicBlockId, BasicType, BuiltinId, FunctionId, RuntimeValue, ValueId, Word, INSTRUCTIONS_QUANTUM, MAX_BUILTINS,
};

use crate::config::Config;
use crate::error::Fault;
use crate::frame::CallFrame;
use crate::irt::{self, IrtContext};
use crate::memory::Memory;
use crate::thread::{Scheduler, ThreadState};

const DEFAULT_STACK: u32 = 64 * 1024;

/// What a decoded function-pointer word names (spec §3 "Global variable":
/// `function_id = (id + N_builtins) << 2`, `builtin_id = id << 2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Function(FunctionId),
    Builtin(BuiltinId),
}

/// Owns the module, memory, and thread ring; runs the dispatch loop to
/// completion (spec §3 "Executor").
pub struct Executor {
    module: Module,
    analyzed: Vec<AnalyzedFunction>,
    memory: Memory,
    scheduler: Scheduler,
    config: Config,
    jmpbuf_counter: u32,
    exit_code: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Executor {
    pub fn new(module: Module, analyzed: Vec<AnalyzedFunction>, config: Config) -> Self {
        let (global_bytes, bases) = layout_globals(&module);
        let mut memory = Memory::new(config.memory_size, &global_bytes);
        patch_global_relocations(&mut memory, &module, &bases);
        Executor {
            module,
            analyzed,
            memory,
            scheduler: Scheduler::new(),
            config,
            jmpbuf_counter: 0,
            exit_code: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    pub fn capture_write(&mut self, fd: Word, bytes: &[u8]) {
        match fd {
            1 => self.stdout.extend_from_slice(bytes),
            2 => self.stderr.extend_from_slice(bytes),
            _ => {}
        }
    }

    pub fn request_exit(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    /// `function_pointer = (function_id + MAX_BUILTINS) << 2`.
    pub fn function_pointer(function: FunctionId) -> Word {
        ((function.index() as u32 + MAX_BUILTINS) as Word) << 2
    }

    /// `builtin_pointer = builtin_id << 2`.
    pub fn builtin_pointer(builtin: BuiltinId) -> Word {
        (builtin.index() as Word) << 2
    }

    fn decode_call_target(word: Word) -> CallTarget {
        let tag = (word >> 2) as u32;
        if tag < MAX_BUILTINS {
            CallTarget::Builtin(BuiltinId::new(tag))
        } else {
            CallTarget::Function(FunctionId::new(tag - MAX_BUILTINS))
        }
    }

    /// Spawn the main thread at `entry`, with `argv`/`env` ignored beyond
    /// being accepted (start-info block construction is a `pexe-run`
    /// concern layered on top of this executor).
    pub fn spawn_main(&mut self, entry: FunctionId) -> Result<(), Fault> {
        let stack_top = self.memory.carve_stack(DEFAULT_STACK)?;
        let num_values = self.analyzed[entry.index()].value_types.len();
        let mut frame = CallFrame::new(entry, num_values, stack_top);
        seed_constants(&mut frame, self.module.function(entry));
        self.scheduler.spawn(frame, 0);
        Ok(())
    }

    /// `thread_create`: decode `entry` as a function pointer, carve a fresh
    /// stack, and insert the new thread into the ring (spec §4.6).
    pub fn spawn_thread(&mut self, entry: Word, _caller_stack: u32, tls: u32) -> Result<usize, Fault> {
        let CallTarget::Function(function) = Self::decode_call_target(entry) else {
            return Err(Fault::BadCallTarget(ValueId::INVALID));
        };
        let stack_top = self.memory.carve_stack(DEFAULT_STACK)?;
        let num_values = self.analyzed[function.index()].value_types.len();
        let mut frame = CallFrame::new(function, num_values, stack_top);
        seed_constants(&mut frame, self.module.function(function));
        Ok(self.scheduler.spawn(frame, tls))
    }

    /// Run every thread to completion, returning the process exit code
    /// (spec §6 "Exit code").
    pub fn run(&mut self) -> Result<i32, Fault> {
        loop {
            if let Some(code) = self.exit_code {
                return Ok(code);
            }
            let Some(thread) = self.scheduler.current() else {
                if self.scheduler.all_dead() {
                    return Ok(self.exit_code.unwrap_or(0));
                }
                return Err(Fault::NoRunnableThread);
            };
            self.step(thread)?;
            self.scheduler.tick(INSTRUCTIONS_QUANTUM);
        }
    }

    fn decoder(&self, function: FunctionId) -> Decoder<'_> {
        Decoder::new(&self.analyzed[function.index()].code)
    }

    fn read(&self, frame: &CallFrame, id: ValueId) -> RuntimeValue {
        frame.values.get(id.index()).copied().unwrap_or(RuntimeValue::ZERO)
    }

    fn write(&mut self, thread: usize, id: ValueId, value: RuntimeValue) {
        let frame = &mut self.scheduler.thread_mut(thread).current_frame;
        if let Some(slot) = frame.values.get_mut(id.index()) {
            *slot = value;
        }
    }

    fn apply_phi(&mut self, thread: usize, assigns: &[pexe_asm::PhiAssign]) {
        let frame = &self.scheduler.thread(thread).current_frame;
        let staged: Vec<_> = assigns.iter().map(|a| (a.dest, self.read(frame, a.source))).collect();
        for (dest, value) in staged {
            self.write(thread, dest, value);
        }
    }

    /// Fetch-decode-execute one runtime instruction on `thread`.
    fn step(&mut self, thread: usize) -> Result<(), Fault> {
        let function = self.scheduler.thread(thread).current_frame.location.function;
        let pc = self.scheduler.thread(thread).current_frame.location.pc;
        let op = self.decoder(function).read_at(pc)?.clone();
        let mut next_pc = pc + 1;

        match op {
            RuntimeOp::Binop { op, ty, dest, lhs, rhs } => {
                let frame = &self.scheduler.thread(thread).current_frame;
                let (a, b) = (self.read(frame, lhs), self.read(frame, rhs));
                self.write(thread, dest, eval_binop(op, ty, a, b));
            }
            RuntimeOp::Cast { op, from, to, dest, src } => {
                let frame = &self.scheduler.thread(thread).current_frame;
                let v = self.read(frame, src);
                self.write(thread, dest, eval_cast(op, from, to, v));
            }
            RuntimeOp::Cmp2 { op, ty, dest, lhs, rhs } => {
                let frame = &self.scheduler.thread(thread).current_frame;
                let (a, b) = (self.read(frame, lhs), self.read(frame, rhs));
                self.write(thread, dest, RuntimeValue::from_u8(eval_cmp(op, ty, a, b) as u8));
            }
            RuntimeOp::Select { dest, cond, if_true, if_false, .. } => {
                let frame = &self.scheduler.thread(thread).current_frame;
                let taken = if self.read(frame, cond).as_u8() != 0 { if_true } else { if_false };
                let value = self.read(frame, taken);
                self.write(thread, dest, value);
            }
            RuntimeOp::Alloca { dest, size, align } => {
                let frame = &self.scheduler.thread(thread).current_frame;
                let size = self.read(frame, size).as_u32() as Word;
                let addr = self.scheduler.thread_mut(thread).current_frame.alloca(size, align);
                self.memory.check_stack(addr)?;
                self.write(thread, dest, RuntimeValue::from_u32(addr));
            }
            RuntimeOp::Load { ty, dest, addr } => {
                let frame = &self.scheduler.thread(thread).current_frame;
                let addr = self.read(frame, addr).as_u32();
                let size = ty.size_of().unwrap_or(4) as u32;
                let value = self.memory.load(addr, size)?;
                self.write(thread, dest, load_runtime_value(ty, value));
            }
            RuntimeOp::Store { ty, addr, value } => {
                let frame = &self.scheduler.thread(thread).current_frame;
                let addr_val = self.read(frame, addr).as_u32();
                let value = self.read(frame, value);
                let size = ty.size_of().unwrap_or(4) as u32;
                self.memory.store(addr_val, value.to_u64(), size)?;
            }
            RuntimeOp::Br { target, phi } => {
                self.apply_phi(thread, &phi);
                next_pc = target;
            }
            RuntimeOp::BrInt1 { cond, if_true, phi_true, if_false, phi_false } => {
                let frame = &self.scheduler.thread(thread).current_frame;
                let taken = self.read(frame, cond).as_u8() != 0;
                if taken {
                    self.apply_phi(thread, &phi_true);
                    next_pc = if_true;
                } else {
                    self.apply_phi(thread, &phi_false);
                    next_pc = if_false;
                }
            }
            RuntimeOp::Switch { ty, value, default_target, default_phi, cases } => {
                let frame = &self.scheduler.thread(thread).current_frame;
                let v = signed_value(ty, self.read(frame, value));
                match cases.iter().find(|(cv, _, _)| *cv == v) {
                    Some((_, target, phi)) => {
                        self.apply_phi(thread, phi);
                        next_pc = *target;
                    }
                    None => {
                        self.apply_phi(thread, &default_phi);
                        next_pc = default_target;
                    }
                }
            }
            RuntimeOp::RetVoid => {
                self.do_return(thread, RuntimeValue::ZERO)?;
                return Ok(());
            }
            RuntimeOp::RetValue { value, .. } => {
                let frame = &self.scheduler.thread(thread).current_frame;
                let v = self.read(frame, value);
                self.do_return(thread, v)?;
                return Ok(());
            }
            RuntimeOp::Unreachable => {
                let block = BasicBlockId::new(0);
                return Err(Fault::Unreachable { function, block });
            }
            RuntimeOp::Call { dest, callee, args, .. } => {
                let values = self.collect_args(thread, &args);
                self.dispatch_call(thread, CallTarget::Function(callee), dest, &values)?;
                return Ok(());
            }
            RuntimeOp::CallIndirect { dest, callee, args, .. } => {
                let frame = &self.scheduler.thread(thread).current_frame;
                let target_word = self.read(frame, callee).to_u64();
                let target = Self::decode_call_target(target_word);
                let values = self.collect_args(thread, &args);
                self.dispatch_call(thread, target, dest, &values)?;
                return Ok(());
            }
            RuntimeOp::CallBuiltin { dest, builtin, args, .. } => {
                let values = self.collect_args(thread, &args);
                self.dispatch_call(thread, CallTarget::Builtin(builtin), dest, &values)?;
                return Ok(());
            }
            RuntimeOp::Intrinsic { kind, dest, ty, args } => {
                // `eval_intrinsic` manages its own frame's pc (including the
                // unwound frame on a longjmp, which is not necessarily this
                // thread's frame from a moment ago) and always advances it
                // before returning, so it must not be overwritten below.
                self.eval_intrinsic(thread, kind, dest, ty, &args)?;
                return Ok(());
            }
        }

        self.scheduler.thread_mut(thread).current_frame.location.pc = next_pc;
        Ok(())
    }

    fn collect_args(&self, thread: usize, args: &[ValueId]) -> Vec<RuntimeValue> {
        let frame = &self.scheduler.thread(thread).current_frame;
        args.iter().map(|&id| self.read(frame, id)).collect()
    }

    fn dispatch_call(
        &mut self,
        thread: usize,
        target: CallTarget,
        dest: Option<ValueId>,
        args: &[RuntimeValue],
    ) -> Result<(), Fault> {
        match target {
            CallTarget::Builtin(builtin) => {
                let words: Vec<Word> = args.iter().map(|v| v.to_u64()).collect();
                let mut ctx = IrtContext { exec: self, thread };
                let result = irt::call(&mut ctx, builtin, &words)?;
                // `futex_wait_abs` can park the calling thread rather than
                // complete (crate::irt::futex's wait_abs); when it does, the
                // pc must stay on this same call so the retry after waking
                // re-enters it and sees the parked outcome, instead of
                // silently completing a call that never ran to conclusion.
                if self.scheduler.thread(thread).state == ThreadState::Blocked {
                    return Ok(());
                }
                self.advance_pc(thread);
                if let Some(dest) = dest {
                    self.write(thread, dest, RuntimeValue::from_u64(result));
                }
                Ok(())
            }
            CallTarget::Function(function) => {
                if function.index() >= self.module.functions.len() {
                    return Err(Fault::BadCallTarget(ValueId::INVALID));
                }
                if self.module.function(function).is_declaration_only {
                    if let Some(builtin) = builtin_by_name(&self.module.function(function).name) {
                        return self.dispatch_call(thread, CallTarget::Builtin(builtin), dest, args);
                    }
                }
                self.advance_pc(thread);
                let num_values = self.analyzed[function.index()].value_types.len();
                let stack_top = self.scheduler.thread(thread).current_frame.memory_stack_top;
                let mut callee_frame = CallFrame::new(function, num_values, stack_top);
                callee_frame.return_dest = dest;
                for (i, value) in args.iter().enumerate() {
                    if let Some(slot) = callee_frame.values.get_mut(i) {
                        *slot = *value;
                    }
                }
                seed_constants(&mut callee_frame, self.module.function(function));
                let caller = std::mem::replace(&mut self.scheduler.thread_mut(thread).current_frame, callee_frame);
                self.scheduler.thread_mut(thread).current_frame.parent = Some(Box::new(caller));
                Ok(())
            }
        }
    }

    fn advance_pc(&mut self, thread: usize) {
        self.scheduler.thread_mut(thread).current_frame.location.pc += 1;
    }

    fn do_return(&mut self, thread: usize, value: RuntimeValue) -> Result<(), Fault> {
        let frame = &self.scheduler.thread(thread).current_frame;
        if frame.parent.is_none() {
            if thread == 0 {
                self.request_exit(value.as_i32());
            }
            self.scheduler.thread_mut(thread).state = ThreadState::Dead;
            self.scheduler.advance();
            return Ok(());
        }
        let current = std::mem::replace(
            &mut self.scheduler.thread_mut(thread).current_frame,
            CallFrame::sentinel(0),
        );
        let dest = current.return_dest;
        self.scheduler.thread_mut(thread).current_frame = *current.parent.unwrap();
        if let Some(dest) = dest {
            self.write(thread, dest, value);
        }
        Ok(())
    }

    fn eval_intrinsic(
        &mut self,
        thread: usize,
        kind: Intrinsic,
        dest: Option<ValueId>,
        ty: BasicType,
        args: &[ValueId],
    ) -> Result<(), Fault> {
        let values = self.collect_args(thread, args);
        match kind {
            Intrinsic::Memcpy | Intrinsic::Memmove => {
                let (dst, src, len) = (values[0].as_u32(), values[1].as_u32(), values[2].as_u32());
                let bytes = self.memory.read_bytes(src, len)?.to_vec();
                self.memory.write_bytes(dst, &bytes)?;
            }
            Intrinsic::Memset => {
                let (dst, byte, len) = (values[0].as_u32(), values[1].as_u8(), values[2].as_u32());
                let bytes = vec![byte; len as usize];
                self.memory.write_bytes(dst, &bytes)?;
            }
            Intrinsic::Bswap => {
                let result = RuntimeValue::from_u64(values[0].to_u64().swap_bytes());
                self.write_dest(thread, dest, result);
            }
            Intrinsic::Ctlz => self.write_dest(thread, dest, RuntimeValue::from_u32(values[0].as_u32().leading_zeros())),
            Intrinsic::Cttz => self.write_dest(thread, dest, RuntimeValue::from_u32(values[0].as_u32().trailing_zeros())),
            Intrinsic::Fabs => {
                let result = match ty {
                    BasicType::F64 => RuntimeValue::from_f64(values[0].as_f64().abs()),
                    _ => RuntimeValue::from_f32(values[0].as_f32().abs()),
                };
                self.write_dest(thread, dest, result);
            }
            Intrinsic::Sqrt => {
                let result = match ty {
                    BasicType::F64 => RuntimeValue::from_f64(values[0].as_f64().sqrt()),
                    _ => RuntimeValue::from_f32(values[0].as_f32().sqrt()),
                };
                self.write_dest(thread, dest, result);
            }
            Intrinsic::Trap => return Err(Fault::Trap),
            Intrinsic::StackSave => {
                let top = self.scheduler.thread(thread).current_frame.memory_stack_top;
                self.write_dest(thread, dest, RuntimeValue::from_u32(top));
            }
            Intrinsic::StackRestore => {
                self.scheduler.thread_mut(thread).current_frame.memory_stack_top = values[0].as_u32();
            }
            Intrinsic::SetJmp => {
                self.jmpbuf_counter += 1;
                let id = self.jmpbuf_counter;
                let buf = values[0].as_u32();
                self.memory.store(buf, id as Word, 4)?;
                // The resume point is the instruction after this one, by this
                // frame's own pc — captured now since by the time a longjmp
                // targets it, this frame may no longer be current, or may
                // have moved its own pc on past further calls. `dest` is
                // this call's own result value, rewritten by a matching
                // longjmp rather than left at the `0` written below.
                let resume_pc = self.scheduler.thread(thread).current_frame.location.pc + 1;
                self.scheduler.thread_mut(thread).current_frame.jmpbuf_head.push((id, resume_pc, dest));
                self.write_dest(thread, dest, RuntimeValue::from_i32(0));
            }
            Intrinsic::LongJmp => {
                let buf = values[0].as_u32();
                let result_value = values[1].as_i32();
                let id = self.memory.load(buf, 4)? as u32;
                let mut frame = &mut self.scheduler.thread_mut(thread).current_frame;
                let (resume_pc, setjmp_dest) = loop {
                    if let Some(&(_, pc, d)) = frame.jmpbuf_head.iter().find(|&&(i, _, _)| i == id) {
                        break (pc, d);
                    }
                    match frame.parent.as_deref_mut() {
                        Some(parent) => frame = parent,
                        None => return Err(Fault::UnknownJmpBuf(id)),
                    }
                };
                frame.memory_stack_top = frame.allocator_mark;
                // Pop frames above the matched one off this thread's stack.
                while !self.scheduler.thread(thread).current_frame.jmpbuf_head.iter().any(|&(i, _, _)| i == id) {
                    let current = std::mem::replace(
                        &mut self.scheduler.thread_mut(thread).current_frame,
                        CallFrame::sentinel(0),
                    );
                    self.scheduler.thread_mut(thread).current_frame = *current.parent.expect("walked above");
                }
                if let Some(setjmp_dest) = setjmp_dest {
                    self.write(thread, setjmp_dest, RuntimeValue::from_i32(result_value));
                }
                self.scheduler.thread_mut(thread).current_frame.location.pc = resume_pc;
                return Ok(());
            }
            Intrinsic::NaclReadTp => {
                let tls = self.scheduler.thread(thread).tls;
                self.write_dest(thread, dest, RuntimeValue::from_u32(tls));
            }
            Intrinsic::AtomicLoad => {
                let size = ty.size_of().unwrap_or(4) as u32;
                let v = self.memory.load(values[0].as_u32(), size)?;
                self.write_dest(thread, dest, load_runtime_value(ty, v));
            }
            Intrinsic::AtomicStore => {
                let size = ty.size_of().unwrap_or(4) as u32;
                self.memory.store(values[0].as_u32(), values[1].to_u64(), size)?;
            }
            Intrinsic::AtomicFence => {}
            Intrinsic::AtomicCmpXchg => {
                let addr = values[0].as_u32();
                let size = ty.size_of().unwrap_or(4) as u32;
                let current = self.memory.load(addr, size)?;
                if current == (values[1].to_u64() & size_mask(size)) {
                    self.memory.store(addr, values[2].to_u64(), size)?;
                }
                self.write_dest(thread, dest, load_runtime_value(ty, current));
            }
            Intrinsic::AtomicRmw { op } => {
                let addr = values[0].as_u32();
                let size = ty.size_of().unwrap_or(4) as u32;
                let current = self.memory.load(addr, size)?;
                let operand = values[1].to_u64();
                let new = match op {
                    AtomicRmwOp::Add => current.wrapping_add(operand),
                    AtomicRmwOp::Sub => current.wrapping_sub(operand),
                    AtomicRmwOp::And => current & operand,
                    AtomicRmwOp::Or => current | operand,
                    AtomicRmwOp::Xor => current ^ operand,
                    AtomicRmwOp::Xchg => operand,
                };
                self.memory.store(addr, new & size_mask(size), size)?;
                self.write_dest(thread, dest, load_runtime_value(ty, current));
            }
        }
        self.advance_pc(thread);
        Ok(())
    }

    fn write_dest(&mut self, thread: usize, dest: Option<ValueId>, value: RuntimeValue) {
        if let Some(dest) = dest {
            self.write(thread, dest, value);
        }
    }
}

/// Concatenate every global variable's initializer bytes, aligned per its
/// declared alignment, returning the flat byte blob and each global's byte
/// offset within it (spec §3 "Global variable").
fn layout_globals(module: &Module) -> (Vec<u8>, Vec<u32>) {
    let mut bytes = Vec::new();
    let mut bases = Vec::with_capacity(module.global_vars.len());
    for gv in &module.global_vars {
        let align = gv.alignment.max(1) as usize;
        let pad = (align - bytes.len() % align) % align;
        bytes.extend(std::iter::repeat(0u8).take(pad));
        bases.push(bytes.len() as u32);
        bytes.extend_from_slice(&gv.data);
    }
    (bytes, bases)
}

/// Patch every global's recorded `(offset, target global, addend)`
/// relocation with the target's now-known absolute address.
fn patch_global_relocations(memory: &mut Memory, module: &Module, bases: &[u32]) {
    let globalvar_start = memory.layout().globalvar_start;
    for (gv, &base) in module.global_vars.iter().zip(bases) {
        for &(offset, target, addend) in &gv.relocations {
            let Some(&target_base) = bases.get(target as usize) else { continue };
            let addr = (globalvar_start as i64 + target_base as i64 + addend) as u32;
            let _ = memory.store(globalvar_start + base + offset as u32, addr as Word, 4);
        }
    }
}

/// Copy a function's CONSTANTS-block values into the local value ids
/// PNaCl's value numbering reserves for them, just past its argument ids
/// (spec §4.3 FUNCTION: "args, then constants, then instruction results").
fn seed_constants(frame: &mut CallFrame, function: &pexe_reader::Function) {
    let base = function.num_args as usize;
    for (i, c) in function.constants.iter().enumerate() {
        if let Some(slot) = frame.values.get_mut(base + i) {
            *slot = c.value;
        }
    }
}

fn size_mask(size: u32) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1u64 << (size * 8)) - 1
    }
}

fn load_runtime_value(ty: BasicType, word: Word) -> RuntimeValue {
    match ty {
        BasicType::I1 | BasicType::I8 => RuntimeValue::from_i8(word as i8),
        BasicType::I16 => RuntimeValue::from_i16(word as i16),
        BasicType::I32 => RuntimeValue::from_i32(word as i32),
        BasicType::I64 => RuntimeValue::from_i64(word as i64),
        BasicType::F32 => RuntimeValue::from_f32(f32::from_bits(word as u32)),
        BasicType::F64 => RuntimeValue::from_f64(f64::from_bits(word)),
        BasicType::Void => RuntimeValue::ZERO,
    }
}

fn signed_value(ty: BasicType, v: RuntimeValue) -> i64 {
    match ty {
        BasicType::I1 | BasicType::I8 => v.as_i8() as i64,
        BasicType::I16 => v.as_i16() as i64,
        BasicType::I32 => v.as_i32() as i64,
        _ => v.as_i64(),
    }
}

fn eval_binop(op: BinOp, ty: BasicType, a: RuntimeValue, b: RuntimeValue) -> RuntimeValue {
    if ty.is_float() {
        let (x, y) = (a.as_f64(), b.as_f64());
        let r = match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            BinOp::SDiv | BinOp::UDiv => x / y,
            _ => x,
        };
        return if ty == BasicType::F32 { RuntimeValue::from_f32(r as f32) } else { RuntimeValue::from_f64(r) };
    }
    let (x, y) = (a.as_i64(), b.as_i64());
    let (ux, uy) = (a.as_u64(), b.as_u64());
    let result = match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::SDiv => if y == 0 { 0 } else { x.wrapping_div(y) },
        BinOp::UDiv => if uy == 0 { 0 } else { (ux.wrapping_div(uy)) as i64 },
        BinOp::SRem => if y == 0 { 0 } else { x.wrapping_rem(y) },
        BinOp::URem => if uy == 0 { 0 } else { (ux.wrapping_rem(uy)) as i64 },
        BinOp::And => x & y,
        BinOp::Or => x | y,
        BinOp::Xor => x ^ y,
        BinOp::Shl => x.wrapping_shl(uy as u32 & 63),
        BinOp::LShr => ((ux) >> (uy & 63)) as i64,
        BinOp::AShr => x.wrapping_shr(uy as u32 & 63),
    };
    truncate_to(ty, result)
}

fn truncate_to(ty: BasicType, v: i64) -> RuntimeValue {
    match ty {
        BasicType::I1 => RuntimeValue::from_i8((v as i8) & 1),
        BasicType::I8 => RuntimeValue::from_i8(v as i8),
        BasicType::I16 => RuntimeValue::from_i16(v as i16),
        BasicType::I32 => RuntimeValue::from_i32(v as i32),
        _ => RuntimeValue::from_i64(v),
    }
}

fn eval_cmp(op: CmpOp, ty: BasicType, a: RuntimeValue, b: RuntimeValue) -> bool {
    if ty.is_float() {
        let (x, y) = (a.as_f64(), b.as_f64());
        return match op {
            CmpOp::OEq => x == y,
            CmpOp::OLt => x < y,
            CmpOp::OLe => x <= y,
            CmpOp::Eq => x == y,
            CmpOp::Ne => x != y,
            _ => false,
        };
    }
    let (x, y) = (signed_value(ty, a), signed_value(ty, b));
    let (ux, uy) = (a.as_u64(), b.as_u64());
    match op {
        CmpOp::Eq => x == y,
        CmpOp::Ne => x != y,
        CmpOp::SLt => x < y,
        CmpOp::SLe => x <= y,
        CmpOp::ULt => ux < uy,
        CmpOp::ULe => ux <= uy,
        CmpOp::OLt | CmpOp::OLe | CmpOp::OEq => false,
    }
}

fn eval_cast(op: CastOp, from: BasicType, to: BasicType, v: RuntimeValue) -> RuntimeValue {
    match op {
        CastOp::Trunc | CastOp::ZExt | CastOp::Bitcast => truncate_to(to, v.as_u64() as i64),
        CastOp::SExt => truncate_to(to, signed_value(from, v)),
        CastOp::IntToFloat { signed } => {
            let x = if signed { signed_value(from, v) as f64 } else { v.as_u64() as f64 };
            if to == BasicType::F32 { RuntimeValue::from_f32(x as f32) } else { RuntimeValue::from_f64(x) }
        }
        CastOp::FloatToInt { signed } => {
            let x = v.as_f64();
            if signed {
                truncate_to(to, x as i64)
            } else {
                truncate_to(to, (x as u64) as i64)
            }
        }
        CastOp::FloatCast => {
            if to == BasicType::F32 {
                RuntimeValue::from_f32(v.as_f64() as f32)
            } else {
                RuntimeValue::from_f64(v.as_f32() as f64)
            }
        }
    }
}

/// Resolve a declaration-only function's symbol to an IRT built-in by name
/// (spec §4.3 "linkage to built-ins is by name match"). Only the handful
/// of names a `_start` shim realistically imports directly (rather than
/// through `nacl_irt_query`) are listed.
fn builtin_by_name(name: &str) -> Option<BuiltinId> {
    let id = match name {
        "exit" | "_exit" => 0,
        "write" => 10,
        "read" => 9,
        _ => return None,
    };
    Some(BuiltinId::new(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pexe_asm::{Encoder, PhiAssign};
    use pexe_reader::Module;
    use pexe_types::TypeId;

    fn const_return_42() -> (Module, Vec<AnalyzedFunction>) {
        let module = Module::default();
        let mut enc = Encoder::new();
        enc.begin_block(BasicBlockId::new(0));
        enc.push(RuntimeOp::RetValue { ty: BasicType::I32, value: ValueId::new(0) });
        let code = enc.finish();
        let analyzed = AnalyzedFunction {
            value_types: vec![BasicType::I32],
            predecessors: vec![Vec::new()],
            code,
            block_offsets: vec![0],
        };
        (module, vec![analyzed])
    }

    #[test]
    fn returning_a_constant_sets_the_exit_code() {
        let (mut module, analyzed) = const_return_42();
        module.functions.push(pexe_reader::Function { num_args: 0, ..Default::default() });
        let mut exec = Executor::new(module, analyzed, Config::default());
        exec.spawn_main(FunctionId::new(0)).unwrap();
        exec.scheduler.thread_mut(0).current_frame.values[0] = RuntimeValue::from_i32(42);
        let code = exec.run().unwrap();
        assert_eq!(code, 42);
    }

    #[test]
    fn binop_add_computes_in_place() {
        let result = eval_binop(BinOp::Add, BasicType::I32, RuntimeValue::from_i32(2), RuntimeValue::from_i32(40));
        assert_eq!(result.as_i32(), 42);
    }

    #[test]
    fn switch_dedupes_phi_writes_to_shared_target() {
        let mut module = Module::default();
        module.functions.push(pexe_reader::Function { num_args: 1, ..Default::default() });
        let b0 = BasicBlockId::new(0);
        let b1 = BasicBlockId::new(1);

        let mut enc = Encoder::new();
        enc.begin_block(b0);
        enc.push(RuntimeOp::Unreachable); // placeholder for the switch, resolved below
        let target = enc.begin_block(b1);
        enc.push(RuntimeOp::RetValue { ty: BasicType::I32, value: ValueId::new(1) });

        let mut enc = Encoder::new();
        enc.begin_block(b0);
        enc.push(RuntimeOp::Switch {
            ty: BasicType::I32,
            value: ValueId::new(0),
            default_target: target,
            default_phi: vec![PhiAssign { dest: ValueId::new(1), source: ValueId::new(0) }],
            cases: vec![(1, target, vec![PhiAssign { dest: ValueId::new(1), source: ValueId::new(0) }])],
        });
        enc.begin_block(b1);
        enc.push(RuntimeOp::RetValue { ty: BasicType::I32, value: ValueId::new(1) });
        let code = enc.finish();

        let analyzed = AnalyzedFunction {
            value_types: vec![BasicType::I32, BasicType::I32],
            predecessors: vec![Vec::new(), vec![b0]],
            code,
            block_offsets: vec![0, target],
        };
        let mut exec = Executor::new(module, vec![analyzed], Config::default());
        exec.spawn_main(FunctionId::new(0)).unwrap();
        exec.scheduler.thread_mut(0).current_frame.values[0] = RuntimeValue::from_i32(2);
        let code = exec.run().unwrap();
        assert_eq!(code, 2);
        let _ = TypeId::INVALID;
    }
}
