//! `nacl-irt-thread-0.1`: thread creation and the calling thread exiting.

use pexe_types::{Errno, Word};

use super::IrtContext;
use crate::thread::ThreadState;

pub fn call(ctx: &mut IrtContext<'_>, id: u32, args: &[Word]) -> Result<Word, Errno> {
    match id {
        0 => create(ctx, args),
        1 => exit(ctx, args),
        2 => nice(ctx, args),
        _ => Err(Errno::Enosys),
    }
}

/// `thread_create(start_func, stack, thread_ptr)`: allocates a thread
/// running `start_func` with its own stack and inserts it into the live
/// ring (spec §4.6).
fn create(ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    let entry = args.first().copied().unwrap_or(0);
    let stack = args.get(1).copied().unwrap_or(0) as u32;
    let tls = args.get(2).copied().unwrap_or(0) as u32;
    ctx.exec.spawn_thread(entry, stack, tls).map_err(|_| Errno::Eagain)?;
    Ok(0)
}

/// `thread_exit(stack_flag)`: the calling thread becomes `Dead`.
fn exit(ctx: &mut IrtContext<'_>, _args: &[Word]) -> Result<Word, Errno> {
    let thread = ctx.thread;
    ctx.exec.scheduler_mut().thread_mut(thread).state = ThreadState::Dead;
    ctx.exec.scheduler_mut().advance();
    Ok(0)
}

fn nice(_ctx: &mut IrtContext<'_>, _args: &[Word]) -> Result<Word, Errno> {
    Ok(0)
}
