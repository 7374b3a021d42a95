//! `nacl-irt-futex-0.1`: the blocking primitive the join/semaphore test
//! scenarios are built on (spec §4.6, §8 scenarios 5-6).

use pexe_types::{Errno, Word};

use super::IrtContext;
use crate::thread::ThreadState;

pub fn call(ctx: &mut IrtContext<'_>, id: u32, args: &[Word]) -> Result<Word, Errno> {
    match id {
        0 => wait_abs(ctx, args),
        1 => wake(ctx, args),
        _ => Err(Errno::Enosys),
    }
}

/// `futex_wait_abs(addr, value, abstime?)`. Compares the word at `addr`
/// to `value`; on mismatch returns `EAGAIN` immediately, otherwise parks
/// the calling thread. A re-entry after being woken (or timed out) reports
/// that outcome instead of re-blocking (spec §4.6).
fn wait_abs(ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    let thread = ctx.thread;
    match ctx.exec.scheduler().thread(thread).futex_state {
        crate::thread::FutexState::Woken => {
            ctx.exec.scheduler_mut().thread_mut(thread).futex_state = crate::thread::FutexState::None;
            return Ok(0);
        }
        crate::thread::FutexState::TimedOut => {
            ctx.exec.scheduler_mut().thread_mut(thread).futex_state = crate::thread::FutexState::None;
            return Err(Errno::Etimedout);
        }
        crate::thread::FutexState::None => {}
    }

    let addr = args.first().copied().unwrap_or(0) as u32;
    let value = args.get(1).copied().unwrap_or(0) as Word;
    let abstime = args.get(2).copied();

    let current = ctx.exec.memory().load(addr, 4).map_err(|_| Errno::Efault)?;
    if current != (value & 0xffff_ffff) {
        return Err(Errno::Eagain);
    }

    let t = ctx.exec.scheduler_mut().thread_mut(thread);
    t.state = ThreadState::Blocked;
    t.wait_addr = Some(addr);
    t.timeout = abstime.filter(|&t| t != 0);
    Ok(0)
}

/// `futex_wake(addr, nwake, count_out)`.
fn wake(ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    let addr = args.first().copied().unwrap_or(0) as u32;
    let nwake = args.get(1).copied().unwrap_or(u32::MAX as Word) as u32;
    let count_out = args.get(2).copied().unwrap_or(0) as u32;
    let woken = ctx.exec.scheduler_mut().wake(addr, nwake);
    ctx.exec.memory_mut().store(count_out, woken as Word, 4).map_err(|_| Errno::Efault)?;
    Ok(0)
}
