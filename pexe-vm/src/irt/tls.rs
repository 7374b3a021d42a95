//! `nacl-irt-tls-0.1`: thread-local storage pointer init/read.

use pexe_types::{Errno, Word};

use super::IrtContext;

pub fn call(ctx: &mut IrtContext<'_>, id: u32, args: &[Word]) -> Result<Word, Errno> {
    match id {
        0 => init(ctx, args),
        1 => get(ctx, args),
        _ => Err(Errno::Enosys),
    }
}

/// `tls_init(thread_ptr)`: records the calling thread's TLS base.
fn init(ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    let ptr = args.first().copied().unwrap_or(0) as u32;
    let thread = ctx.thread;
    ctx.exec.scheduler_mut().thread_mut(thread).tls = ptr;
    Ok(0)
}

/// `tls_get()`: returns the calling thread's TLS base.
fn get(ctx: &mut IrtContext<'_>, _args: &[Word]) -> Result<Word, Errno> {
    let thread = ctx.thread;
    Ok(ctx.exec.scheduler_mut().thread_mut(thread).tls as Word)
}
