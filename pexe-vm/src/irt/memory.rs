//! `nacl-irt-memory-0.3`: anonymous `mmap`/`munmap`/`mprotect` (spec §4.6).

use pexe_types::{Errno, PAGE_SIZE, Word};

use super::IrtContext;

const PROT_NONE: Word = 0;

pub fn call(ctx: &mut IrtContext<'_>, id: u32, args: &[Word]) -> Result<Word, Errno> {
    match id {
        0 => mmap(ctx, args),
        1 => munmap(ctx, args),
        2 => mprotect(ctx, args),
        _ => Err(Errno::Enosys),
    }
}

/// `mmap(addr_out, len, prot, flags, fd, off)`: only the `ANONYMOUS` path
/// is modeled (spec §4.6); a file-backed request is rejected.
fn mmap(ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    let addr_out = args.first().copied().unwrap_or(0) as u32;
    let len = args.get(1).copied().unwrap_or(0) as u32;
    let fd = args.get(4).copied().unwrap_or(u64::MAX);
    if fd != u64::MAX {
        return Err(Errno::Enosys);
    }
    let pages = len.div_ceil(PAGE_SIZE);
    let addr = ctx.exec.memory_mut().mmap_anonymous(pages).map_err(|_| Errno::Enomem)?;
    ctx.exec.memory_mut().store(addr_out, addr as Word, 4).map_err(|_| Errno::Efault)?;
    Ok(0)
}

fn munmap(ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    let addr = args.first().copied().unwrap_or(0) as u32;
    let len = args.get(1).copied().unwrap_or(0) as u32;
    ctx.exec.memory_mut().munmap(addr, len.div_ceil(PAGE_SIZE));
    Ok(0)
}

fn mprotect(_ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    // Page protection isn't modeled; only reject a request that asks for
    // genuinely nothing to be accessible, which no real caller does.
    let prot = args.get(2).copied().unwrap_or(0);
    if prot == PROT_NONE {
        Err(Errno::Einval)
    } else {
        Ok(0)
    }
}
