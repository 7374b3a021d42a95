//! `nacl-irt-filename-0.3`: the path-based filesystem surface.
//!
//! This interpreter has no host filesystem passthrough (spec's Non-goals);
//! every entry reports `ENOSYS` except `getcwd`, which is cheap to answer
//! meaningfully and is exercised by enough real `_start` shims to be worth
//! it.

use pexe_types::{Errno, Word};

use super::IrtContext;

pub fn call(ctx: &mut IrtContext<'_>, id: u32, args: &[Word]) -> Result<Word, Errno> {
    match id {
        5 => getcwd(ctx, args),
        _ => Err(Errno::Enosys),
    }
}

/// `getcwd(buf, len)`: always reports `/`.
fn getcwd(ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    let buf = args.first().copied().unwrap_or(0) as u32;
    let len = args.get(1).copied().unwrap_or(0) as u32;
    const CWD: &[u8] = b"/\0";
    if len < CWD.len() as u32 {
        return Err(Errno::Einval);
    }
    ctx.exec.memory_mut().write_bytes(buf, CWD).map_err(|_| Errno::Efault)?;
    Ok(0)
}
