//! `nacl-irt-fdio-0.1`: the minimal file descriptor surface (spec §4.6).
//!
//! Only `stdout`/`stderr` are backed by anything real — writes to fd 1/2
//! are captured on the executor (so tests can assert on program output)
//! and mirrored to the host's real streams. Every other fd is unbacked,
//! matching the Non-goal "full POSIX emulation".

use std::io::Write;

use pexe_types::{Errno, Word};

use super::IrtContext;

pub fn call(ctx: &mut IrtContext<'_>, id: u32, args: &[Word]) -> Result<Word, Errno> {
    match id {
        0 => close(ctx, args),
        1 => dup(ctx, args),
        2 => dup2(ctx, args),
        3 => read(ctx, args),
        4 => write(ctx, args),
        5 => seek(ctx, args),
        6 => fstat(ctx, args),
        7 => getdents(ctx, args),
        _ => Err(Errno::Enosys),
    }
}

fn close(_ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    let fd = args.first().copied().unwrap_or(0);
    if fd <= 2 {
        Ok(0)
    } else {
        Err(Errno::Ebadf)
    }
}

fn dup(_ctx: &mut IrtContext<'_>, _args: &[Word]) -> Result<Word, Errno> {
    Err(Errno::Enosys)
}

fn dup2(_ctx: &mut IrtContext<'_>, _args: &[Word]) -> Result<Word, Errno> {
    Err(Errno::Enosys)
}

fn read(_ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    let fd = args.first().copied().unwrap_or(0);
    if fd == 0 {
        // No host stdin plumbing; report EOF rather than fabricate bytes.
        Ok(0)
    } else {
        Err(Errno::Ebadf)
    }
}

/// `write(fd, buf, count, nwrite_out)`.
fn write(ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    let fd = args.first().copied().unwrap_or(0);
    let buf = args.get(1).copied().unwrap_or(0) as u32;
    let count = args.get(2).copied().unwrap_or(0) as u32;
    let nwrite_out = args.get(3).copied().unwrap_or(0) as u32;

    if fd != 1 && fd != 2 {
        return Err(Errno::Ebadf);
    }
    let bytes = ctx.exec.memory().read_bytes(buf, count).map_err(|_| Errno::Efault)?.to_vec();
    ctx.exec.capture_write(fd, &bytes);
    if fd == 1 {
        let _ = std::io::stdout().write_all(&bytes);
    } else {
        let _ = std::io::stderr().write_all(&bytes);
    }
    ctx.exec.memory_mut().store(nwrite_out, bytes.len() as Word, 4).map_err(|_| Errno::Efault)?;
    Ok(0)
}

fn seek(_ctx: &mut IrtContext<'_>, _args: &[Word]) -> Result<Word, Errno> {
    Err(Errno::Espipe)
}

fn fstat(_ctx: &mut IrtContext<'_>, args: &[Word]) -> Result<Word, Errno> {
    let fd = args.first().copied().unwrap_or(0);
    if fd <= 2 {
        Ok(0)
    } else {
        Err(Errno::Ebadf)
    }
}

fn getdents(_ctx: &mut IrtContext<'_>, _args: &[Word]) -> Result<Word, Errno> {
    Err(Errno::Enosys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::config::Config;
    use pexe_reader::Module;

    #[test]
    fn write_to_stdout_is_captured() {
        let mut exec = Executor::new(Module::default(), Vec::new(), Config::default());
        let addr = exec.memory().layout().heap_start;
        exec.memory_mut().write_bytes(addr, b"hi\n").unwrap();
        let out_ptr = addr + 16;
        let mut ctx = IrtContext { exec: &mut exec, thread: 0 };
        write(&mut ctx, &[1, addr as Word, 3, out_ptr as Word]).unwrap();
        assert_eq!(exec.stdout(), b"hi\n");
        assert_eq!(exec.memory().load(out_ptr, 4).unwrap(), 3);
    }

    #[test]
    fn write_to_unknown_fd_is_ebadf() {
        let mut exec = Executor::new(Module::default(), Vec::new(), Config::default());
        let mut ctx = IrtContext { exec: &mut exec, thread: 0 };
        assert_eq!(write(&mut ctx, &[7, 0, 0, 0]), Err(Errno::Ebadf));
    }
}
