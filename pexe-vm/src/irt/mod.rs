//! The `NACL_IRT_QUERY` built-in surface (spec §4.6, §6): a handful of
//! named interface tables, each a contiguous run of [`BuiltinId`]s,
//! dispatched by `pn_builtin_to_pointer`-style function-pointer words
//! rather than a normal call frame.

pub mod basic;
pub mod fdio;
pub mod filename;
pub mod futex;
pub mod memory;
pub mod thread;
pub mod tls;

use pexe_types::{BuiltinId, Errno, Word};

use crate::error::Fault;
use crate::executor::Executor;

/// One IRT interface: its query name and the contiguous built-in id range
/// backing it, in table order.
struct Interface {
    name: &'static str,
    base: u32,
    len: u32,
}

const INTERFACES: &[Interface] = &[
    Interface { name: "nacl-irt-basic-0.1", base: 0, len: 6 },
    Interface { name: "nacl-irt-fdio-0.1", base: 6, len: 8 },
    Interface { name: "nacl-irt-filename-0.3", base: 14, len: 16 },
    Interface { name: "nacl-irt-memory-0.3", base: 30, len: 3 },
    Interface { name: "nacl-irt-tls-0.1", base: 33, len: 2 },
    Interface { name: "nacl-irt-thread-0.1", base: 35, len: 3 },
    Interface { name: "nacl-irt-futex-0.1", base: 38, len: 2 },
];

/// Total number of distinct built-ins actually implemented across every
/// table. Function-pointer encoding is sized against `pexe_types::MAX_BUILTINS`
/// (the ABI-reserved slot count), not this — an id in `NUM_BUILTINS..MAX_BUILTINS`
/// is a valid builtin slot that simply has no implementation, surfaced as
/// `Fault::UnknownBuiltin` on call.
pub const NUM_BUILTINS: u32 = 40;

/// `nacl_irt_query(name)`: the table of built-in ids backing `name`, or an
/// empty slice for an unknown interface (spec §6 "Unknown interfaces
/// return size 0").
pub fn query(name: &str) -> Vec<BuiltinId> {
    match INTERFACES.iter().find(|i| i.name == name) {
        Some(iface) => (iface.base..iface.base + iface.len).map(BuiltinId::new).collect(),
        None => Vec::new(),
    }
}

/// A builtin call's view of the world: the owning executor plus which
/// thread is making the call.
pub struct IrtContext<'a> {
    pub exec: &'a mut Executor,
    pub thread: usize,
}

/// Dispatch one built-in call. Returns the primary return register value;
/// IRT-specific failures come back as `Ok(Word)` carrying a negated
/// [`Errno`] in the low bits, per convention — never as this function's
/// `Err`, which is reserved for fatal faults (an unknown built-in id).
pub fn call(ctx: &mut IrtContext<'_>, builtin: BuiltinId, args: &[Word]) -> Result<Word, Fault> {
    let id = builtin.index() as u32;
    let result = match id {
        0..=5 => basic::call(ctx, id, args),
        6..=13 => fdio::call(ctx, id - 6, args),
        14..=29 => filename::call(ctx, id - 14, args),
        30..=32 => memory::call(ctx, id - 30, args),
        33..=34 => tls::call(ctx, id - 33, args),
        35..=37 => thread::call(ctx, id - 35, args),
        38..=39 => futex::call(ctx, id - 38, args),
        other => return Err(Fault::UnknownBuiltin(other)),
    };
    Ok(match result {
        Ok(w) => w,
        Err(errno) => errno_word(errno),
    })
}

/// IRT calls return `-errno` as a plain (sign-extended) word on failure,
/// matching the Linux-style convention the original source follows.
pub fn errno_word(errno: Errno) -> Word {
    (-(errno as i64)) as Word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_reports_known_interface_sizes() {
        assert_eq!(query("nacl-irt-basic-0.1").len(), 6);
        assert_eq!(query("nacl-irt-futex-0.1").len(), 2);
        assert!(query("nacl-irt-unknown-9.9").is_empty());
    }

    #[test]
    fn interface_ranges_are_contiguous_and_exhaustive() {
        let mut ids: Vec<u32> = INTERFACES.iter().flat_map(|i| i.base..i.base + i.len).collect();
        ids.sort_unstable();
        let expected: Vec<u32> = (0..NUM_BUILTINS).collect();
        assert_eq!(ids, expected);
    }
}
