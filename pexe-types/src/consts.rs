//! Fixed layout constants carried over from the original implementation.
//!
//! These are not tunable by `Config`; they are part of the ABI a PEXE module
//! is compiled against.

/// Bytes at the bottom of linear memory that are never readable or writable.
pub const GUARD_SIZE: u32 = 1024;

/// Default size of a process's linear memory, absent `--memory-size`.
pub const DEFAULT_MEMORY_SIZE: u32 = 1024 * 1024;

/// log2 of [`PAGE_SIZE`], used by `mmap`/`munmap` page accounting.
pub const PAGE_SHIFT: u32 = 12;

/// Page size used by the `memory` IRT interface.
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;

/// Default alignment (bytes) used for global variables whose declared
/// alignment is zero.
pub const DEFAULT_ALIGN: u32 = 8;

/// Number of runtime instructions a simulated thread runs before the
/// scheduler considers switching to the next ring member.
pub const INSTRUCTIONS_QUANTUM: u32 = 100;

/// Maximum number of abbreviations a single block-info-scoped or local table
/// may hold.
pub const MAX_BLOCK_ABBREV: usize = 100;

/// Maximum number of operations in a single abbreviation definition.
pub const MAX_BLOCK_ABBREV_OP: usize = 10;

/// Number of IRT built-in function ids reserved below the first real
/// function id; `function_pointer = (function_id + MAX_BUILTINS) << 2`.
pub const MAX_BUILTINS: u32 = 256;

/// Sentinel value for an absent/forward-declared id.
pub const INVALID_ID: u32 = u32::MAX;
