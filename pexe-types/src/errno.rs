//! The Linux-ish errno subset the IRT surfaces through return values.
//!
//! These never escape as a Rust [`Err`] — section 7 of the design spec draws
//! a hard line between fatal interpreter faults (a real `Result::Err`) and
//! IRT call failures (an errno value written back into the guest).

/// An IRT-call failure code, returned to the guest as a register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[repr(i32)]
pub enum Errno {
    /// Operation not permitted
    Eperm = 1,
    /// No such file or directory
    Enoent = 2,
    /// No such process
    Esrch = 3,
    /// Interrupted system call
    Eintr = 4,
    /// I/O error
    Eio = 5,
    /// No such device or address
    Enxio = 6,
    /// Argument list too long
    E2big = 7,
    /// Exec format error
    Enoexec = 8,
    /// Bad file number
    Ebadf = 9,
    /// No child processes
    Echild = 10,
    /// Try again
    Eagain = 11,
    /// Out of memory
    Enomem = 12,
    /// Permission denied
    Eacces = 13,
    /// Bad address
    Efault = 14,
    /// Device or resource busy
    Ebusy = 16,
    /// File exists
    Eexist = 17,
    /// Cross-device link
    Exdev = 18,
    /// No such device
    Enodev = 19,
    /// Not a directory
    Enotdir = 20,
    /// Is a directory
    Eisdir = 21,
    /// Invalid argument
    Einval = 22,
    /// File table overflow
    Enfile = 23,
    /// Too many open files
    Emfile = 24,
    /// Not a typewriter
    Enotty = 25,
    /// File too large
    Efbig = 27,
    /// No space left on device
    Enospc = 28,
    /// Illegal seek
    Espipe = 29,
    /// Read-only file system
    Erofs = 30,
    /// Too many links
    Emlink = 31,
    /// Broken pipe
    Epipe = 32,
    /// File name too long
    Enametoolong = 36,
    /// Function not implemented
    Enosys = 38,
    /// Connection timed out
    Etimedout = 110,
    /// Quota exceeded
    Edquot = 122,
}

impl Errno {
    /// Map a host [`std::io::Error`] raw OS error to the closest errno
    /// variant, falling back to [`Errno::Enosys`] the way the original
    /// `pn_from_errno` does for codes it doesn't recognize.
    #[cfg(feature = "std")]
    pub fn from_raw_os_error(code: i32) -> Self {
        use Errno::*;
        match code {
            1 => Eperm,
            2 => Enoent,
            3 => Esrch,
            4 => Eintr,
            5 => Eio,
            6 => Enxio,
            7 => E2big,
            8 => Enoexec,
            9 => Ebadf,
            10 => Echild,
            11 => Eagain,
            12 => Enomem,
            13 => Eacces,
            14 => Efault,
            16 => Ebusy,
            17 => Eexist,
            18 => Exdev,
            19 => Enodev,
            20 => Enotdir,
            21 => Eisdir,
            22 => Einval,
            23 => Enfile,
            24 => Emfile,
            25 => Enotty,
            27 => Efbig,
            28 => Enospc,
            29 => Espipe,
            30 => Erofs,
            31 => Emlink,
            32 => Epipe,
            36 => Enametoolong,
            38 => Enosys,
            110 => Etimedout,
            122 => Edquot,
            _ => Enosys,
        }
    }

    /// The numeric value written back into the guest's result register.
    pub const fn code(self) -> i32 {
        self as i32
    }
}
