// Misc helpers for the syscall wrappers: errno access, error mapping and
// logger setup.

use log::{debug, LevelFilter};

use sysdefs::{Error, ErrorKind};

/// errno of the calling thread.
pub fn get_errno() -> i32 {
    (unsafe { *libc::__errno_location() }) as i32
}

/// Reads errno after a failed native call, logs it against `op` and maps it
/// into the taxonomy.
pub fn handle_errno(op: &str) -> Error {
    let errno = get_errno();
    let err = Error::from_errno(errno);
    debug!("{} failed: errno {} ({})", op, errno, err.kind());
    err
}

/// Like [`handle_errno`] for calls with a closed error set: the listed
/// codes map to their kind and any other code becomes `fallback`.
pub fn handle_errno_or(op: &str, special: &[(i32, ErrorKind)], fallback: ErrorKind) -> Error {
    let errno = get_errno();
    let kind = special
        .iter()
        .find(|(code, _)| *code == errno)
        .map_or(fallback, |(_, kind)| *kind);
    let err = Error::with_errno(kind, errno);
    debug!("{} failed: errno {} ({})", op, errno, err.kind());
    err
}

/// Converts a millisecond count into a `timeval`.
pub fn ms_to_timeval(ms: i32) -> libc::timeval {
    libc::timeval {
        tv_sec: (ms / 1000) as libc::time_t,
        tv_usec: ((ms % 1000) * 1000) as libc::suseconds_t,
    }
}

/// Reverse of [`ms_to_timeval`], saturating at `i32::MAX`.
pub fn timeval_to_ms(tv: &libc::timeval) -> i32 {
    let ms = (tv.tv_sec as i64) * 1000 + (tv.tv_usec as i64) / 1000;
    ms.min(i32::MAX as i64) as i32
}

/// Maps a `-v` count onto a log level: 0 warn, 1 info, 2 debug, 3+ trace.
pub fn verbosity_to_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Sets up `env_logger`.  `RUST_LOG` still wins when set.  Calling this more
/// than once is harmless.
pub fn init_logging(verbose: u8) {
    let _ = env_logger::Builder::new()
        .filter_level(verbosity_to_level(verbose))
        .parse_default_env()
        .try_init();
}
