//! Descriptor registry sizing and the file mode/permission bits recorded
//! for file entries.

/// Default registry capacity.
pub const FD_MAX: usize = 4096;

/// Once fewer than this many slots remain free, every open logs a warning.
pub const FD_WARN_MARGIN: usize = 10;

// File open modes, as recorded in a registry entry.
pub const FILE_MODE_READ: u32 = 0x00001;
pub const FILE_MODE_WRITE: u32 = 0x00002;
pub const FILE_MODE_CREATE: u32 = 0x00004;
pub const FILE_MODE_APPEND: u32 = 0x00008;
pub const FILE_MODE_TRUNCATE: u32 = 0x00010;
pub const FILE_MODE_NONBLOCK: u32 = 0x00100;

// Permission bits (octal, same layout as st_mode).
pub const FILE_PERM_USR_READ: u32 = 0o400;
pub const FILE_PERM_USR_WRITE: u32 = 0o200;
