use std::os::unix::io::RawFd;
use std::sync::Arc;

use log::{error, warn};
use parking_lot::Mutex;

use sysdefs::constants::fd_const::{
    FD_WARN_MARGIN, FILE_MODE_APPEND, FILE_MODE_READ, FILE_MODE_WRITE, FILE_PERM_USR_READ,
    FILE_PERM_USR_WRITE,
};
use sysdefs::{Error, ErrorKind, Result};

use crate::entry::FdKind;

/// The registry as handed to the socket layer: one owner creates it, every
/// layer that needs it holds a clone of the `Arc`.
pub type SharedFdTable = Arc<Mutex<FdTable>>;

// This is a fixed-size table indexed directly by the native fd.  Lookups are
// a bounds check plus a Vec index.  The table itself does no locking: all
// mutators take &mut self, and whoever shares it (see SharedFdTable) decides
// how access is serialized.

/// Descriptor registry.
#[derive(Debug, Clone)]
pub struct FdTable {
    slots: Vec<FdKind>,
    live: usize,
}

impl FdTable {
    /// An empty table with room for handles `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        FdTable {
            slots: vec![FdKind::Unused; capacity],
            live: 0,
        }
    }

    /// A table with stdin, stdout and stderr already recorded as files.
    pub fn with_stdio(capacity: usize) -> Self {
        let mut table = FdTable::new(capacity);
        let stdio = [
            (0, FILE_MODE_READ, FILE_PERM_USR_READ),
            (1, FILE_MODE_WRITE | FILE_MODE_APPEND, FILE_PERM_USR_WRITE),
            (2, FILE_MODE_WRITE | FILE_MODE_APPEND, FILE_PERM_USR_WRITE),
        ];
        for (fd, mode, perm) in stdio {
            // capacity below 3 just means fewer std entries
            let _ = table.open(
                fd,
                FdKind::File {
                    mode,
                    perm,
                    path: None,
                },
            );
        }
        table
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live (non-`Unused`) slots.
    pub fn count(&self) -> usize {
        self.live
    }

    fn index(&self, fd: RawFd) -> Result<usize> {
        match usize::try_from(fd) {
            Ok(idx) if idx < self.slots.len() => Ok(idx),
            _ => {
                error!("fd {} outside registry range 0..{}", fd, self.slots.len());
                Err(Error::new(ErrorKind::BadDescriptor))
            }
        }
    }

    /// Records `kind` for `fd`, replacing whatever was there.  Returns `fd`.
    pub fn open(&mut self, fd: RawFd, kind: FdKind) -> Result<RawFd> {
        if !kind.is_live() {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let idx = self.index(fd)?;

        // Re-using a handle value that was never closed through us (the
        // kernel recycled it) overwrites the slot without double counting.
        if !self.slots[idx].is_live() {
            self.live += 1;
        }
        self.slots[idx] = kind;

        if self.live > self.capacity().saturating_sub(FD_WARN_MARGIN) {
            warn!(
                "descriptor count {} is very close to the limit ({})",
                self.live,
                self.capacity()
            );
        }
        Ok(fd)
    }

    /// The entry for `fd`.  `None` when out of range or unused.
    pub fn get(&self, fd: RawFd) -> Option<&FdKind> {
        let idx = usize::try_from(fd).ok()?;
        self.slots.get(idx).filter(|kind| kind.is_live())
    }

    /// Clears the slot for `fd`, dropping any owned path.  Closing an unused
    /// slot is not an error and leaves the count alone.
    pub fn close(&mut self, fd: RawFd) -> Result<()> {
        let idx = self.index(fd)?;
        let old = std::mem::take(&mut self.slots[idx]);
        if old.is_live() {
            self.live -= 1;
        }
        Ok(())
    }

    /// Iterates over every live `(fd, kind)` pair, lowest fd first.
    pub fn iter(&self) -> impl Iterator<Item = (RawFd, &FdKind)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, kind)| kind.is_live())
            .map(|(idx, kind)| (idx as RawFd, kind))
    }

    /// Turns this table into the shared, lockable form the socket layer takes.
    pub fn into_shared(self) -> SharedFdTable {
        Arc::new(Mutex::new(self))
    }
}
