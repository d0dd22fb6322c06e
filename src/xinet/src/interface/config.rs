//! Runtime configuration.
//!
//! Everything has a default, so a config file only needs the fields it
//! changes:
//!
//! ```json
//! { "fd_capacity": 1024, "pollset": { "backend": "poll", "use_lock": true } }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use fdregistry::{FdTable, FD_MAX};
use sysdefs::constants::net_const::DEFAULT_BACKLOG;
use sysdefs::constants::poll_const::PollsetOptions;
use sysdefs::{Error, ErrorKind, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XiConfig {
    /// Registry slots; descriptor values at or above this are rejected.
    pub fd_capacity: usize,
    /// Registrations per pollset, and events per poll call.
    pub pollset_capacity: usize,
    pub pollset: PollsetOptions,
    pub listen_backlog: i32,
}

impl Default for XiConfig {
    fn default() -> Self {
        XiConfig {
            fd_capacity: FD_MAX,
            pollset_capacity: 64,
            pollset: PollsetOptions::default(),
            listen_backlog: DEFAULT_BACKLOG,
        }
    }
}

impl XiConfig {
    /// Parses a JSON document.  Malformed input is `ArgsInvalid`.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            log::error!("bad config: {}", e);
            Error::new(ErrorKind::ArgsInvalid)
        })
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            log::error!("cannot read config {}: {}", path.as_ref().display(), e);
            match e.raw_os_error() {
                Some(errno) => Error::from_errno(errno),
                None => Error::new(ErrorKind::ArgsInvalid),
            }
        })?;
        Self::from_json_str(&text)
    }

    /// A registry sized per this config, with stdio pre-registered.
    pub fn new_fdtable(&self) -> FdTable {
        FdTable::with_stdio(self.fd_capacity)
    }
}
