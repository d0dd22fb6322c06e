//! Definitions shared by the registry, the socket layer and the pollset.
//!
//! `constants` holds the portable enum values and their translation to the
//! native (libc) constants, the poll event bits and the error taxonomy.
//! `data` holds the portable socket address and its conversion to and from
//! the native `sockaddr_*` structures.

pub mod constants;
pub mod data;

pub use constants::err_const::{Error, ErrorKind, Result};
