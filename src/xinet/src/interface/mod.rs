// Interface helpers shared by the syscall wrappers and the pollset.
pub mod config;
pub mod misc;

pub use config::XiConfig;
pub use misc::*;
