pub mod err_const;
pub mod fd_const;
pub mod net_const;
pub mod poll_const;

pub use err_const::*;
pub use fd_const::*;
pub use net_const::*;
pub use poll_const::*;
