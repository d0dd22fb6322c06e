pub mod mcast_calls;
pub mod net_calls;
pub mod select_calls;

pub use net_calls::SocketLayer;
pub use select_calls::{select, FdSet};
