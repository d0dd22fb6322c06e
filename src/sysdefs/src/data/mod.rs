pub mod net_struct;

pub use net_struct::*;
