// Path tracking module

pub mod mpc;
pub mod reference_path;

pub use mpc::*;
pub use reference_path::*;
