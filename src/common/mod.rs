//! Common types, traits, and error definitions for rust_mpc
//!
//! Vehicle state and path representations, the solver seam, and the crate
//! error type.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
