//! Utility modules for rust_mpc

pub mod logger;
pub mod visualization;

pub use visualization::{colors, PathStyle, PointStyle, TrackingPlot};
