//! rust_mpc - Nonlinear model predictive control for vehicle path tracking
//!
//! A kinematic bicycle model is optimized over a receding horizon to follow a
//! cubic reference path fitted in the vehicle frame.

// Core modules
pub mod common;
pub mod utils;

// Algorithm modules
pub mod path_tracking;

// Re-export common types for convenience
pub use common::{Actuation, PathCoefficients, Point2D, Pose2D, VehicleState};
pub use common::{MotionModel, NlpEvaluator, NlpSolver, ShootingEvaluator};
pub use common::{MpcError, MpcResult};
pub use path_tracking::mpc::{ModelPredictiveController, MpcConfig, MpcSolution, SolveStatus};
