//! Error types for rust_mpc

use thiserror::Error;

use crate::path_tracking::mpc::SolveStatus;

/// Main error type for the MPC controller and its collaborators
#[derive(Debug, Error)]
pub enum MpcError {
    /// Configuration table rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// NaN or infinite value in the measured state or path coefficients
    #[error("Non-finite input: {0}")]
    NonFiniteInput(String),

    /// Solver finished without a usable solution
    #[error("Solve failed with status {0:?}")]
    SolveFailed(SolveStatus),

    /// Parameter file could not be read
    #[error("Cannot read the configuration file: {0}")]
    ConfigRead(#[from] std::io::Error),

    /// Parameter file could not be parsed
    #[error("Cannot parse the configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Reference polynomial fit failed
    #[error("Fit error: {0}")]
    Fit(String),

    /// Visualization error
    #[error("Visualization error: {0}")]
    Visualization(String),
}

/// Result type alias for MPC operations
pub type MpcResult<T> = Result<T, MpcError>;
