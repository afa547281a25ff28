//! Configuration table for the MPC controller.
//!
//! Every tunable constant lives here; the other components receive the
//! relevant section by reference. Values can be loaded from a TOML file, any
//! missing section falling back to [`Default`].

use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::common::{MpcError, MpcResult};

/// 50 mph in m/s
pub const DEFAULT_REF_SPEED: f64 = 50.0 * 0.44704;

/// Shortest accepted wall-clock cap per solve
pub const MIN_CPU_TIME: Duration = Duration::from_millis(1);
/// Longest accepted wall-clock cap per solve
pub const MAX_CPU_TIME_LIMIT: Duration = Duration::from_secs(3600);

/// Discretization of the prediction horizon
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct HorizonConfig {
    /// Number of timesteps N
    pub steps: usize,
    /// Duration of one timestep [s]
    pub dt: f64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self { steps: 20, dt: 0.1 }
    }
}

/// Calibrated vehicle geometry
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct VehicleParams {
    /// Distance from the center of gravity to the front axle [m].
    ///
    /// Tuned so that the model's turning radius at constant steering matches
    /// the one measured on the vehicle.
    pub lf: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self { lf: 2.67 }
    }
}

/// Symmetric variable bounds
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ActuatorLimits {
    /// Steering magnitude bound [rad], 25 degrees by default
    pub steering: f64,
    /// Normalized throttle/brake magnitude bound
    pub acceleration: f64,
    /// Magnitude used for state variables, large enough to act as "no bound"
    pub state: f64,
}

impl Default for ActuatorLimits {
    fn default() -> Self {
        Self {
            steering: 0.436332,
            acceleration: 1.0,
            state: 1.0e19,
        }
    }
}

/// Cost function weights
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub cte: f64,
    pub epsi: f64,
    pub speed: f64,
    pub steering: f64,
    pub acceleration: f64,
    pub steering_rate: f64,
    pub acceleration_rate: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cte: 1.0,
            epsi: 1.0,
            speed: 1.0,
            steering: 15000.0,
            acceleration: 1.0,
            steering_rate: 50000.0,
            acceleration_rate: 1.0,
        }
    }
}

impl CostWeights {
    fn as_array(&self) -> [f64; 7] {
        [
            self.cte,
            self.epsi,
            self.speed,
            self.steering,
            self.acceleration,
            self.steering_rate,
            self.acceleration_rate,
        ]
    }
}

/// Numeric and time options handed to the NLP backend
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Hard wall-clock cap on one solve [s]
    pub max_cpu_time: f64,
    /// Fixed-point residual at which PANOC reports convergence
    pub tolerance: f64,
    /// Max row violation for a converged solve to count as a success
    pub constraint_tolerance: f64,
    /// Max row violation for an interrupted solve to still be usable
    pub acceptable_tolerance: f64,
    /// Max fixed-point residual for an interrupted solve to still be usable
    pub acceptable_optimality: f64,
    pub max_iterations: usize,
    pub lbfgs_memory: usize,
    /// Reduced gradient from the adjoint sweep instead of the dense Jacobian
    pub sparse_jacobian: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_cpu_time: 0.5,
            tolerance: 1e-4,
            constraint_tolerance: 1e-4,
            acceptable_tolerance: 1e-2,
            acceptable_optimality: 1e-2,
            max_iterations: 5000,
            lbfgs_memory: 10,
            sparse_jacobian: true,
        }
    }
}

impl SolverOptions {
    pub fn max_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_cpu_time).unwrap_or(MAX_CPU_TIME_LIMIT)
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MpcConfig {
    pub horizon: HorizonConfig,
    pub vehicle: VehicleParams,
    /// Speed the tracking cost pulls towards [m/s]
    pub ref_speed: f64,
    pub limits: ActuatorLimits,
    pub weights: CostWeights,
    pub solver: SolverOptions,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            horizon: HorizonConfig::default(),
            vehicle: VehicleParams::default(),
            ref_speed: DEFAULT_REF_SPEED,
            limits: ActuatorLimits::default(),
            weights: CostWeights::default(),
            solver: SolverOptions::default(),
        }
    }
}

impl MpcConfig {
    /// Parse and validate a TOML configuration
    pub fn from_toml_str(s: &str) -> MpcResult<Self> {
        let config: MpcConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> MpcResult<Self> {
        let contents = read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> MpcResult<()> {
        fn positive(name: &str, value: f64) -> MpcResult<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(MpcError::InvalidConfig(format!(
                    "{} must be finite and positive, found {}",
                    name, value
                )))
            }
        }

        if self.horizon.steps < 2 {
            return Err(MpcError::InvalidConfig(format!(
                "horizon.steps must be at least 2, found {}",
                self.horizon.steps
            )));
        }
        positive("horizon.dt", self.horizon.dt)?;
        positive("vehicle.lf", self.vehicle.lf)?;
        positive("limits.steering", self.limits.steering)?;
        positive("limits.acceleration", self.limits.acceleration)?;
        positive("limits.state", self.limits.state)?;
        positive("solver.max_cpu_time", self.solver.max_cpu_time)?;
        let cap = self.solver.max_cpu_time;
        if cap < MIN_CPU_TIME.as_secs_f64() || cap > MAX_CPU_TIME_LIMIT.as_secs_f64() {
            return Err(MpcError::InvalidConfig(format!(
                "solver.max_cpu_time must lie in [{}, {}] s, found {}",
                MIN_CPU_TIME.as_secs_f64(),
                MAX_CPU_TIME_LIMIT.as_secs_f64(),
                cap
            )));
        }
        positive("solver.tolerance", self.solver.tolerance)?;
        positive("solver.constraint_tolerance", self.solver.constraint_tolerance)?;
        positive("solver.acceptable_tolerance", self.solver.acceptable_tolerance)?;
        positive("solver.acceptable_optimality", self.solver.acceptable_optimality)?;

        if !self.ref_speed.is_finite() {
            return Err(MpcError::InvalidConfig("ref_speed must be finite".to_string()));
        }
        if self
            .weights
            .as_array()
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(MpcError::InvalidConfig(
                "cost weights must be finite and non-negative".to_string(),
            ));
        }
        if self.solver.acceptable_tolerance < self.solver.constraint_tolerance {
            return Err(MpcError::InvalidConfig(
                "solver.acceptable_tolerance must not be tighter than solver.constraint_tolerance"
                    .to_string(),
            ));
        }
        if self.solver.acceptable_optimality < self.solver.tolerance {
            return Err(MpcError::InvalidConfig(
                "solver.acceptable_optimality must not be tighter than solver.tolerance"
                    .to_string(),
            ));
        }
        if self.solver.max_iterations == 0 || self.solver.lbfgs_memory == 0 {
            return Err(MpcError::InvalidConfig(
                "solver.max_iterations and solver.lbfgs_memory must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
