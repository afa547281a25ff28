//! Nonlinear Model Predictive Control for path tracking.
//!
//! Each control cycle solves a finite-horizon trajectory optimization over a
//! kinematic bicycle model and applies only the first actuation:
//!
//! 1. [`Layout`] partitions one flat vector into state and control blocks
//! 2. [`Bounds`] pins the measured state and limits the actuators
//! 3. [`FgEvaluator`] provides the objective and the dynamics constraints
//! 4. an [`NlpSolver`] (by default [`PanocSolver`]) runs one blocking solve
//! 5. [`MpcSolution`] extracts the first command and the predicted path
//!
//! Ref:
//!     - J. Kong, M. Pfeiffer, G. Schildbach and F. Borrelli,
//!       "Kinematic and dynamic vehicle models for autonomous driving control design"

pub mod bounds;
pub mod config;
pub mod dynamics;
pub mod evaluator;
pub mod layout;
pub mod solution;
pub mod solver;

pub use bounds::{initial_guess, Bounds};
pub use config::{
    ActuatorLimits, CostWeights, HorizonConfig, MpcConfig, SolverOptions, VehicleParams,
};
pub use dynamics::BicycleModel;
pub use evaluator::{Evaluation, FgEvaluator};
pub use layout::{Block, ControlVar, Layout, StateVar};
pub use solution::MpcSolution;
pub use solver::{PanocSolver, SolveResult, SolveStatus};

use log::debug;

use crate::common::{MpcError, MpcResult, NlpSolver, PathCoefficients, VehicleState};

/// Receding-horizon controller.
///
/// Stateless between calls: every solve starts from the same deterministic
/// initial guess built from the measured state.
#[derive(Debug, Clone)]
pub struct ModelPredictiveController<S: NlpSolver = PanocSolver> {
    config: MpcConfig,
    layout: Layout,
    solver: S,
}

impl ModelPredictiveController<PanocSolver> {
    /// Controller backed by the default PANOC solver
    pub fn new(config: MpcConfig) -> MpcResult<Self> {
        Self::with_solver(config, PanocSolver::new())
    }
}

impl<S: NlpSolver> ModelPredictiveController<S> {
    /// Controller backed by a custom NLP solver
    pub fn with_solver(config: MpcConfig, solver: S) -> MpcResult<Self> {
        config.validate()?;
        Ok(Self {
            layout: Layout::new(config.horizon.steps),
            config,
            solver,
        })
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn model(&self) -> BicycleModel {
        BicycleModel::new(self.config.vehicle.lf, self.config.horizon.dt)
    }

    /// Evaluator for the given path, the function the solver iterates on
    pub fn evaluator(&self, coeffs: PathCoefficients) -> FgEvaluator<'_> {
        FgEvaluator::new(
            &self.layout,
            self.model(),
            &self.config.weights,
            self.config.ref_speed,
            coeffs,
        )
    }

    /// Bounds for a solve from `state`
    pub fn bounds(&self, state: &VehicleState) -> Bounds {
        Bounds::build(&self.layout, &self.config.limits, state)
    }

    /// Run one solve and return the raw result.
    ///
    /// Non-finite inputs are rejected up front. Any other trouble is reported
    /// through [`SolveResult::status`], which callers must check.
    pub fn solve(
        &self,
        state: &VehicleState,
        coeffs: &PathCoefficients,
    ) -> MpcResult<SolveResult> {
        if !state.is_finite() {
            return Err(MpcError::NonFiniteInput(format!("vehicle state {:?}", state)));
        }
        if !coeffs.is_finite() {
            return Err(MpcError::NonFiniteInput(format!(
                "path coefficients {:?}",
                coeffs.as_slice()
            )));
        }

        let evaluator = self.evaluator(*coeffs);
        let bounds = self.bounds(state);
        let guess = initial_guess(&self.layout, state);
        let result = self
            .solver
            .solve(&evaluator, &guess, &bounds, &self.config.solver);

        debug!(
            "MPC solve {:?}: cost {:.4} in {:?}",
            result.status, result.objective, result.solve_time
        );
        Ok(result)
    }

    /// Solve and extract the first-step command
    pub fn compute(
        &self,
        state: &VehicleState,
        coeffs: &PathCoefficients,
    ) -> MpcResult<MpcSolution> {
        let result = self.solve(state, coeffs)?;
        MpcSolution::from_result(&result, &self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ShootingEvaluator, NlpEvaluator, NlpSolver};
    use approx::assert_abs_diff_eq;
    use std::time::Duration;

    fn controller() -> ModelPredictiveController {
        ModelPredictiveController::new(MpcConfig::default()).unwrap()
    }

    fn assert_feasible(
        controller: &ModelPredictiveController,
        result: &SolveResult,
        state: &VehicleState,
        coeffs: &PathCoefficients,
    ) {
        let layout = controller.layout();
        let bounds = controller.bounds(state);
        let tol = controller.config().solver.acceptable_tolerance;

        let mut g = vec![0.0; layout.n_constraints()];
        controller.evaluator(*coeffs).constraints(&result.x, &mut g);
        assert!(
            bounds.max_violation(&g) <= tol,
            "violation {}",
            bounds.max_violation(&g)
        );
        assert_eq!(layout.state_at(&result.x, 0), *state);

        let limits = &controller.config().limits;
        for t in 0..layout.control_steps() {
            let u = layout.control_at(&result.x, t);
            assert!(u.steering.abs() <= limits.steering + 1e-12);
            assert!(u.acceleration.abs() <= limits.acceleration + 1e-12);
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = MpcConfig::default();
        config.horizon.steps = 1;
        assert!(matches!(
            ModelPredictiveController::new(config),
            Err(MpcError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_non_finite_inputs() {
        let controller = controller();
        let coeffs = PathCoefficients::new(0.0, f64::NAN, 0.0, 0.0);
        assert!(matches!(
            controller.solve(&VehicleState::default(), &coeffs),
            Err(MpcError::NonFiniteInput(_))
        ));

        let mut state = VehicleState::default();
        state.v = f64::INFINITY;
        assert!(matches!(
            controller.compute(&state, &PathCoefficients::straight()),
            Err(MpcError::NonFiniteInput(_))
        ));
    }

    #[test]
    fn test_straight_path_from_rest() {
        let controller = controller();
        let state = VehicleState::default();
        let coeffs = PathCoefficients::straight();
        let result = controller.solve(&state, &coeffs).unwrap();
        assert!(result.status.is_usable(), "status {:?}", result.status);
        assert_feasible(&controller, &result, &state, &coeffs);

        let solution = MpcSolution::from_result(&result, controller.layout()).unwrap();
        assert!(solution.steering.abs() < 0.05, "steering {}", solution.steering);
        assert!(solution.acceleration > 0.0, "acceleration {}", solution.acceleration);
        assert_eq!(solution.predicted.len(), 20);
        assert!(solution.predicted.iter().all(|p| p.y.abs() < 0.1));
        assert_eq!(solution.to_vec().len(), 2 + 2 * 20);
    }

    #[test]
    fn test_dynamics_residuals_vanish_at_solution() {
        let controller = controller();
        let state = VehicleState::new(0.0, 0.0, 0.0, 5.0, 0.0, 0.0);
        let coeffs = PathCoefficients::straight();
        let result = controller.solve(&state, &coeffs).unwrap();
        assert!(result.status.is_usable(), "status {:?}", result.status);
        assert_feasible(&controller, &result, &state, &coeffs);

        let layout = controller.layout();
        let model = controller.model();
        let tol = controller.config().solver.constraint_tolerance;
        for t in 1..layout.steps() {
            let predicted = model
                .predict(
                    &layout.state_at(&result.x, t - 1),
                    &layout.control_at(&result.x, t - 1),
                    &coeffs,
                )
                .to_vector();
            let actual = layout.state_at(&result.x, t).to_vector();
            for k in 0..Layout::STATE_DIM {
                assert_abs_diff_eq!(actual[k], predicted[k], epsilon = tol);
            }
        }
    }

    #[test]
    fn test_nonzero_cte_from_rest_is_feasible() {
        let controller = controller();
        let coeffs = PathCoefficients::new(1.0, 0.0, 0.0, 0.0);
        let state = VehicleState::new(0.0, 0.0, 0.0, 0.0, 1.0, 0.0);
        let result = controller.solve(&state, &coeffs).unwrap();
        assert!(result.status.is_usable(), "status {:?}", result.status);
        assert_feasible(&controller, &result, &state, &coeffs);

        let solution = MpcSolution::from_result(&result, controller.layout()).unwrap();
        assert!(solution.steering.abs() <= 0.436332 + 1e-12);
        assert!(solution.acceleration > 0.0);
    }

    #[test]
    fn test_cruising_near_reference_speed() {
        let controller = controller();
        let coeffs = PathCoefficients::new(-0.28, 0.01, 1e-4, -1e-6);
        let state = VehicleState::new(0.0, 0.0, 0.0, 21.96, -0.28, -0.01);
        let result = controller.solve(&state, &coeffs).unwrap();
        assert!(result.status.is_usable(), "status {:?}", result.status);
        assert_feasible(&controller, &result, &state, &coeffs);
        assert!(result.optimality <= controller.config().solver.acceptable_optimality);
    }

    #[test]
    fn test_weights_do_not_change_feasibility() {
        let state = VehicleState::new(0.0, 0.0, 0.0, 3.0, 0.5, 0.05);
        let coeffs = PathCoefficients::new(0.5, 0.05, 0.0, 0.0);

        let base = controller();
        let mut config = MpcConfig::default();
        config.weights.steering = 100.0;
        config.weights.steering_rate = 500.0;
        config.weights.cte = 10.0;
        let retuned = ModelPredictiveController::new(config).unwrap();

        let a = base.solve(&state, &coeffs).unwrap();
        let b = retuned.solve(&state, &coeffs).unwrap();
        assert!(a.status.is_usable(), "status {:?}", a.status);
        assert!(b.status.is_usable(), "status {:?}", b.status);
        assert_feasible(&base, &a, &state, &coeffs);
        assert_feasible(&retuned, &b, &state, &coeffs);

        // bounds do not depend on weights at all
        assert_eq!(base.bounds(&state), retuned.bounds(&state));
    }

    #[test]
    fn test_dense_jacobian_path_solves() {
        let mut config = MpcConfig::default();
        config.horizon.steps = 8;
        config.solver.sparse_jacobian = false;
        let controller = ModelPredictiveController::new(config).unwrap();
        let solution = controller
            .compute(&VehicleState::default(), &PathCoefficients::straight())
            .unwrap();
        assert!(solution.acceleration > 0.0);
    }

    #[test]
    fn test_shortest_time_cap_returns_a_status() {
        let mut config = MpcConfig::default();
        config.solver.max_cpu_time = 1e-3;
        let controller = ModelPredictiveController::new(config).unwrap();
        let state = VehicleState::new(0.0, 0.0, 0.0, 10.0, 0.4, 0.1);
        let coeffs = PathCoefficients::new(0.4, 0.1, 0.01, 0.0);
        let result = controller.solve(&state, &coeffs).unwrap();
        assert_eq!(result.x.len(), controller.layout().n_vars());
        if result.status.is_usable() {
            assert_feasible(&controller, &result, &state, &coeffs);
        }
    }

    /// Backend that never converges, for exercising failure propagation
    struct StalledSolver;

    impl NlpSolver for StalledSolver {
        fn solve<E: ShootingEvaluator>(
            &self,
            evaluator: &E,
            initial_guess: &[f64],
            _bounds: &Bounds,
            _options: &SolverOptions,
        ) -> SolveResult {
            SolveResult {
                status: SolveStatus::MaxCpuTimeExceeded,
                objective: evaluator.objective(initial_guess),
                x: initial_guess.to_vec(),
                constraint_violation: 1.0,
                optimality: 1.0,
                iterations: 1,
                solve_time: Duration::from_millis(500),
            }
        }
    }

    #[test]
    fn test_failed_solve_is_not_extracted() {
        let controller =
            ModelPredictiveController::with_solver(MpcConfig::default(), StalledSolver).unwrap();
        let state = VehicleState::new(0.0, 0.0, 0.0, 10.0, 0.2, 0.0);
        let result = controller.solve(&state, &PathCoefficients::straight()).unwrap();
        assert_eq!(result.status, SolveStatus::MaxCpuTimeExceeded);
        assert!(matches!(
            controller.compute(&state, &PathCoefficients::straight()),
            Err(MpcError::SolveFailed(SolveStatus::MaxCpuTimeExceeded))
        ));
    }

    #[test]
    fn test_overflowing_path_fails_cleanly() {
        let controller = controller();
        let coeffs = PathCoefficients::new(0.0, 0.0, 0.0, 1.0e308);
        let state = VehicleState::new(0.0, 0.0, 0.0, 20.0, 0.0, 0.0);
        let result = controller.solve(&state, &coeffs).unwrap();
        assert!(!result.status.is_usable(), "status {:?}", result.status);
        assert!(controller.compute(&state, &coeffs).is_err());
    }
}
