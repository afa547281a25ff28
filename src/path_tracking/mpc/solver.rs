//! NLP backend adapter.
//!
//! [`PanocSolver`] condenses the program to single shooting and hands it to
//! `optimization_engine`'s PANOC:
//!
//! - the decision vector is the control tail only, boxed by the actuator limits,
//! - every cost evaluation rolls the controls forward from the measured state,
//!   so all dynamics rows hold by construction,
//! - the gradient is the reduced gradient along that rollout.
//!
//! The backend outcome is folded into a [`SolveStatus`] so callers never have
//! to guess whether the returned vector is usable.

use std::time::{Duration, Instant};

use log::{debug, warn};
use optimization_engine::constraints::Rectangle;
use optimization_engine::core::ExitStatus;
use optimization_engine::panoc::{PANOCCache, PANOCOptimizer};
use optimization_engine::{FunctionCallResult, Problem, SolverError};

use super::bounds::Bounds;
use super::config::SolverOptions;
use crate::common::{NlpSolver, ShootingEvaluator};

/// Convergence outcome of one solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Converged, constraints satisfied within tolerance
    Success,
    /// Converged loosely, or interrupted at a point that meets both acceptable tolerances
    SolvedToAcceptableLevel,
    /// Wall-clock cap reached before an acceptable point was found
    MaxCpuTimeExceeded,
    /// Iteration limit reached before an acceptable point was found
    MaximumIterationsExceeded,
    /// Converged to a point that does not satisfy the constraints
    LocalInfeasibility,
    /// Non-finite value during evaluation, or a backend failure
    NumericalError,
}

impl SolveStatus {
    /// Whether the solution vector may be used to actuate the vehicle
    pub fn is_usable(&self) -> bool {
        matches!(self, SolveStatus::Success | SolveStatus::SolvedToAcceptableLevel)
    }
}

/// Outcome of one solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    pub status: SolveStatus,
    /// Objective at `x`
    pub objective: f64,
    /// Full optimization vector, last iterate
    pub x: Vec<f64>,
    /// Largest constraint row residual at `x`
    pub constraint_violation: f64,
    /// Fixed-point residual norm of the last iterate, the optimality measure
    pub optimality: f64,
    pub iterations: usize,
    pub solve_time: Duration,
}

impl SolveResult {
    /// Result for a solve the backend could not complete
    pub fn failed(status: SolveStatus, x: Vec<f64>, solve_time: Duration) -> Self {
        Self {
            status,
            objective: f64::NAN,
            x,
            constraint_violation: f64::INFINITY,
            optimality: f64::INFINITY,
            iterations: 0,
            solve_time,
        }
    }
}

/// Map a backend exit status, the final constraint violation and the final
/// fixed-point residual to a [`SolveStatus`]
pub fn classify(
    exit: ExitStatus,
    violation: f64,
    optimality: f64,
    options: &SolverOptions,
) -> SolveStatus {
    if !violation.is_finite() || optimality.is_nan() {
        return SolveStatus::NumericalError;
    }
    let acceptable = violation <= options.acceptable_tolerance
        && optimality <= options.acceptable_optimality;
    match exit {
        ExitStatus::Converged if violation <= options.constraint_tolerance => SolveStatus::Success,
        ExitStatus::Converged if violation <= options.acceptable_tolerance => {
            SolveStatus::SolvedToAcceptableLevel
        }
        ExitStatus::Converged => SolveStatus::LocalInfeasibility,
        _ if acceptable => SolveStatus::SolvedToAcceptableLevel,
        ExitStatus::NotConvergedOutOfTime => SolveStatus::MaxCpuTimeExceeded,
        _ => SolveStatus::MaximumIterationsExceeded,
    }
}

fn check_finite(values: &[f64]) -> FunctionCallResult {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SolverError::NotFiniteComputation("non-finite cost or gradient"))
    }
}

/// Single-shooting PANOC backend
#[derive(Debug, Clone, Copy, Default)]
pub struct PanocSolver;

impl PanocSolver {
    pub fn new() -> Self {
        PanocSolver
    }
}

impl NlpSolver for PanocSolver {
    fn solve<E: ShootingEvaluator>(
        &self,
        evaluator: &E,
        initial_guess: &[f64],
        bounds: &Bounds,
        options: &SolverOptions,
    ) -> SolveResult {
        let n_vars = evaluator.n_vars();
        let free_start = evaluator.n_constraints();
        debug_assert_eq!(initial_guess.len(), n_vars);
        debug_assert_eq!(bounds.n_vars(), n_vars);
        debug_assert_eq!(bounds.n_constraints(), free_start);

        let mut seed = initial_guess.to_vec();
        bounds.project(&mut seed);

        let expand = |u: &[f64]| -> Vec<f64> {
            let mut x = seed.clone();
            x[free_start..].copy_from_slice(u);
            evaluator.rollout(&mut x);
            x
        };
        let sparse = options.sparse_jacobian;
        let cost = |u: &[f64], c: &mut f64| -> FunctionCallResult {
            *c = evaluator.objective(&expand(u));
            check_finite(std::slice::from_ref(c))
        };
        let gradient = |u: &[f64], grad: &mut [f64]| -> FunctionCallResult {
            let x = expand(u);
            if sparse {
                evaluator.reduced_gradient(&x, grad);
            } else {
                evaluator.dense_reduced_gradient(&x, grad);
            }
            check_finite(grad)
        };

        let control_box = Rectangle::new(
            Some(&bounds.var_lower[free_start..]),
            Some(&bounds.var_upper[free_start..]),
        );
        let problem = Problem::new(&control_box, gradient, cost);
        let mut cache = PANOCCache::new(evaluator.n_free(), options.tolerance, options.lbfgs_memory);
        let mut optimizer = PANOCOptimizer::new(problem, &mut cache)
            .with_max_iter(options.max_iterations)
            .with_max_duration(options.max_duration());

        let mut u = seed[free_start..].to_vec();
        let started = Instant::now();
        let outcome = optimizer.solve(&mut u);
        let elapsed = started.elapsed();

        let status = match outcome {
            Ok(status) => status,
            Err(e) => {
                warn!("NLP backend failed after {:?}: {:?}", elapsed, e);
                return SolveResult::failed(SolveStatus::NumericalError, expand(&u), elapsed);
            }
        };

        let x = expand(&u);
        let mut g = vec![0.0; free_start];
        evaluator.constraints(&x, &mut g);
        let violation = bounds.max_violation(&g);
        let objective = evaluator.objective(&x);
        let optimality = status.norm_fpr();
        let solve_status = if objective.is_finite() {
            classify(status.exit_status(), violation, optimality, options)
        } else {
            SolveStatus::NumericalError
        };

        debug!(
            "PANOC exit {:?} -> {:?}: cost {:.4}, fpr {:.3e}, violation {:.3e}, {} iterations in {:?}",
            status.exit_status(),
            solve_status,
            objective,
            optimality,
            violation,
            status.iterations(),
            elapsed,
        );
        if !solve_status.is_usable() {
            warn!("Solve ended with status {:?}", solve_status);
        }

        SolveResult {
            status: solve_status,
            objective,
            x,
            constraint_violation: violation,
            optimality,
            iterations: status.iterations(),
            solve_time: elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_converged() {
        let options = SolverOptions::default();
        assert_eq!(
            classify(ExitStatus::Converged, 0.0, 1e-6, &options),
            SolveStatus::Success
        );
        assert_eq!(
            classify(ExitStatus::Converged, 5e-3, 1e-6, &options),
            SolveStatus::SolvedToAcceptableLevel
        );
        assert_eq!(
            classify(ExitStatus::Converged, 1.0, 1e-6, &options),
            SolveStatus::LocalInfeasibility
        );
    }

    #[test]
    fn test_classify_interrupted() {
        let options = SolverOptions::default();
        assert_eq!(
            classify(ExitStatus::NotConvergedOutOfTime, 1e-3, 1e-3, &options),
            SolveStatus::SolvedToAcceptableLevel
        );
        assert_eq!(
            classify(ExitStatus::NotConvergedOutOfTime, 1.0, 1e-3, &options),
            SolveStatus::MaxCpuTimeExceeded
        );
        assert_eq!(
            classify(ExitStatus::NotConvergedIterations, 1.0, 1e-3, &options),
            SolveStatus::MaximumIterationsExceeded
        );
    }

    #[test]
    fn test_timeout_before_first_iteration() {
        // no residual has been computed yet
        let options = SolverOptions::default();
        assert_eq!(
            classify(ExitStatus::NotConvergedOutOfTime, 0.0, f64::INFINITY, &options),
            SolveStatus::MaxCpuTimeExceeded
        );
    }

    #[test]
    fn test_interrupted_feasible_but_not_optimal_is_rejected() {
        let options = SolverOptions::default();
        let far_from_optimal = options.acceptable_optimality * 10.0;
        assert_eq!(
            classify(ExitStatus::NotConvergedOutOfTime, 0.0, far_from_optimal, &options),
            SolveStatus::MaxCpuTimeExceeded
        );
        assert_eq!(
            classify(ExitStatus::NotConvergedIterations, 0.0, far_from_optimal, &options),
            SolveStatus::MaximumIterationsExceeded
        );
        assert_eq!(
            classify(ExitStatus::NotConvergedIterations, 0.0, f64::INFINITY, &options),
            SolveStatus::MaximumIterationsExceeded
        );
    }

    #[test]
    fn test_classify_non_finite() {
        let options = SolverOptions::default();
        assert_eq!(
            classify(ExitStatus::Converged, f64::NAN, 0.0, &options),
            SolveStatus::NumericalError
        );
        assert_eq!(
            classify(ExitStatus::Converged, f64::INFINITY, 0.0, &options),
            SolveStatus::NumericalError
        );
        assert_eq!(
            classify(ExitStatus::NotConvergedOutOfTime, 0.0, f64::NAN, &options),
            SolveStatus::NumericalError
        );
    }

    #[test]
    fn test_usable_statuses() {
        assert!(SolveStatus::Success.is_usable());
        assert!(SolveStatus::SolvedToAcceptableLevel.is_usable());
        assert!(!SolveStatus::MaxCpuTimeExceeded.is_usable());
        assert!(!SolveStatus::MaximumIterationsExceeded.is_usable());
        assert!(!SolveStatus::LocalInfeasibility.is_usable());
        assert!(!SolveStatus::NumericalError.is_usable());
    }

    #[test]
    fn test_check_finite() {
        assert!(check_finite(&[0.0, 1.0]).is_ok());
        assert!(check_finite(&[0.0, f64::NAN]).is_err());
        assert!(check_finite(&[f64::NEG_INFINITY]).is_err());
    }
}
