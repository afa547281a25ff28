//! Common traits defining the seams between the controller and its collaborators

use nalgebra::{DMatrix, DVector};

use crate::path_tracking::mpc::{Bounds, SolveResult, SolverOptions};

/// Trait for vehicle motion models
pub trait MotionModel {
    /// State type
    type State;
    /// Control type
    type Control;
    /// Reference the state is measured against (e.g. a fitted path)
    type Reference;

    /// Propagate state forward by one model step
    fn propagate(
        &self,
        state: &Self::State,
        control: &Self::Control,
        reference: &Self::Reference,
    ) -> Self::State;
}

/// Objective and constraint evaluation for a nonlinear program.
///
/// Implementations must be pure: the solver calls every method many times per
/// solve, in any order, with arbitrary points inside the variable bounds.
pub trait NlpEvaluator {
    /// Length of the optimization vector
    fn n_vars(&self) -> usize;

    /// Length of the constraint vector
    fn n_constraints(&self) -> usize;

    /// Scalar objective at `x`
    fn objective(&self, x: &[f64]) -> f64;

    /// Constraint values `g(x)` written into `g`
    fn constraints(&self, x: &[f64], g: &mut [f64]);

    /// Gradient of the objective written into `grad`
    fn objective_gradient(&self, x: &[f64], grad: &mut [f64]);

    /// Dense constraint Jacobian, `n_constraints x n_vars`
    fn constraints_jacobian(&self, x: &[f64]) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.n_constraints(), self.n_vars());
        for &(row, col, value) in self.jacobian_entries(x).iter() {
            jac[(row, col)] += value;
        }
        jac
    }

    /// Nonzero Jacobian entries `(row, col, value)` at `x`
    fn jacobian_entries(&self, x: &[f64]) -> Vec<(usize, usize, f64)>;

    /// `J(x)^T d` written into `out` without forming the dense Jacobian
    fn jacobian_transpose_product(&self, x: &[f64], d: &[f64], out: &mut [f64]) {
        out.iter_mut().for_each(|o| *o = 0.0);
        for (row, col, value) in self.jacobian_entries(x) {
            out[col] += value * d[row];
        }
    }

    /// Structural nonzero pattern of the constraint Jacobian
    fn jacobian_sparsity(&self) -> Vec<(usize, usize)>;
}

/// Program whose equality rows determine the leading variables.
///
/// The first `n_constraints` entries of the optimization vector are fixed by
/// the constraints once the trailing `n_free()` entries are chosen, so a
/// solver may search over the trailing block alone.
pub trait ShootingEvaluator: NlpEvaluator {
    /// Number of trailing variables left free by the constraints
    fn n_free(&self) -> usize {
        self.n_vars() - self.n_constraints()
    }

    /// Overwrite the dependent entries of `x` so that every row holds,
    /// keeping its initial-condition entries and its free tail.
    fn rollout(&self, x: &mut [f64]);

    /// Gradient of the objective along the constraint manifold with respect
    /// to the free tail, `x` already rolled out. Written into `grad`
    /// (length `n_free()`).
    fn reduced_gradient(&self, x: &[f64], grad: &mut [f64]);

    /// Same as [`reduced_gradient`](Self::reduced_gradient) from the dense
    /// Jacobian: `grad_u f - G_u^T lambda` with `G_x^T lambda = grad_x f`.
    fn dense_reduced_gradient(&self, x: &[f64], grad: &mut [f64]) {
        let n_dep = self.n_constraints();
        let jac = self.constraints_jacobian(x);
        let mut full = vec![0.0; self.n_vars()];
        self.objective_gradient(x, &mut full);

        let rhs = DVector::from_column_slice(&full[..n_dep]);
        let multipliers = match jac.columns(0, n_dep).transpose().lu().solve(&rhs) {
            Some(m) => m,
            None => {
                grad.iter_mut().for_each(|g| *g = f64::NAN);
                return;
            }
        };
        // the free tail of J^T lambda is G_u^T lambda
        let mut correction = vec![0.0; self.n_vars()];
        self.jacobian_transpose_product(x, multipliers.as_slice(), &mut correction);
        for (g, (f, c)) in grad.iter_mut().zip(full[n_dep..].iter().zip(&correction[n_dep..])) {
            *g = f - c;
        }
    }
}

/// Generic nonlinear program solver
pub trait NlpSolver {
    /// Run one blocking solve starting from `initial_guess`.
    ///
    /// Never panics on solver trouble: every outcome is reported through
    /// [`SolveResult::status`].
    fn solve<E: ShootingEvaluator>(
        &self,
        evaluator: &E,
        initial_guess: &[f64],
        bounds: &Bounds,
        options: &SolverOptions,
    ) -> SolveResult;
}
