//! Objective and constraint evaluation over the flat optimization vector.
//!
//! Objective:
//!
//! ```text
//!   sum_{t<N}   w_cte cte_t^2 + w_epsi epsi_t^2 + w_v (v_t - v_ref)^2
//! + sum_{t<N-1} w_delta delta_t^2 + w_a a_t^2
//! + sum_{t<N-2} w_ddelta (delta_{t+1} - delta_t)^2 + w_da (a_{t+1} - a_t)^2
//! ```
//!
//! Constraints: row `(k, 0)` is the raw state value (pinned through its
//! bounds), row `(k, t)` for `t >= 1` is `state_k(t) - model_k(state(t-1), u(t-1))`.
//!
//! Rolling the controls forward from the state at t = 0 satisfies every
//! dynamics row exactly, which lets the solver search over the controls only.

use nalgebra::{Vector2, Vector6};

use super::config::CostWeights;
use super::dynamics::BicycleModel;
use super::layout::{ControlVar, Layout, StateVar};
use crate::common::{NlpEvaluator, PathCoefficients, ShootingEvaluator};

/// Result of one joint evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub objective: f64,
    pub constraints: Vec<f64>,
}

/// Pure evaluator for one solve.
///
/// Holds only immutable data, so it can be called any number of times in any
/// order.
#[derive(Debug, Clone, Copy)]
pub struct FgEvaluator<'a> {
    layout: &'a Layout,
    model: BicycleModel,
    weights: &'a CostWeights,
    ref_speed: f64,
    coeffs: PathCoefficients,
}

impl<'a> FgEvaluator<'a> {
    pub fn new(
        layout: &'a Layout,
        model: BicycleModel,
        weights: &'a CostWeights,
        ref_speed: f64,
        coeffs: PathCoefficients,
    ) -> Self {
        Self {
            layout,
            model,
            weights,
            ref_speed,
            coeffs,
        }
    }

    /// Objective and constraints in one pass
    pub fn evaluate(&self, vars: &[f64]) -> Evaluation {
        let mut constraints = vec![0.0; self.layout.n_constraints()];
        self.constraints(vars, &mut constraints);
        Evaluation {
            objective: self.objective(vars),
            constraints,
        }
    }

    fn tracking_cost(&self, vars: &[f64]) -> f64 {
        let l = self.layout;
        let w = self.weights;
        (0..l.steps())
            .map(|t| {
                let cte = vars[l.state(StateVar::Cte, t)];
                let epsi = vars[l.state(StateVar::Epsi, t)];
                let dv = vars[l.state(StateVar::V, t)] - self.ref_speed;
                w.cte * cte * cte + w.epsi * epsi * epsi + w.speed * dv * dv
            })
            .sum()
    }

    fn actuator_cost(&self, vars: &[f64]) -> f64 {
        let l = self.layout;
        let w = self.weights;
        (0..l.control_steps())
            .map(|t| {
                let delta = vars[l.control(ControlVar::Steering, t)];
                let a = vars[l.control(ControlVar::Acceleration, t)];
                w.steering * delta * delta + w.acceleration * a * a
            })
            .sum()
    }

    fn smoothness_cost(&self, vars: &[f64]) -> f64 {
        let l = self.layout;
        let w = self.weights;
        (0..l.control_steps() - 1)
            .map(|t| {
                let dd = vars[l.control(ControlVar::Steering, t + 1)]
                    - vars[l.control(ControlVar::Steering, t)];
                let da = vars[l.control(ControlVar::Acceleration, t + 1)]
                    - vars[l.control(ControlVar::Acceleration, t)];
                w.steering_rate * dd * dd + w.acceleration_rate * da * da
            })
            .sum()
    }

    /// Visit every structural Jacobian entry of row block `t`.
    ///
    /// Rows of step `t >= 1` depend on the states at `t` and `t - 1` and the
    /// controls at `t - 1` only.
    fn for_each_step_entry<F>(&self, vars: &[f64], t: usize, mut visit: F)
    where
        F: FnMut(usize, usize, f64),
    {
        let l = self.layout;
        if t == 0 {
            for var in StateVar::ALL.iter() {
                visit(l.constraint_row(*var, 0), l.state(*var, 0), 1.0);
            }
            return;
        }

        let prev = l.state_at(vars, t - 1);
        let control = l.control_at(vars, t - 1);
        let (a, b) = self.model.linearize(&prev, &control, &self.coeffs);
        for row_var in StateVar::ALL.iter() {
            let i = row_var.index();
            let row = l.constraint_row(*row_var, t);
            visit(row, l.state(*row_var, t), 1.0);
            for col_var in StateVar::ALL.iter() {
                visit(row, l.state(*col_var, t - 1), -a[(i, col_var.index())]);
            }
            for col_var in ControlVar::ALL.iter() {
                visit(row, l.control(*col_var, t - 1), -b[(i, col_var.index())]);
            }
        }
    }
}

impl NlpEvaluator for FgEvaluator<'_> {
    fn n_vars(&self) -> usize {
        self.layout.n_vars()
    }

    fn n_constraints(&self) -> usize {
        self.layout.n_constraints()
    }

    fn objective(&self, vars: &[f64]) -> f64 {
        self.tracking_cost(vars) + self.actuator_cost(vars) + self.smoothness_cost(vars)
    }

    fn constraints(&self, vars: &[f64], g: &mut [f64]) {
        let l = self.layout;

        for var in StateVar::ALL.iter() {
            g[l.constraint_row(*var, 0)] = vars[l.state(*var, 0)];
        }

        for t in 1..l.steps() {
            let prev = l.state_at(vars, t - 1);
            let control = l.control_at(vars, t - 1);
            let predicted = self.model.predict(&prev, &control, &self.coeffs).to_vector();
            let current = l.state_at(vars, t).to_vector();
            for var in StateVar::ALL.iter() {
                g[l.constraint_row(*var, t)] = current[var.index()] - predicted[var.index()];
            }
        }
    }

    fn objective_gradient(&self, vars: &[f64], grad: &mut [f64]) {
        let l = self.layout;
        let w = self.weights;
        grad.iter_mut().for_each(|g| *g = 0.0);

        for t in 0..l.steps() {
            let cte = l.state(StateVar::Cte, t);
            let epsi = l.state(StateVar::Epsi, t);
            let v = l.state(StateVar::V, t);
            grad[cte] = 2.0 * w.cte * vars[cte];
            grad[epsi] = 2.0 * w.epsi * vars[epsi];
            grad[v] = 2.0 * w.speed * (vars[v] - self.ref_speed);
        }

        for t in 0..l.control_steps() {
            let delta = l.control(ControlVar::Steering, t);
            let a = l.control(ControlVar::Acceleration, t);
            grad[delta] += 2.0 * w.steering * vars[delta];
            grad[a] += 2.0 * w.acceleration * vars[a];
        }

        for t in 0..l.control_steps() - 1 {
            for (var, weight) in [
                (ControlVar::Steering, w.steering_rate),
                (ControlVar::Acceleration, w.acceleration_rate),
            ] {
                let curr = l.control(var, t);
                let next = l.control(var, t + 1);
                let diff = 2.0 * weight * (vars[next] - vars[curr]);
                grad[next] += diff;
                grad[curr] -= diff;
            }
        }
    }

    fn jacobian_entries(&self, vars: &[f64]) -> Vec<(usize, usize, f64)> {
        let mut entries = Vec::with_capacity(self.jacobian_capacity());
        for t in 0..self.layout.steps() {
            self.for_each_step_entry(vars, t, |row, col, value| entries.push((row, col, value)));
        }
        entries
    }

    fn jacobian_transpose_product(&self, vars: &[f64], d: &[f64], out: &mut [f64]) {
        let l = self.layout;
        out.iter_mut().for_each(|o| *o = 0.0);

        for var in StateVar::ALL.iter() {
            out[l.state(*var, 0)] += d[l.constraint_row(*var, 0)];
        }

        for t in 1..l.steps() {
            let prev = l.state_at(vars, t - 1);
            let control = l.control_at(vars, t - 1);
            let (a, b) = self.model.linearize(&prev, &control, &self.coeffs);

            let mut d_t = Vector6::zeros();
            for var in StateVar::ALL.iter() {
                d_t[var.index()] = d[l.constraint_row(*var, t)];
                out[l.state(*var, t)] += d_t[var.index()];
            }
            // rows are s_t - f(s_{t-1}, u_{t-1})
            let wrt_state: Vector6<f64> = -(a.transpose() * d_t);
            let wrt_control: Vector2<f64> = -(b.transpose() * d_t);
            for var in StateVar::ALL.iter() {
                out[l.state(*var, t - 1)] += wrt_state[var.index()];
            }
            for var in ControlVar::ALL.iter() {
                out[l.control(*var, t - 1)] += wrt_control[var.index()];
            }
        }
    }

    fn jacobian_sparsity(&self) -> Vec<(usize, usize)> {
        let zeros = vec![0.0; self.layout.n_vars()];
        let mut pattern = Vec::with_capacity(self.jacobian_capacity());
        for t in 0..self.layout.steps() {
            self.for_each_step_entry(&zeros, t, |row, col, _| pattern.push((row, col)));
        }
        pattern
    }
}

impl ShootingEvaluator for FgEvaluator<'_> {
    fn rollout(&self, vars: &mut [f64]) {
        let l = self.layout;
        let mut state = l.state_at(vars, 0);
        for t in 1..l.steps() {
            state = self.model.predict(&state, &l.control_at(vars, t - 1), &self.coeffs);
            l.set_state(vars, t, &state);
        }
    }

    fn reduced_gradient(&self, vars: &[f64], grad: &mut [f64]) {
        let l = self.layout;
        let mut full = vec![0.0; l.n_vars()];
        self.objective_gradient(vars, &mut full);
        grad.copy_from_slice(&full[l.controls_start()..]);

        let state_grad = |t: usize| {
            Vector6::from_fn(|i, _| full[l.state(StateVar::ALL[i], t)])
        };

        // adjoint sweep, costate of step t + 1 carried backwards
        let mut costate = state_grad(l.steps() - 1);
        for t in (0..l.control_steps()).rev() {
            let (a, b) = self.model.linearize(
                &l.state_at(vars, t),
                &l.control_at(vars, t),
                &self.coeffs,
            );
            let wrt_control: Vector2<f64> = b.transpose() * costate;
            for var in ControlVar::ALL.iter() {
                grad[l.control(*var, t) - l.controls_start()] += wrt_control[var.index()];
            }
            costate = state_grad(t) + a.transpose() * costate;
        }
    }
}

impl FgEvaluator<'_> {
    fn jacobian_capacity(&self) -> usize {
        let per_row = 1 + Layout::STATE_DIM + Layout::CONTROL_DIM;
        Layout::STATE_DIM + Layout::STATE_DIM * (self.layout.steps() - 1) * per_row
    }
}
