//! Variable and constraint bounds, plus the fixed initial guess.

use super::config::ActuatorLimits;
use super::layout::{Block, ControlVar, Layout, StateVar};
use crate::common::VehicleState;

/// Lower/upper bounds for every optimization variable and constraint row
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub var_lower: Vec<f64>,
    pub var_upper: Vec<f64>,
    pub constraint_lower: Vec<f64>,
    pub constraint_upper: Vec<f64>,
}

impl Bounds {
    /// Bounds for one solve from the measured `state`.
    ///
    /// States are left effectively free, actuators get their symmetric limits.
    /// Every constraint row is an equality at zero except the six
    /// initial-condition rows, which are pinned to the measured state.
    pub fn build(layout: &Layout, limits: &ActuatorLimits, state: &VehicleState) -> Self {
        let n_vars = layout.n_vars();
        let mut var_lower = vec![0.0; n_vars];
        let mut var_upper = vec![0.0; n_vars];

        for (block, range) in layout.blocks() {
            let bound = match block {
                Block::State(_) => limits.state,
                Block::Control(ControlVar::Steering) => limits.steering,
                Block::Control(ControlVar::Acceleration) => limits.acceleration,
            };
            for i in range {
                var_lower[i] = -bound;
                var_upper[i] = bound;
            }
        }

        let n_constraints = layout.n_constraints();
        let mut constraint_lower = vec![0.0; n_constraints];
        let mut constraint_upper = vec![0.0; n_constraints];
        let measured = state.to_vector();
        for var in StateVar::ALL.iter() {
            let row = layout.constraint_row(*var, 0);
            constraint_lower[row] = measured[var.index()];
            constraint_upper[row] = measured[var.index()];
        }

        Self {
            var_lower,
            var_upper,
            constraint_lower,
            constraint_upper,
        }
    }

    pub fn n_vars(&self) -> usize {
        self.var_lower.len()
    }

    pub fn n_constraints(&self) -> usize {
        self.constraint_lower.len()
    }

    /// Signed distance of each constraint value from its `[lower, upper]` band
    pub fn residuals(&self, g: &[f64]) -> Vec<f64> {
        g.iter()
            .zip(self.constraint_lower.iter().zip(self.constraint_upper.iter()))
            .map(|(&value, (&lo, &hi))| {
                if value.is_nan() {
                    f64::NAN
                } else if value < lo {
                    value - lo
                } else if value > hi {
                    value - hi
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Largest absolute constraint residual, infinite if any value is NaN
    pub fn max_violation(&self, g: &[f64]) -> f64 {
        self.residuals(g).iter().fold(0.0_f64, |acc, r| {
            if r.is_nan() {
                f64::INFINITY
            } else {
                acc.max(r.abs())
            }
        })
    }

    /// Clamp `x` into the variable bounds
    pub fn project(&self, x: &mut [f64]) {
        for (xi, (&lo, &hi)) in x
            .iter_mut()
            .zip(self.var_lower.iter().zip(self.var_upper.iter()))
        {
            *xi = xi.max(lo).min(hi);
        }
    }
}

/// Starting point of every solve: the measured state at t = 0, zeros elsewhere.
///
/// Not seeded from the previous cycle's plan.
pub fn initial_guess(layout: &Layout, state: &VehicleState) -> Vec<f64> {
    let mut vars = vec![0.0; layout.n_vars()];
    layout.set_state(&mut vars, 0, state);
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measured() -> VehicleState {
        VehicleState::new(1.0, -2.0, 0.1, 5.0, 0.4, -0.05)
    }

    #[test]
    fn test_variable_bounds() {
        let layout = Layout::new(10);
        let limits = ActuatorLimits::default();
        let bounds = Bounds::build(&layout, &limits, &measured());
        assert_eq!(bounds.n_vars(), layout.n_vars());

        for i in 0..layout.controls_start() {
            assert_eq!(bounds.var_lower[i], -1.0e19);
            assert_eq!(bounds.var_upper[i], 1.0e19);
        }
        for t in 0..layout.control_steps() {
            let d = layout.control(ControlVar::Steering, t);
            assert_eq!(bounds.var_lower[d], -0.436332);
            assert_eq!(bounds.var_upper[d], 0.436332);
            let a = layout.control(ControlVar::Acceleration, t);
            assert_eq!(bounds.var_lower[a], -1.0);
            assert_eq!(bounds.var_upper[a], 1.0);
        }
    }

    #[test]
    fn test_constraint_bounds_pin_initial_rows() {
        let layout = Layout::new(10);
        let state = measured();
        let bounds = Bounds::build(&layout, &ActuatorLimits::default(), &state);
        assert_eq!(bounds.n_constraints(), 60);

        let expected = state.to_vector();
        for var in StateVar::ALL.iter() {
            let row = layout.constraint_row(*var, 0);
            assert_eq!(bounds.constraint_lower[row], expected[var.index()]);
            assert_eq!(bounds.constraint_upper[row], expected[var.index()]);
            for t in 1..layout.steps() {
                let row = layout.constraint_row(*var, t);
                assert_eq!(bounds.constraint_lower[row], 0.0);
                assert_eq!(bounds.constraint_upper[row], 0.0);
            }
        }
    }

    #[test]
    fn test_residuals_and_violation() {
        let layout = Layout::new(2);
        let state = VehicleState::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let bounds = Bounds::build(&layout, &ActuatorLimits::default(), &state);
        let mut g = vec![0.0; layout.n_constraints()];
        g[layout.constraint_row(StateVar::X, 0)] = 1.0;
        assert_eq!(bounds.max_violation(&g), 0.0);

        g[layout.constraint_row(StateVar::V, 1)] = -0.25;
        let r = bounds.residuals(&g);
        assert_eq!(r[layout.constraint_row(StateVar::V, 1)], -0.25);
        assert_eq!(bounds.max_violation(&g), 0.25);

        g[0] = f64::NAN;
        assert!(bounds.max_violation(&g).is_infinite());
    }

    #[test]
    fn test_project_clamps_controls() {
        let layout = Layout::new(3);
        let bounds = Bounds::build(&layout, &ActuatorLimits::default(), &measured());
        let mut x = vec![5.0; layout.n_vars()];
        bounds.project(&mut x);
        assert_eq!(x[layout.state(StateVar::X, 2)], 5.0);
        assert_eq!(x[layout.control(ControlVar::Steering, 1)], 0.436332);
        assert_eq!(x[layout.control(ControlVar::Acceleration, 0)], 1.0);
    }

    #[test]
    fn test_initial_guess() {
        let layout = Layout::new(6);
        let state = measured();
        let guess = initial_guess(&layout, &state);
        assert_eq!(guess.len(), layout.n_vars());
        assert_eq!(layout.state_at(&guess, 0), state);
        for t in 1..layout.steps() {
            assert_eq!(layout.state_at(&guess, t), VehicleState::default());
        }
        assert!(guess[layout.controls_start()..].iter().all(|&u| u == 0.0));
    }
}
