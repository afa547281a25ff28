//! Discrete-time kinematic bicycle model.
//!
//! Forward-Euler step of length `dt`, actuation held constant over the step:
//!
//! ```text
//! x'    = x + v cos(psi) dt
//! y'    = y + v sin(psi) dt
//! psi'  = psi + v / Lf * delta * dt
//! v'    = v + a dt
//! cte'  = (f(x) - y) + v sin(epsi) dt
//! epsi' = (psi - atan(f'(x))) + v delta / Lf * dt
//! ```

use nalgebra::{Matrix6, Matrix6x2};

use crate::common::{Actuation, MotionModel, PathCoefficients, VehicleState};

/// Kinematic bicycle model with a fixed timestep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BicycleModel {
    /// Center of gravity to front axle [m]
    pub lf: f64,
    /// Timestep [s]
    pub dt: f64,
}

impl BicycleModel {
    pub fn new(lf: f64, dt: f64) -> Self {
        Self { lf, dt }
    }

    /// Predicted state one step after `state` under `control`
    pub fn predict(
        &self,
        state: &VehicleState,
        control: &Actuation,
        coeffs: &PathCoefficients,
    ) -> VehicleState {
        let dt = self.dt;
        let VehicleState { x, y, psi, v, epsi, .. } = *state;
        let Actuation { steering: delta, acceleration: a } = *control;

        VehicleState {
            x: x + v * psi.cos() * dt,
            y: y + v * psi.sin() * dt,
            psi: psi + v / self.lf * delta * dt,
            v: v + a * dt,
            cte: (coeffs.eval(x) - y) + v * epsi.sin() * dt,
            epsi: (psi - coeffs.desired_heading(x)) + v * delta / self.lf * dt,
        }
    }

    /// Partial derivatives of [`predict`](Self::predict).
    ///
    /// Returns `(A, B)` with `A[i][j] = d next_i / d state_j` and
    /// `B[i][j] = d next_i / d control_j`, rows and columns in layout order.
    pub fn linearize(
        &self,
        state: &VehicleState,
        control: &Actuation,
        coeffs: &PathCoefficients,
    ) -> (Matrix6<f64>, Matrix6x2<f64>) {
        let dt = self.dt;
        let VehicleState { x, psi, v, epsi, .. } = *state;
        let delta = control.steering;
        let (sin_psi, cos_psi) = psi.sin_cos();

        #[rustfmt::skip]
        let a = Matrix6::new(
            // x      y     psi                 v                    cte  epsi
            1.0,      0.0,  -v * sin_psi * dt,  cos_psi * dt,        0.0, 0.0,
            0.0,      1.0,  v * cos_psi * dt,   sin_psi * dt,        0.0, 0.0,
            0.0,      0.0,  1.0,                delta / self.lf * dt, 0.0, 0.0,
            0.0,      0.0,  0.0,                1.0,                 0.0, 0.0,
            coeffs.slope(x), -1.0, 0.0,         epsi.sin() * dt,     0.0, v * epsi.cos() * dt,
            -coeffs.desired_heading_derivative(x), 0.0, 1.0, delta / self.lf * dt, 0.0, 0.0,
        );

        #[rustfmt::skip]
        let b = Matrix6x2::new(
            // delta            a
            0.0,                0.0,
            0.0,                0.0,
            v / self.lf * dt,   0.0,
            0.0,                dt,
            0.0,                0.0,
            v / self.lf * dt,   0.0,
        );

        (a, b)
    }
}

impl MotionModel for BicycleModel {
    type State = VehicleState;
    type Control = Actuation;
    type Reference = PathCoefficients;

    fn propagate(
        &self,
        state: &VehicleState,
        control: &Actuation,
        reference: &PathCoefficients,
    ) -> VehicleState {
        self.predict(state, control, reference)
    }
}
