//! Common types used throughout rust_mpc

use nalgebra::{Vector2, Vector6};

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// 2D pose (position + orientation) in the world frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

/// Vehicle state as seen by the controller.
///
/// All quantities are expressed in the vehicle frame at the time of the solve.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VehicleState {
    /// Longitudinal position [m]
    pub x: f64,
    /// Lateral position [m]
    pub y: f64,
    /// Heading [rad]
    pub psi: f64,
    /// Speed [m/s]
    pub v: f64,
    /// Cross-track error [m]
    pub cte: f64,
    /// Heading error [rad]
    pub epsi: f64,
}

impl VehicleState {
    pub fn new(x: f64, y: f64, psi: f64, v: f64, cte: f64, epsi: f64) -> Self {
        Self { x, y, psi, v, cte, epsi }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    /// Components in layout order: x, y, psi, v, cte, epsi
    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(self.x, self.y, self.psi, self.v, self.cte, self.epsi)
    }

    pub fn is_finite(&self) -> bool {
        self.to_vector().iter().all(|c| c.is_finite())
    }
}

impl From<Vector6<f64>> for VehicleState {
    fn from(v: Vector6<f64>) -> Self {
        Self { x: v[0], y: v[1], psi: v[2], v: v[3], cte: v[4], epsi: v[5] }
    }
}

/// Actuation applied over one timestep
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Actuation {
    /// Steering angle [rad]
    pub steering: f64,
    /// Normalized throttle/brake, positive accelerates
    pub acceleration: f64,
}

impl Actuation {
    pub fn new(steering: f64, acceleration: f64) -> Self {
        Self { steering, acceleration }
    }

    pub fn zero() -> Self {
        Self { steering: 0.0, acceleration: 0.0 }
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.steering, self.acceleration)
    }
}

/// Cubic reference path `f(x) = c0 + c1 x + c2 x^2 + c3 x^3`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PathCoefficients(pub [f64; 4]);

impl PathCoefficients {
    pub fn new(c0: f64, c1: f64, c2: f64, c3: f64) -> Self {
        Self([c0, c1, c2, c3])
    }

    /// Straight line along the x axis
    pub fn straight() -> Self {
        Self([0.0; 4])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
    }

    /// Path height `f(x)`
    pub fn eval(&self, x: f64) -> f64 {
        let [c0, c1, c2, c3] = self.0;
        c0 + c1 * x + c2 * x * x + c3 * x * x * x
    }

    /// Path slope `f'(x)`
    pub fn slope(&self, x: f64) -> f64 {
        let [_, c1, c2, c3] = self.0;
        c1 + 2.0 * c2 * x + 3.0 * c3 * x * x
    }

    /// Second derivative `f''(x)`
    pub fn curvature_term(&self, x: f64) -> f64 {
        let [_, _, c2, c3] = self.0;
        2.0 * c2 + 6.0 * c3 * x
    }

    /// Desired heading `atan(f'(x))`
    pub fn desired_heading(&self, x: f64) -> f64 {
        self.slope(x).atan()
    }

    /// Derivative of the desired heading with respect to x
    pub fn desired_heading_derivative(&self, x: f64) -> f64 {
        let s = self.slope(x);
        self.curvature_term(x) / (1.0 + s * s)
    }
}
