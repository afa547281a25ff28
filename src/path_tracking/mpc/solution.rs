//! Extraction of the receding-horizon command from a solve.

use itertools::Itertools;

use super::layout::{ControlVar, Layout, StateVar};
use super::solver::SolveResult;
use crate::common::{Actuation, MpcError, MpcResult, Point2D};

/// First-step command plus the predicted path over the horizon
#[derive(Debug, Clone, PartialEq)]
pub struct MpcSolution {
    /// Steering command to apply now [rad]
    pub steering: f64,
    /// Throttle/brake command to apply now
    pub acceleration: f64,
    /// Predicted (x, y) at every horizon step, vehicle frame
    pub predicted: Vec<Point2D>,
    pub objective: f64,
}

impl MpcSolution {
    /// Extract the command from `result`, refusing anything the solver did
    /// not mark usable.
    pub fn from_result(result: &SolveResult, layout: &Layout) -> MpcResult<Self> {
        if !result.status.is_usable() {
            return Err(MpcError::SolveFailed(result.status));
        }
        let x = &result.x;
        let predicted = (0..layout.steps())
            .map(|t| {
                Point2D::new(
                    x[layout.state(StateVar::X, t)],
                    x[layout.state(StateVar::Y, t)],
                )
            })
            .collect();

        Ok(Self {
            steering: x[layout.control(ControlVar::Steering, 0)],
            acceleration: x[layout.control(ControlVar::Acceleration, 0)],
            predicted,
            objective: result.objective,
        })
    }

    pub fn actuation(&self) -> Actuation {
        Actuation::new(self.steering, self.acceleration)
    }

    /// Flat output `[steering, acceleration, x0, y0, x1, y1, ...]`
    pub fn to_vec(&self) -> Vec<f64> {
        let xs = self.predicted.iter().map(|p| p.x);
        let ys = self.predicted.iter().map(|p| p.y);
        [self.steering, self.acceleration]
            .into_iter()
            .chain(xs.interleave(ys))
            .collect()
    }
}
