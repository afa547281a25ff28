//! Reference path preparation for the MPC controller.
//!
//! Waypoints arrive in the world frame. Each cycle they are moved into the
//! vehicle frame, a cubic is fitted through them, and the measured state is
//! expressed relative to that cubic.

use nalgebra::{DMatrix, DVector};

use crate::common::{
    Actuation, MotionModel, MpcError, MpcResult, PathCoefficients, Point2D, Pose2D, VehicleState,
};

/// Least-squares polynomial fit `y = sum c_i x^i` of the given order.
///
/// Returns `order + 1` coefficients, lowest power first.
pub fn polyfit(xs: &[f64], ys: &[f64], order: usize) -> MpcResult<Vec<f64>> {
    if xs.len() != ys.len() {
        return Err(MpcError::Fit(format!(
            "x and y lengths differ ({} vs {})",
            xs.len(),
            ys.len()
        )));
    }
    if xs.len() <= order {
        return Err(MpcError::Fit(format!(
            "order {} fit needs more than {} points, found {}",
            order,
            order,
            xs.len()
        )));
    }

    let vandermonde = DMatrix::from_fn(xs.len(), order + 1, |i, j| xs[i].powi(j as i32));
    let rhs = DVector::from_column_slice(ys);
    let solution = vandermonde
        .svd(true, true)
        .solve(&rhs, 1e-12)
        .map_err(|e| MpcError::Fit(e.to_string()))?;

    if solution.iter().any(|c| !c.is_finite()) {
        return Err(MpcError::Fit("fit produced non-finite coefficients".to_string()));
    }
    Ok(solution.iter().copied().collect())
}

/// Evaluate polynomial coefficients (lowest power first) at `x`
pub fn polyeval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Cubic fit suitable for the controller
pub fn fit_cubic(points: &[Point2D]) -> MpcResult<PathCoefficients> {
    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    let c = polyfit(&xs, &ys, 3)?;
    Ok(PathCoefficients::new(c[0], c[1], c[2], c[3]))
}

/// Express world-frame waypoints in the frame of `pose`
pub fn to_vehicle_frame(pose: &Pose2D, waypoints: &[Point2D]) -> Vec<Point2D> {
    let (sin_yaw, cos_yaw) = pose.yaw.sin_cos();
    waypoints
        .iter()
        .map(|p| {
            let dx = p.x - pose.x;
            let dy = p.y - pose.y;
            Point2D::new(dx * cos_yaw + dy * sin_yaw, -dx * sin_yaw + dy * cos_yaw)
        })
        .collect()
}

/// Express a vehicle-frame point back in the world frame of `pose`
pub fn to_world_frame(pose: &Pose2D, point: &Point2D) -> Point2D {
    let (sin_yaw, cos_yaw) = pose.yaw.sin_cos();
    Point2D::new(
        pose.x + point.x * cos_yaw - point.y * sin_yaw,
        pose.y + point.x * sin_yaw + point.y * cos_yaw,
    )
}

/// Vehicle-frame state at the origin of the fitted path frame
pub fn vehicle_frame_state(speed: f64, coeffs: &PathCoefficients) -> VehicleState {
    VehicleState::new(0.0, 0.0, 0.0, speed, coeffs.eval(0.0), -coeffs.desired_heading(0.0))
}

/// Propagate `state` over an actuation latency using `model`.
///
/// `model` must step by exactly the latency; the last applied command is
/// assumed to stay active until the new one takes effect.
pub fn compensate_latency<M>(
    model: &M,
    state: &VehicleState,
    last_command: &Actuation,
    coeffs: &PathCoefficients,
) -> VehicleState
where
    M: MotionModel<State = VehicleState, Control = Actuation, Reference = PathCoefficients>,
{
    model.propagate(state, last_command, coeffs)
}
