//
// Path tracking simulation with nonlinear model predictive control.
//
// A vehicle drives a sinusoidal waypoint track. Every cycle the waypoints
// ahead of it are moved into the vehicle frame, a cubic is fitted through
// them and the controller solves for the next steering/throttle command.
//
// usage: mpc_path_tracking [config.toml]
//

use std::path::Path;
use std::process::ExitCode;

use log::{error, info, warn};

use rust_mpc::path_tracking::mpc::{BicycleModel, ModelPredictiveController, MpcConfig};
use rust_mpc::path_tracking::reference_path::{
    compensate_latency, fit_cubic, to_vehicle_frame, to_world_frame, vehicle_frame_state,
};
use rust_mpc::utils::logger::{self, LevelFilter};
use rust_mpc::utils::visualization::TrackingPlot;
use rust_mpc::{Actuation, MpcResult, PathCoefficients, Point2D, Pose2D, VehicleState};

/// Time between two control cycles [s]
const CONTROL_PERIOD: f64 = 0.1;
/// Delay between solving and the command taking effect [s]
const ACTUATION_LATENCY: f64 = 0.1;
const MAX_CYCLES: usize = 300;
/// Waypoints handed to the fit each cycle
const FIT_WINDOW: usize = 8;
const OUTPUT_PATH: &str = "img/path_tracking/mpc_path_tracking.png";

fn reference_track() -> Vec<Point2D> {
    (0..60)
        .map(|i| {
            let x = 5.0 * i as f64;
            Point2D::new(x, 12.0 * (x / 45.0).sin())
        })
        .collect()
}

/// Index of the waypoint closest to `position`, never behind `last`
fn nearest_waypoint(track: &[Point2D], position: &Point2D, last: usize) -> usize {
    track
        .iter()
        .enumerate()
        .skip(last)
        .min_by(|(_, a), (_, b)| a.distance(position).total_cmp(&b.distance(position)))
        .map(|(i, _)| i)
        .unwrap_or(last)
}

fn run() -> MpcResult<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading controller configuration from {}", path);
            MpcConfig::load(&path)?
        }
        None => MpcConfig::default(),
    };
    let controller = ModelPredictiveController::new(config)?;
    let lf = controller.config().vehicle.lf;
    let plant = BicycleModel::new(lf, CONTROL_PERIOD);
    let latency_model = BicycleModel::new(lf, ACTUATION_LATENCY);

    let track = reference_track();
    let mut pose = Pose2D::new(0.0, -3.0, 0.0);
    let mut speed = 0.0;
    let mut command = Actuation::zero();
    let mut trajectory = vec![pose.position()];
    let mut last_prediction = Vec::new();
    let mut target = 0;
    let mut failures = 0;

    for cycle in 0..MAX_CYCLES {
        target = nearest_waypoint(&track, &pose.position(), target);
        if target + FIT_WINDOW > track.len() {
            info!("Reached the end of the track after {} cycles", cycle);
            break;
        }

        let local = to_vehicle_frame(&pose, &track[target..target + FIT_WINDOW]);
        let coeffs = fit_cubic(&local)?;
        let measured = vehicle_frame_state(speed, &coeffs);
        let state = compensate_latency(&latency_model, &measured, &command, &coeffs);

        match controller.compute(&state, &coeffs) {
            Ok(solution) => {
                command = solution.actuation();
                last_prediction = solution
                    .predicted
                    .iter()
                    .map(|p| to_world_frame(&pose, p))
                    .collect();
                info!(
                    "cycle {:3}: cte {:+.3} m, epsi {:+.3} rad, v {:.2} m/s -> steer {:+.3}, throttle {:+.3}",
                    cycle, state.cte, state.epsi, speed, command.steering, command.acceleration
                );
            }
            Err(e) => {
                failures += 1;
                warn!("cycle {:3}: {}, holding previous command", cycle, e);
            }
        }

        // World-frame plant: only x, y, psi and v are meaningful here.
        let world = VehicleState::new(pose.x, pose.y, pose.yaw, speed, 0.0, 0.0);
        let next = plant.predict(&world, &command, &PathCoefficients::straight());
        pose = Pose2D::new(next.x, next.y, next.psi);
        speed = next.v;
        trajectory.push(pose.position());
    }

    info!(
        "Drove {} steps, {} failed solves, final speed {:.2} m/s",
        trajectory.len() - 1,
        failures,
        speed
    );

    let mut plot = TrackingPlot::new("MPC path tracking");
    plot.plot_reference(&track)
        .plot_trajectory(&trajectory)
        .plot_prediction(&last_prediction)
        .plot_vehicle(&pose, 3.0);

    if let Err(e) = std::fs::create_dir_all(Path::new(OUTPUT_PATH).parent().unwrap_or(Path::new("."))) {
        warn!("Could not create output directory: {}", e);
    }
    match plot.save_png(OUTPUT_PATH, 800, 600) {
        Ok(()) => info!("Plot saved to {}", OUTPUT_PATH),
        Err(e) => warn!("{}", e),
    }

    Ok(())
}

fn main() -> ExitCode {
    if let Err(e) = logger::init(LevelFilter::Info, None) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
