//! Plotting for closed-loop tracking runs.
//!
//! Thin wrapper over gnuplot that knows how to draw the reference track, the
//! driven trajectory and the horizon predicted by the controller.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::common::{MpcError, MpcResult, Point2D, Pose2D};

/// Color palette for consistent styling
pub mod colors {
    pub const REFERENCE: &str = "#808080";
    pub const WAYPOINT: &str = "#000000";
    pub const TRAJECTORY: &str = "#0000FF";
    pub const PREDICTION: &str = "#00AA00";
    pub const VEHICLE: &str = "#FF0000";
}

/// Style for line rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

/// Style for point rendering
#[derive(Debug, Clone)]
pub struct PointStyle {
    pub color: String,
    pub size: f64,
    pub symbol: char,
    pub caption: String,
}

impl PointStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            size: 1.0,
            symbol: 'O',
            caption: caption.to_string(),
        }
    }

    pub fn with_symbol(mut self, symbol: char) -> Self {
        self.symbol = symbol;
        self
    }
}

/// Plot of one tracking run, in world coordinates
pub struct TrackingPlot {
    figure: Figure,
    title: String,
}

impl TrackingPlot {
    pub fn new(title: &str) -> Self {
        Self {
            figure: Figure::new(),
            title: title.to_string(),
        }
    }

    pub fn plot_line(&mut self, points: &[Point2D], style: &PathStyle) -> &mut Self {
        let (x, y) = split_xy(points);
        self.figure.axes2d().lines(
            &x,
            &y,
            &[
                Caption(&style.caption),
                Color(&style.color),
                LineWidth(style.line_width),
            ],
        );
        self
    }

    pub fn plot_points(&mut self, points: &[Point2D], style: &PointStyle) -> &mut Self {
        let (x, y) = split_xy(points);
        self.figure.axes2d().points(
            &x,
            &y,
            &[
                Caption(&style.caption),
                Color(&style.color),
                PointSymbol(style.symbol),
                PointSize(style.size),
            ],
        );
        self
    }

    pub fn plot_reference(&mut self, waypoints: &[Point2D]) -> &mut Self {
        self.plot_points(
            waypoints,
            &PointStyle::new(colors::WAYPOINT, "Waypoints").with_symbol('x'),
        );
        self.plot_line(
            waypoints,
            &PathStyle::new(colors::REFERENCE, "Reference").with_line_width(1.0),
        )
    }

    pub fn plot_trajectory(&mut self, trajectory: &[Point2D]) -> &mut Self {
        self.plot_line(trajectory, &PathStyle::new(colors::TRAJECTORY, "Driven"))
    }

    /// Predicted horizon, already expressed in world coordinates
    pub fn plot_prediction(&mut self, predicted: &[Point2D]) -> &mut Self {
        self.plot_points(
            predicted,
            &PointStyle::new(colors::PREDICTION, "MPC prediction"),
        )
    }

    /// Vehicle position with a heading tick
    pub fn plot_vehicle(&mut self, pose: &Pose2D, length: f64) -> &mut Self {
        let tip_x = pose.x + length * pose.yaw.cos();
        let tip_y = pose.y + length * pose.yaw.sin();
        let axes = self.figure.axes2d();
        axes.points(
            &[pose.x],
            &[pose.y],
            &[
                Caption("Vehicle"),
                Color(colors::VEHICLE),
                PointSymbol('O'),
                PointSize(1.5),
            ],
        );
        axes.lines(
            &[pose.x, tip_x],
            &[pose.y, tip_y],
            &[Color(colors::VEHICLE), LineWidth(2.0)],
        );
        self
    }

    pub fn save_png(&mut self, path: &str, width: u32, height: u32) -> MpcResult<()> {
        self.apply_settings();
        self.figure
            .save_to_png(path, width, height)
            .map_err(|e| MpcError::Visualization(e.to_string()))
    }

    fn apply_settings(&mut self) {
        let axes = self.figure.axes2d();
        axes.set_title(&self.title, &[]);
        axes.set_x_label("X [m]", &[]);
        axes.set_y_label("Y [m]", &[]);
        axes.set_aspect_ratio(AutoOption::Fix(1.0));
    }
}

fn split_xy(points: &[Point2D]) -> (Vec<f64>, Vec<f64>) {
    points.iter().map(|p| (p.x, p.y)).unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plot_creation() {
        let plot = TrackingPlot::new("Run");
        assert_eq!(plot.title, "Run");
    }

    #[test]
    fn test_path_style() {
        let style = PathStyle::new(colors::TRAJECTORY, "Driven").with_line_width(3.0);
        assert_eq!(style.line_width, 3.0);
        assert_eq!(style.color, colors::TRAJECTORY);
    }

    #[test]
    fn test_split_xy() {
        let (x, y) = split_xy(&[Point2D::new(1.0, 2.0), Point2D::new(3.0, 4.0)]);
        assert_eq!(x, vec![1.0, 3.0]);
        assert_eq!(y, vec![2.0, 4.0]);
    }
}
