//! Data layer behind the outlier plots.
//!
//! Nothing here draws pixels: the builders compute what a renderer needs
//! (projected coordinates, histogram bins) and can dump it as CSV.

pub mod distribution;
pub mod projection;

/// Styling shared by every plot, passed explicitly to each builder.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotStyle {
    pub grid: bool,
    /// Width and height, in inches.
    pub figure_size: (f32, f32),
    pub inlier_color: String,
    pub outlier_color: String,
    pub inlier_marker_size: f32,
    pub outlier_marker_size: f32,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            grid: true,
            figure_size: (10.0, 8.0),
            inlier_color: "green".to_string(),
            outlier_color: "red".to_string(),
            inlier_marker_size: 4.0,
            outlier_marker_size: 60.0,
        }
    }
}

impl PlotStyle {
    pub fn with_grid(mut self, grid: bool) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_figure_size(mut self, width: f32, height: f32) -> Self {
        self.figure_size = (width, height);
        self
    }

    pub fn with_colors(mut self, inlier: &str, outlier: &str) -> Self {
        self.inlier_color = inlier.to_string();
        self.outlier_color = outlier.to_string();
        self
    }
}
