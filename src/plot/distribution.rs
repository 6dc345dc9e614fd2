use std::fmt;
use std::io::Write;
use std::str::FromStr;

use tracing::debug;

use crate::common::{cast_f64, cast_usize, Dataset, FType};
use crate::error::{OutlierError, Result};
use crate::trimming::{trim, DEFAULT_DELTA};

use super::PlotStyle;

pub const DEFAULT_BINS: usize = 50;

/// Which values of a feature are shown in its distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayMode<F: FType> {
    /// Every value.
    Normal,
    /// Only the values kept by IQR trimming with the default delta.
    WithoutOutliers,
    /// Only the values strictly between `min` and `max`.
    WithLimits { min: F, max: F },
}

impl<F: FType> DisplayMode<F> {
    /// Build a mode from its name. `with_limits` needs both bounds.
    pub fn parse(name: &str, min: Option<F>, max: Option<F>) -> Result<Self> {
        match name {
            "normal" => Ok(DisplayMode::Normal),
            "without_outliers" => Ok(DisplayMode::WithoutOutliers),
            "with_limits" => match (min, max) {
                (Some(min), Some(max)) => Ok(DisplayMode::WithLimits { min, max }),
                _ => Err(OutlierError::invalid_parameter(
                    "limits",
                    "with_limits needs both a minimum and a maximum",
                )),
            },
            other => Err(OutlierError::InvalidMode {
                kind: "display",
                value: other.to_string(),
            }),
        }
    }
}

impl<F: FType> FromStr for DisplayMode<F> {
    type Err = OutlierError;

    fn from_str(s: &str) -> Result<Self> {
        DisplayMode::parse(s, None, None)
    }
}

impl<F: FType> fmt::Display for DisplayMode<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Normal => write!(f, "normal"),
            DisplayMode::WithoutOutliers => write!(f, "without_outliers"),
            DisplayMode::WithLimits { min, max } => write!(f, "with_limits({}, {})", min, max),
        }
    }
}

/// Equal-width histogram of one feature.
#[derive(Debug, Clone)]
pub struct Histogram<F: FType> {
    pub title: String,
    pub feature: String,
    pub style: PlotStyle,
    /// `bins + 1` increasing edges.
    pub edges: Vec<F>,
    pub counts: Vec<usize>,
}

impl<F: FType> Histogram<F> {
    /// Bin the values of `feature` selected by `mode`. NaN values are skipped.
    ///
    /// # Example
    ///
    /// ```
    /// use light_outliers::common::Dataset;
    /// use light_outliers::plot::distribution::{DisplayMode, Histogram};
    /// use light_outliers::plot::PlotStyle;
    /// use ndarray::array;
    ///
    /// let ds = Dataset::new(vec!["x".to_string()], array![[0.0], [1.0], [1.5], [4.0]]).unwrap();
    /// let hist = Histogram::build(&ds, "x", DisplayMode::Normal, 4, "x", PlotStyle::default()).unwrap();
    /// assert_eq!(hist.counts, vec![1, 2, 0, 1]);
    /// ```
    pub fn build(
        dataset: &Dataset<F>,
        feature: &str,
        mode: DisplayMode<F>,
        bins: usize,
        title: &str,
        style: PlotStyle,
    ) -> Result<Self> {
        if bins == 0 {
            return Err(OutlierError::invalid_parameter("bins", "must be positive"));
        }

        let values: Vec<F> = match mode {
            DisplayMode::Normal => dataset.column(feature)?.to_vec(),
            DisplayMode::WithoutOutliers => trim(dataset, feature, cast_f64(DEFAULT_DELTA))?
                .column(feature)?
                .to_vec(),
            DisplayMode::WithLimits { min, max } => dataset
                .column(feature)?
                .iter()
                .copied()
                .filter(|&v| v > min && v < max)
                .collect(),
        };
        let values: Vec<F> = values.into_iter().filter(|v| !v.is_nan()).collect();

        let mut lo = values.iter().copied().fold(F::infinity(), F::min);
        let mut hi = values.iter().copied().fold(F::neg_infinity(), F::max);
        if values.is_empty() {
            return Err(OutlierError::EmptyDataset);
        }
        if lo == hi {
            let half = cast_f64::<F>(0.5);
            lo = lo - half;
            hi = hi + half;
        }

        let width = (hi - lo) / cast_usize(bins);
        let edges: Vec<F> = (0..=bins)
            .map(|i| if i == bins { hi } else { lo + width * cast_usize(i) })
            .collect();
        let mut counts = vec![0; bins];
        for &v in &values {
            let bin = ((v - lo) / width).floor().to_usize().unwrap_or(0).min(bins - 1);
            counts[bin] += 1;
        }
        debug!(feature, %mode, n_values = values.len(), bins, "built histogram");

        Ok(Histogram {
            title: title.to_string(),
            feature: feature.to_string(),
            style,
            edges,
            counts,
        })
    }

    pub fn n_values(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Counts normalized so that the histogram integrates to one.
    pub fn densities(&self) -> Vec<F> {
        let total = cast_usize::<F>(self.n_values());
        self.counts
            .iter()
            .zip(self.edges.windows(2))
            .map(|(&count, edge)| cast_usize::<F>(count) / (total * (edge[1] - edge[0])))
            .collect()
    }

    /// One CSV row per bin: left edge, right edge, count, density.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(["lower", "upper", "count", "density"])?;
        for ((edge, count), density) in self
            .edges
            .windows(2)
            .zip(self.counts.iter())
            .zip(self.densities())
        {
            csv_writer.write_record(&[
                edge[0].to_string(),
                edge[1].to_string(),
                count.to_string(),
                density.to_string(),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}
