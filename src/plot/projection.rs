use std::fmt;
use std::io::Write;
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis};
use tracing::debug;

use crate::common::{cast_f64, cast_usize, Dataset, FType};
use crate::error::{OutlierError, Result};
use crate::partition::PartitionResult;

use super::PlotStyle;

const MAX_ITERATIONS: usize = 1000;
const TOLERANCE: f64 = 1e-12;

/// Scale every column to zero mean and unit (population) variance.
///
/// Constant columns map to zero.
pub fn standardize<F: FType>(x: &Array2<F>) -> Result<Array2<F>> {
    let mean = x.mean_axis(Axis(0)).ok_or(OutlierError::EmptyDataset)?;
    let std = x.std_axis(Axis(0), F::zero());
    let mut z = x - &mean;
    for (mut column, &s) in z.axis_iter_mut(Axis(1)).zip(std.iter()) {
        if s > F::zero() {
            column.mapv_inplace(|v| v / s);
        } else {
            column.fill(F::zero());
        }
    }
    Ok(z)
}

/// Largest eigenvalue of a symmetric matrix and its unit eigenvector, by
/// power iteration. The vector's largest component is made positive.
fn dominant_eigenpair<F: FType>(m: &Array2<F>) -> (F, Array1<F>) {
    let d = m.nrows();
    let step = cast_f64::<F>(0.1);
    let mut v: Array1<F> = (0..d).map(|i| F::one() + cast_usize::<F>(i) * step).collect();
    let norm = v.dot(&v).sqrt();
    v.mapv_inplace(|a| a / norm);

    for _ in 0..MAX_ITERATIONS {
        let mut next = m.dot(&v);
        let norm = next.dot(&next).sqrt();
        if norm <= F::epsilon() {
            return (F::zero(), v);
        }
        next.mapv_inplace(|a| a / norm);
        let delta = (&next - &v).mapv(|a| a.abs()).sum();
        v = next;
        if delta < cast_f64(TOLERANCE) {
            break;
        }
    }

    let pivot = v
        .iter()
        .enumerate()
        .fold((0, F::zero()), |(best, max), (i, &a)| {
            if a.abs() > max {
                (i, a.abs())
            } else {
                (best, max)
            }
        })
        .0;
    if v[pivot] < F::zero() {
        v.mapv_inplace(|a| -a);
    }
    let value = v.dot(&m.dot(&v));
    (value, v)
}

/// Principal-component projection fitted by eigen-decomposition of the
/// covariance matrix.
#[derive(Debug, Clone)]
pub struct Pca<F: FType> {
    mean: Array1<F>,
    components: Array2<F>,
    explained_variance: Array1<F>,
}

impl<F: FType> Pca<F> {
    pub fn fit(x: &Array2<F>, n_components: usize) -> Result<Self> {
        let (n_records, n_features) = x.dim();
        if n_records == 0 {
            return Err(OutlierError::EmptyDataset);
        }
        if n_components == 0 || n_components > n_features {
            return Err(OutlierError::invalid_parameter(
                "n_components",
                format!(
                    "must be between 1 and the number of features ({}), got {}",
                    n_features, n_components
                ),
            ));
        }

        let mean = x.mean_axis(Axis(0)).ok_or(OutlierError::EmptyDataset)?;
        let centered = x - &mean;
        let dof = cast_usize::<F>(n_records.saturating_sub(1).max(1));
        let mut covariance = centered.t().dot(&centered) / dof;

        let mut components = Array2::zeros((n_components, n_features));
        let mut explained_variance = Array1::zeros(n_components);
        for k in 0..n_components {
            let (value, vector) = dominant_eigenpair(&covariance);
            let column = vector.view().insert_axis(Axis(1));
            let row = vector.view().insert_axis(Axis(0));
            covariance = covariance - column.dot(&row) * value;
            components.row_mut(k).assign(&vector);
            explained_variance[k] = value;
        }
        debug!(n_components, explained_variance = ?explained_variance.to_vec(), "fitted PCA");

        Ok(Pca {
            mean,
            components,
            explained_variance,
        })
    }

    /// Coordinates of each row of `x` along the principal components.
    pub fn transform(&self, x: &Array2<F>) -> Array2<F> {
        (x - &self.mean).dot(&self.components.t())
    }

    /// One row per component, one column per feature.
    pub fn components(&self) -> &Array2<F> {
        &self.components
    }

    pub fn explained_variance(&self) -> &Array1<F> {
        &self.explained_variance
    }
}

/// Number of principal components displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    TwoD,
    ThreeD,
}

impl ProjectionMode {
    pub fn dims(self) -> usize {
        match self {
            ProjectionMode::TwoD => 2,
            ProjectionMode::ThreeD => 3,
        }
    }
}

impl FromStr for ProjectionMode {
    type Err = OutlierError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "2D" | "2d" => Ok(ProjectionMode::TwoD),
            "3D" | "3d" => Ok(ProjectionMode::ThreeD),
            other => Err(OutlierError::InvalidMode {
                kind: "projection",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ProjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}D", self.dims())
    }
}

/// One group of points drawn with the same label, colour and marker size.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterLayer<F: FType> {
    pub label: String,
    pub color: String,
    pub marker_size: f32,
    pub keys: Vec<usize>,
    /// One row per point, one column per displayed component.
    pub coords: Array2<F>,
}

/// Scatter of standardized, PCA-projected records with outliers marked.
///
/// # Example
///
/// ```
/// use light_outliers::common::Dataset;
/// use light_outliers::partition::PartitionResult;
/// use light_outliers::plot::projection::{ProjectionMode, ScatterPlot};
/// use light_outliers::plot::PlotStyle;
/// use ndarray::array;
///
/// let ds = Dataset::new(
///     vec!["a".to_string(), "b".to_string()],
///     array![[0.0, 1.0], [1.0, 0.0], [1.0, 1.0], [8.0, 9.0]],
/// )
/// .unwrap();
/// let partition = PartitionResult {
///     outlier_index: vec![3],
///     clean_index: vec![0, 1, 2],
/// };
///
/// let plot = ScatterPlot::build(&ds, &["a", "b"], &partition, ProjectionMode::TwoD, PlotStyle::default()).unwrap();
/// assert_eq!(plot.layers[1].keys, vec![3]);
/// ```
#[derive(Debug, Clone)]
pub struct ScatterPlot<F: FType> {
    pub mode: ProjectionMode,
    pub style: PlotStyle,
    pub axis_labels: Vec<String>,
    pub layers: Vec<ScatterLayer<F>>,
}

impl<F: FType> ScatterPlot<F> {
    /// Project `features` of `dataset` and split the points per `partition`.
    ///
    /// In 3D every record is drawn as an inlier and outliers are overlaid; in
    /// 2D clean records and outliers are drawn as two separate groups.
    pub fn build<S: AsRef<str>>(
        dataset: &Dataset<F>,
        features: &[S],
        partition: &PartitionResult,
        mode: ProjectionMode,
        style: PlotStyle,
    ) -> Result<Self> {
        let x = dataset.select(features)?;
        if x.nrows() == 0 {
            return Err(OutlierError::EmptyDataset);
        }
        let z = standardize(&x)?;
        let projected = Pca::fit(&z, mode.dims())?.transform(&z);

        let positions = dataset.positions();
        let layer = |label: &str, color: &str, size: f32, keys: &[usize]| -> Result<ScatterLayer<F>> {
            let rows = keys
                .iter()
                .map(|key| {
                    positions.get(key).copied().ok_or_else(|| {
                        OutlierError::invalid_parameter(
                            "partition",
                            format!("index key {} is not in the dataset", key),
                        )
                    })
                })
                .collect::<Result<Vec<usize>>>()?;
            Ok(ScatterLayer {
                label: label.to_string(),
                color: color.to_string(),
                marker_size: size,
                keys: keys.to_vec(),
                coords: projected.select(Axis(0), &rows),
            })
        };

        let layers = match mode {
            ProjectionMode::ThreeD => vec![
                layer(
                    "inliers",
                    &style.inlier_color,
                    style.inlier_marker_size,
                    dataset.index(),
                )?,
                layer(
                    "outliers",
                    &style.outlier_color,
                    style.outlier_marker_size,
                    &partition.outlier_index,
                )?,
            ],
            ProjectionMode::TwoD => vec![
                layer(
                    "normal points",
                    &style.inlier_color,
                    style.inlier_marker_size,
                    &partition.clean_index,
                )?,
                layer(
                    "predicted outliers",
                    &style.outlier_color,
                    style.outlier_marker_size,
                    &partition.outlier_index,
                )?,
            ],
        };

        Ok(ScatterPlot {
            mode,
            style,
            axis_labels: (1..=mode.dims())
                .map(|i| format!("x_composite_{}", i))
                .collect(),
            layers,
        })
    }

    /// One CSV row per point: layer, index key, then the coordinates.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        let mut header = vec!["layer".to_string(), "key".to_string()];
        header.extend(self.axis_labels.iter().cloned());
        csv_writer.write_record(&header)?;

        for layer in &self.layers {
            for (key, point) in layer.keys.iter().zip(layer.coords.rows()) {
                let mut record = vec![layer.label.clone(), key.to_string()];
                record.extend(point.iter().map(|c| c.to_string()));
                csv_writer.write_record(&record)?;
            }
        }
        csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_standardize() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let z = standardize(&x).unwrap();
        assert_eq!(z, array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_pca_recovers_dominant_direction() {
        // points along the y = x diagonal, with a little spread across it
        let x = array![
            [-2.0, -2.1],
            [-1.0, -0.9],
            [0.0, 0.1],
            [1.0, 0.9],
            [2.0, 2.1],
        ];
        let pca = Pca::fit(&x, 2).unwrap();
        let first = pca.components().row(0);
        let inv_sqrt2 = 1.0 / 2f64.sqrt();
        assert_abs_diff_eq!(first[0], inv_sqrt2, epsilon = 1e-2);
        assert_abs_diff_eq!(first[1], inv_sqrt2, epsilon = 1e-2);

        let variance = pca.explained_variance();
        assert!(variance[0] > variance[1]);
        assert!(variance[1] >= -1e-9);

        let projected = pca.transform(&x);
        assert_eq!(projected.dim(), (5, 2));
        assert!(projected[[4, 0]] > projected[[0, 0]]);
    }

    #[test]
    fn test_pca_components_are_orthonormal() {
        let x = array![
            [1.0, 2.0, 0.5],
            [2.0, 1.0, 1.5],
            [3.0, 4.0, -0.5],
            [4.0, 3.0, 2.5],
            [5.0, 6.0, 0.0],
            [0.0, 1.0, 3.0],
        ];
        let pca = Pca::fit(&standardize(&x).unwrap(), 3).unwrap();
        let c = pca.components();
        let gram = c.dot(&c.t());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_pca_rejects_too_many_components() {
        let x = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(
            Pca::fit(&x, 3),
            Err(OutlierError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_projection_mode_parse() {
        assert_eq!("3D".parse::<ProjectionMode>().unwrap(), ProjectionMode::ThreeD);
        assert_eq!("2d".parse::<ProjectionMode>().unwrap(), ProjectionMode::TwoD);
        assert!(matches!(
            "4D".parse::<ProjectionMode>(),
            Err(OutlierError::InvalidMode { kind: "projection", .. })
        ));
        assert_eq!(ProjectionMode::ThreeD.to_string(), "3D");
    }

    fn dataset() -> Dataset<f64> {
        Dataset::new(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            array![
                [0.0, 1.0, 0.5],
                [1.0, 0.0, 0.2],
                [1.0, 1.0, 0.9],
                [0.5, 0.5, 0.1],
                [9.0, 8.0, 7.0],
            ],
        )
        .unwrap()
        .with_index(vec![10, 11, 12, 13, 14])
        .unwrap()
    }

    #[test]
    fn test_three_d_overlays_outliers_on_all_records() {
        let partition = PartitionResult {
            outlier_index: vec![14],
            clean_index: vec![10, 11, 12, 13],
        };
        let plot = ScatterPlot::build(
            &dataset(),
            &["a", "b", "c"],
            &partition,
            ProjectionMode::ThreeD,
            PlotStyle::default(),
        )
        .unwrap();
        assert_eq!(plot.layers[0].keys, vec![10, 11, 12, 13, 14]);
        assert_eq!(plot.layers[0].coords.dim(), (5, 3));
        assert_eq!(plot.layers[1].keys, vec![14]);
        assert_eq!(plot.layers[1].color, "red");
        assert_eq!(plot.layers[1].coords.row(0), plot.layers[0].coords.row(4));
        assert_eq!(plot.axis_labels[2], "x_composite_3");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let partition = PartitionResult {
            outlier_index: vec![99],
            clean_index: vec![10, 11, 12, 13, 14],
        };
        let result = ScatterPlot::build(
            &dataset(),
            &["a", "b"],
            &partition,
            ProjectionMode::TwoD,
            PlotStyle::default(),
        );
        assert!(matches!(result, Err(OutlierError::InvalidParameter { .. })));
    }

    #[test]
    fn test_write_csv() {
        let partition = PartitionResult {
            outlier_index: vec![14],
            clean_index: vec![10, 11, 12, 13],
        };
        let plot = ScatterPlot::build(
            &dataset(),
            &["a", "b"],
            &partition,
            ProjectionMode::TwoD,
            PlotStyle::default(),
        )
        .unwrap();
        let mut buffer = Vec::new();
        plot.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "layer,key,x_composite_1,x_composite_2");
        assert_eq!(lines.len(), 6);
        assert!(lines[5].starts_with("predicted outliers,14,"));
    }
}
