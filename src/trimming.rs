//! IQR trimming with Tukey fences, one feature at a time.
//!
//! Records outside `[Q1 - delta * IQR, Q3 + delta * IQR]` are dropped.
//! Quartiles use linear interpolation between order statistics.

use tracing::debug;

use crate::common::{Dataset, FType};
use crate::error::{OutlierError, Result};

/// Tukey's fence multiplier.
pub const DEFAULT_DELTA: f64 = 1.5;

/// Inlier interval of a feature derived from its quartiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds<F: FType> {
    pub q1: F,
    pub q3: F,
    pub lower: F,
    pub upper: F,
}

impl<F: FType> IqrBounds<F> {
    pub fn iqr(&self) -> F {
        self.q3 - self.q1
    }

    /// Inclusive on both ends. NaN is never contained.
    pub fn contains(&self, value: F) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Quantile `q` in `[0, 1]` of already sorted values, by linear interpolation.
///
/// Returns `None` for an empty slice.
pub fn quantile<F: FType>(sorted: &[F], q: F) -> Option<F> {
    let last = sorted.len().checked_sub(1)?;
    if last == 0 {
        return Some(sorted[0]);
    }
    let rank = q * F::from_usize(last)?;
    let lower = rank.floor().to_usize()?.min(last);
    let upper = rank.ceil().to_usize()?.min(last);
    let frac = rank - rank.floor();
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

fn check_delta<F: FType>(delta: F) -> Result<()> {
    if delta.is_nan() || delta < F::zero() {
        return Err(OutlierError::invalid_parameter(
            "delta",
            format!("must be non-negative, got {}", delta),
        ));
    }
    Ok(())
}

/// Compute the IQR bounds of `values`, ignoring NaN.
///
/// Fails with `EmptyDataset` when no value is a number.
pub fn iqr_bounds<F: FType>(values: &[F], delta: F) -> Result<IqrBounds<F>> {
    check_delta(delta)?;
    let mut sorted: Vec<F> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let quarter = F::from_f64(0.25).ok_or(OutlierError::EmptyDataset)?;
    let three_quarters = F::from_f64(0.75).ok_or(OutlierError::EmptyDataset)?;
    let q1 = quantile(&sorted, quarter).ok_or(OutlierError::EmptyDataset)?;
    let q3 = quantile(&sorted, three_quarters).ok_or(OutlierError::EmptyDataset)?;
    let iqr = q3 - q1;

    Ok(IqrBounds {
        q1,
        q3,
        lower: q1 - delta * iqr,
        upper: q3 + delta * iqr,
    })
}

/// Keep the records whose `feature` value lies within the IQR bounds.
///
/// Index keys and column order of the retained records are preserved. A
/// zero-IQR feature collapses the bounds to a single value, dropping every
/// record that differs from it. A feature with only NaN values keeps no
/// record.
///
/// # Example
///
/// ```
/// use light_outliers::common::Dataset;
/// use light_outliers::trimming::trim;
/// use ndarray::array;
///
/// let ds = Dataset::new(
///     vec!["x".to_string()],
///     array![[1.0], [2.0], [3.0], [4.0], [100.0]],
/// )
/// .unwrap();
///
/// let kept = trim(&ds, "x", 1.5).unwrap();
/// assert_eq!(kept.index(), &[0, 1, 2, 3]);
/// ```
pub fn trim<F: FType>(dataset: &Dataset<F>, feature: &str, delta: F) -> Result<Dataset<F>> {
    let column = dataset.column(feature)?;
    if dataset.is_empty() {
        return Err(OutlierError::EmptyDataset);
    }
    let values = column.to_vec();
    if values.iter().all(|v| v.is_nan()) {
        check_delta(delta)?;
        debug!(feature, removed = dataset.len(), "feature has no numeric value");
        return Ok(dataset.filter_rows(&vec![false; values.len()]));
    }
    let bounds = iqr_bounds(&values, delta)?;

    let mask: Vec<bool> = values.iter().map(|&v| bounds.contains(v)).collect();
    let trimmed = dataset.filter_rows(&mask);

    debug!(
        feature,
        lower = %bounds.lower,
        upper = %bounds.upper,
        kept = trimmed.len(),
        removed = dataset.len() - trimmed.len(),
        "trimmed feature"
    );
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn single_column(values: &[f64]) -> Dataset<f64> {
        let values = Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap();
        Dataset::new(vec!["x".to_string()], values).unwrap()
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(quantile(&sorted, 0.25).unwrap(), 1.75);
        assert_relative_eq!(quantile(&sorted, 0.5).unwrap(), 2.5);
        assert_relative_eq!(quantile(&sorted, 0.75).unwrap(), 3.25);
        assert_relative_eq!(quantile(&sorted, 1.0).unwrap(), 4.0);
        assert_eq!(quantile::<f64>(&[], 0.5), None);
        assert_eq!(quantile(&[7.0], 0.9), Some(7.0));
    }

    #[test]
    fn test_bounds_use_delta() {
        let bounds = iqr_bounds(&[1.0, 2.0, 3.0, 4.0, 5.0], 1.5).unwrap();
        assert_relative_eq!(bounds.q1, 2.0);
        assert_relative_eq!(bounds.q3, 4.0);
        assert_relative_eq!(bounds.lower, -1.0);
        assert_relative_eq!(bounds.upper, 7.0);
        assert!(bounds.contains(-1.0));
        assert!(bounds.contains(7.0));
        assert!(!bounds.contains(7.0001));
        assert!(!bounds.contains(f64::NAN));
    }

    #[test]
    fn test_negative_delta_rejected() {
        let ds = single_column(&[1.0, 2.0]);
        assert!(matches!(
            trim(&ds, "x", -0.1),
            Err(OutlierError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_unknown_feature() {
        let ds = single_column(&[1.0, 2.0]);
        assert!(matches!(
            trim(&ds, "y", 1.5),
            Err(OutlierError::InvalidFeature(name)) if name == "y"
        ));
    }

    #[test]
    fn test_empty_dataset() {
        let ds = single_column(&[]);
        assert!(matches!(trim(&ds, "x", 1.5), Err(OutlierError::EmptyDataset)));
    }

    #[test]
    fn test_zero_iqr_keeps_only_the_mode() {
        let ds = single_column(&[5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 9.0]);
        let trimmed = trim(&ds, "x", 1.5).unwrap();
        assert_eq!(trimmed.index(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_preserves_other_columns_and_keys() {
        let ds = Dataset::new(
            vec!["x".to_string(), "y".to_string()],
            array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0], [500.0, 50.0]],
        )
        .unwrap()
        .with_index(vec![100, 101, 102, 103, 104])
        .unwrap();
        let trimmed = trim(&ds, "x", 1.5).unwrap();
        assert_eq!(trimmed.index(), &[100, 101, 102, 103]);
        assert_eq!(trimmed.columns(), ds.columns());
        assert_eq!(
            trimmed.column("y").unwrap().to_vec(),
            vec![10.0, 20.0, 30.0, 40.0]
        );
    }

    #[test]
    fn test_removes_injected_extremes() {
        let mut values: Vec<f64> = (0..100).map(|i| -3.0 + 6.0 * i as f64 / 99.0).collect();
        values.extend([1000.0, -1000.0, 1000.0, 750.0, -900.0]);

        let ds = single_column(&values);
        let trimmed = trim(&ds, "x", 1.5).unwrap();

        assert_eq!(trimmed.index(), (0..100).collect::<Vec<usize>>().as_slice());
    }

    #[test]
    fn test_nan_values_are_dropped() {
        let ds = single_column(&[1.0, 2.0, f64::NAN, 3.0, 4.0]);
        let trimmed = trim(&ds, "x", 1.5).unwrap();
        assert_eq!(trimmed.index(), &[0, 1, 3, 4]);
    }

    #[test]
    fn test_all_nan_feature_keeps_nothing() {
        let ds = Dataset::new(
            vec!["x".to_string(), "y".to_string()],
            array![[f64::NAN, 1.0], [f64::NAN, 2.0]],
        )
        .unwrap();
        let trimmed = trim(&ds, "x", 1.5).unwrap();
        assert!(trimmed.is_empty());
        assert_eq!(trimmed.columns(), ds.columns());
        assert!(matches!(
            iqr_bounds(&[f64::NAN, f64::NAN], 1.5),
            Err(OutlierError::EmptyDataset)
        ));
    }
}
