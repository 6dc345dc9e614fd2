//! Split scored records into outliers and clean records.
//!
//! Three selection policies are supported: the detector's own label, a fixed
//! score threshold, or the score of the k-th most anomalous record.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::anomaly::ScoredDataset;
use crate::common::{cast_f64, cast_usize, nan_last, FType};
use crate::error::{OutlierError, Result};

pub const DEFAULT_THRESHOLD: f64 = -0.5;
pub const DEFAULT_PERCENT: f64 = 0.5;

/// Name of a partition policy, as typed on a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Label,
    Threshold,
    Percentile,
}

impl FromStr for PartitionKind {
    type Err = OutlierError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "label" | "normal" => Ok(PartitionKind::Label),
            "threshold" => Ok(PartitionKind::Threshold),
            "percentile" | "percent" => Ok(PartitionKind::Percentile),
            other => Err(OutlierError::InvalidMode {
                kind: "partition",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartitionKind::Label => "label",
            PartitionKind::Threshold => "threshold",
            PartitionKind::Percentile => "percentile",
        };
        write!(f, "{}", name)
    }
}

/// Partition policy together with its parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PartitionMode<F: FType> {
    /// Outliers are the records labelled -1 by the detector.
    Label,
    /// Outliers score strictly below `threshold`.
    Threshold { threshold: F },
    /// Outliers score strictly below the score of the record ranked
    /// `floor(n * percent / 100) - 1` in ascending score order.
    Percentile { percent: F },
}

impl<F: FType> PartitionMode<F> {
    pub fn threshold_default() -> Self {
        PartitionMode::Threshold {
            threshold: cast_f64(DEFAULT_THRESHOLD),
        }
    }

    pub fn percentile_default() -> Self {
        PartitionMode::Percentile {
            percent: cast_f64(DEFAULT_PERCENT),
        }
    }

    /// Build a mode from its name; only the parameter of that mode is used.
    pub fn parse(name: &str, threshold: F, percent: F) -> Result<Self> {
        Ok(match name.parse::<PartitionKind>()? {
            PartitionKind::Label => PartitionMode::Label,
            PartitionKind::Threshold => PartitionMode::Threshold { threshold },
            PartitionKind::Percentile => PartitionMode::Percentile { percent },
        })
    }

    pub fn kind(&self) -> PartitionKind {
        match self {
            PartitionMode::Label => PartitionKind::Label,
            PartitionMode::Threshold { .. } => PartitionKind::Threshold,
            PartitionMode::Percentile { .. } => PartitionKind::Percentile,
        }
    }
}

/// Index keys of the outliers and of the remaining records, in dataset order.
///
/// The two sets are disjoint and together cover every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionResult {
    pub outlier_index: Vec<usize>,
    pub clean_index: Vec<usize>,
}

impl PartitionResult {
    pub fn n_outliers(&self) -> usize {
        self.outlier_index.len()
    }

    pub fn len(&self) -> usize {
        self.outlier_index.len() + self.clean_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Effective threshold of the percentile policy, or `None` when the requested
/// share rounds down to zero records.
fn percentile_threshold<F: FType>(scores: &[F], percent: F) -> Result<Option<F>> {
    let hundred = cast_f64::<F>(100.0);
    if percent.is_nan() || percent < F::zero() || percent > hundred {
        return Err(OutlierError::invalid_parameter(
            "percent",
            format!("must be in [0, 100], got {}", percent),
        ));
    }
    let k = (cast_usize::<F>(scores.len()) * percent / hundred)
        .floor()
        .to_usize()
        .unwrap_or(0);
    if k == 0 {
        return Ok(None);
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(nan_last);
    Ok(sorted.get(k - 1).copied())
}

/// Split `scored` into outlier and clean index keys under `mode`.
///
/// A record whose score equals the threshold is clean. In percentile mode,
/// when `floor(n * percent / 100)` is zero there are no outliers.
///
/// # Example
///
/// ```
/// use light_outliers::anomaly::ScoredDataset;
/// use light_outliers::common::{AnomalyLabel, Dataset};
/// use light_outliers::partition::{partition, PartitionMode};
/// use ndarray::array;
///
/// let ds = Dataset::new(vec!["x".to_string()], array![[1.0], [2.0], [3.0]]).unwrap();
/// let labels = vec![AnomalyLabel::Normal, AnomalyLabel::Outlier, AnomalyLabel::Normal];
/// let scored = ScoredDataset::new(ds, labels, vec![-0.4, -0.7, -0.5]).unwrap();
///
/// let result = partition(&scored, PartitionMode::threshold_default()).unwrap();
/// assert_eq!(result.outlier_index, vec![1]);
/// assert_eq!(result.clean_index, vec![0, 2]);
/// ```
pub fn partition<F: FType>(scored: &ScoredDataset<F>, mode: PartitionMode<F>) -> Result<PartitionResult> {
    let threshold = match mode {
        PartitionMode::Label => None,
        PartitionMode::Threshold { threshold } => Some(threshold),
        PartitionMode::Percentile { percent } => {
            match percentile_threshold(scored.scores(), percent)? {
                Some(t) => Some(t),
                None => {
                    debug!(%percent, "percentile selects no record, no outliers");
                    return Ok(PartitionResult {
                        outlier_index: Vec::new(),
                        clean_index: scored.dataset().index().to_vec(),
                    });
                }
            }
        }
    };

    let mut result = PartitionResult::default();
    for (key, label, score) in scored.iter() {
        let is_outlier = match threshold {
            None => label.is_outlier(),
            Some(t) => score < t,
        };
        if is_outlier {
            result.outlier_index.push(key);
        } else {
            result.clean_index.push(key);
        }
    }
    debug!(
        mode = %mode.kind(),
        outliers = result.outlier_index.len(),
        clean = result.clean_index.len(),
        "partitioned records"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{AnomalyLabel, Dataset};
    use ndarray::Array2;

    fn scored(scores: &[f64]) -> ScoredDataset<f64> {
        let values = Array2::from_shape_vec((scores.len(), 1), scores.to_vec()).unwrap();
        let ds = Dataset::new(vec!["x".to_string()], values).unwrap();
        let labels = scores
            .iter()
            .map(|&s| {
                if s < -0.6 {
                    AnomalyLabel::Outlier
                } else {
                    AnomalyLabel::Normal
                }
            })
            .collect();
        ScoredDataset::new(ds, labels, scores.to_vec()).unwrap()
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!("normal".parse::<PartitionKind>().unwrap(), PartitionKind::Label);
        assert_eq!("label".parse::<PartitionKind>().unwrap(), PartitionKind::Label);
        assert_eq!(
            "percent".parse::<PartitionKind>().unwrap(),
            PartitionKind::Percentile
        );
        assert!(matches!(
            "median".parse::<PartitionKind>(),
            Err(OutlierError::InvalidMode { kind: "partition", .. })
        ));
    }

    #[test]
    fn test_parse_mode_picks_its_parameter() {
        assert_eq!(
            PartitionMode::parse("threshold", -0.3, 7.0).unwrap(),
            PartitionMode::Threshold { threshold: -0.3 }
        );
        assert_eq!(
            PartitionMode::parse("percent", -0.3, 7.0).unwrap(),
            PartitionMode::Percentile { percent: 7.0 }
        );
        assert_eq!(
            PartitionMode::<f64>::parse("normal", -0.3, 7.0).unwrap(),
            PartitionMode::Label
        );
    }

    #[test]
    fn test_label_mode_follows_labels() {
        let s = scored(&[-0.4, -0.7, -0.65, -0.5]);
        let result = partition(&s, PartitionMode::Label).unwrap();
        assert_eq!(result.outlier_index, vec![1, 2]);
        assert_eq!(result.clean_index, vec![0, 3]);
        assert_eq!(result.n_outliers(), s.n_outliers());
    }

    #[test]
    fn test_threshold_boundary_is_clean() {
        let s = scored(&[-0.5, -0.51, -0.49]);
        let result = partition(&s, PartitionMode::threshold_default()).unwrap();
        assert_eq!(result.outlier_index, vec![1]);
        assert_eq!(result.clean_index, vec![0, 2]);
    }

    #[test]
    fn test_percentile_ten_records_fifty_percent() {
        let scores: Vec<f64> = (0..10).map(|i| -0.9 + i as f64 * 0.05).collect();
        let s = scored(&scores);
        let result = partition(&s, PartitionMode::Percentile { percent: 50.0 }).unwrap();
        // k = 5, threshold = 5th lowest score, which itself stays clean
        assert_eq!(result.outlier_index, vec![0, 1, 2, 3]);
        assert_eq!(result.clean_index, vec![4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_percentile_ties_go_to_clean() {
        let s = scored(&[-0.8, -0.8, -0.8, -0.2, -0.1, -0.3]);
        let result = partition(&s, PartitionMode::Percentile { percent: 50.0 }).unwrap();
        assert!(result.outlier_index.is_empty());
        assert_eq!(result.clean_index.len(), 6);
    }

    #[test]
    fn test_percentile_rounding_to_zero_means_no_outliers() {
        let s = scored(&[-0.9, -0.1, -0.2]);
        let result = partition(&s, PartitionMode::percentile_default()).unwrap();
        assert!(result.outlier_index.is_empty());
        assert_eq!(result.clean_index, vec![0, 1, 2]);
    }

    #[test]
    fn test_percentile_out_of_range() {
        let s = scored(&[-0.9, -0.1]);
        assert!(matches!(
            partition(&s, PartitionMode::Percentile { percent: 120.0 }),
            Err(OutlierError::InvalidParameter { .. })
        ));
        assert!(partition(&s, PartitionMode::Percentile { percent: f64::NAN }).is_err());
    }

    #[test]
    fn test_keys_come_from_dataset_index() {
        let values = Array2::from_shape_vec((3, 1), vec![0.0, 1.0, 2.0]).unwrap();
        let ds = Dataset::new(vec!["x".to_string()], values)
            .unwrap()
            .with_index(vec![30, 10, 20])
            .unwrap();
        let s = ScoredDataset::new(
            ds,
            vec![AnomalyLabel::Normal; 3],
            vec![-0.9, -0.2, -0.3],
        )
        .unwrap();
        let result = partition(&s, PartitionMode::threshold_default()).unwrap();
        assert_eq!(result.outlier_index, vec![30]);
        assert_eq!(result.clean_index, vec![10, 20]);
    }

    #[test]
    fn test_nan_scores_are_clean() {
        let s = scored(&[f64::NAN, -0.9]);
        let result = partition(&s, PartitionMode::threshold_default()).unwrap();
        assert_eq!(result.outlier_index, vec![1]);
        assert_eq!(result.clean_index, vec![0]);
    }
}
