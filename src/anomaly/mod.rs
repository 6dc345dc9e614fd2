use ndarray::{Array1, Array2};

use crate::common::{AnomalyLabel, Dataset, FType};
use crate::error::{OutlierError, Result};

pub mod isolation_forest;

use isolation_forest::{IsolationForest, IsolationForestParams};

/// Trait for batch anomaly detectors working on feature matrices.
///
/// Rows are records, columns are features. Scores follow the negated
/// convention: the lower the score, the more anomalous the record.
pub trait AnomalyDetector<F: FType>: Send + Sync {
    /// Fit the detector to training data.
    fn fit(&mut self, x: &Array2<F>) -> Result<()>;

    /// Continuous anomaly score of each row.
    fn score_samples(&self, x: &Array2<F>) -> Result<Array1<F>>;

    /// Binary verdict for each row.
    fn predict(&self, x: &Array2<F>) -> Result<Vec<AnomalyLabel>>;

    fn is_fitted(&self) -> bool;
}

/// A dataset augmented with the per-record verdict and score of a detector.
#[derive(Debug, Clone)]
pub struct ScoredDataset<F: FType> {
    dataset: Dataset<F>,
    labels: Vec<AnomalyLabel>,
    scores: Vec<F>,
}

impl<F: FType> ScoredDataset<F> {
    pub fn new(dataset: Dataset<F>, labels: Vec<AnomalyLabel>, scores: Vec<F>) -> Result<Self> {
        if labels.len() != dataset.len() || scores.len() != dataset.len() {
            return Err(OutlierError::invalid_parameter(
                "scores",
                format!(
                    "{} labels and {} scores for {} records",
                    labels.len(),
                    scores.len(),
                    dataset.len()
                ),
            ));
        }
        Ok(ScoredDataset {
            dataset,
            labels,
            scores,
        })
    }

    pub fn dataset(&self) -> &Dataset<F> {
        &self.dataset
    }

    pub fn labels(&self) -> &[AnomalyLabel] {
        &self.labels
    }

    pub fn scores(&self) -> &[F] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Label of the record at `row`, `None` past the end.
    pub fn anomaly_label(&self, row: usize) -> Option<AnomalyLabel> {
        self.labels.get(row).copied()
    }

    pub fn anomaly_score(&self, row: usize) -> Option<F> {
        self.scores.get(row).copied()
    }

    /// `(index key, label, score)` of every record, in dataset order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, AnomalyLabel, F)> + '_ {
        self.dataset
            .index()
            .iter()
            .zip(self.labels.iter())
            .zip(self.scores.iter())
            .map(|((&key, &label), &score)| (key, label, score))
    }

    pub fn n_outliers(&self) -> usize {
        self.labels.iter().filter(|l| l.is_outlier()).count()
    }
}

/// Fit an isolation forest on the projection of `dataset` onto `features`.
///
/// # Example
///
/// ```
/// use light_outliers::anomaly::{score, train};
/// use light_outliers::anomaly::isolation_forest::IsolationForestParams;
/// use light_outliers::common::Dataset;
/// use ndarray::array;
///
/// let ds = Dataset::new(
///     vec!["a".to_string(), "b".to_string()],
///     array![[0.0, 0.1], [0.1, 0.0], [0.1, 0.1], [0.0, 0.0], [9.0, 9.0]],
/// )
/// .unwrap();
///
/// let model = train(&ds, &["a", "b"], IsolationForestParams::default().with_n_estimators(100)).unwrap();
/// let scored = score(&ds, &["a", "b"], &model).unwrap();
/// assert_eq!(scored.len(), 5);
/// ```
pub fn train<F: FType, S: AsRef<str>>(
    dataset: &Dataset<F>,
    features: &[S],
    params: IsolationForestParams,
) -> Result<IsolationForest<F>> {
    let mut forest = IsolationForest::new(params);
    forest.fit_dataset(dataset, features)?;
    Ok(forest)
}

/// Label and score every record of `dataset` with a trained model.
pub fn score<F: FType, S: AsRef<str>>(
    dataset: &Dataset<F>,
    features: &[S],
    scorer: &IsolationForest<F>,
) -> Result<ScoredDataset<F>> {
    scorer.score_dataset(dataset, features)
}
