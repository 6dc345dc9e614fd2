use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::seq::index;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::common::{cast_f64, cast_usize, nan_last, AnomalyLabel, Dataset, FType};
use crate::error::{OutlierError, Result};
use crate::trimming::quantile;

use super::{AnomalyDetector, ScoredDataset};

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Subsample size drawn for each tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxSamples {
    /// `min(256, n_records)`.
    Auto,
    /// A fixed number of records, clamped to the dataset size.
    Count(usize),
    /// A fraction of the dataset in `(0, 1]`.
    Fraction(f64),
}

impl MaxSamples {
    fn resolve(self, n_records: usize) -> Result<usize> {
        match self {
            MaxSamples::Auto => Ok(n_records.min(256)),
            MaxSamples::Count(0) => Err(OutlierError::invalid_parameter(
                "max_samples",
                "must be at least 1",
            )),
            MaxSamples::Count(count) if count > n_records => {
                warn!(
                    max_samples = count,
                    n_records, "max_samples exceeds the number of records, using all records"
                );
                Ok(n_records)
            }
            MaxSamples::Count(count) => Ok(count),
            MaxSamples::Fraction(f) if f > 0.0 && f <= 1.0 => {
                Ok(((f * n_records as f64) as usize).max(1))
            }
            MaxSamples::Fraction(f) => Err(OutlierError::invalid_parameter(
                "max_samples",
                format!("fraction must be in (0, 1], got {}", f),
            )),
        }
    }
}

/// `auto`, a record count such as `128`, or a fraction such as `0.5`.
impl FromStr for MaxSamples {
    type Err = OutlierError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || OutlierError::invalid_parameter("max_samples", format!("cannot parse '{}'", s));
        if s == "auto" {
            Ok(MaxSamples::Auto)
        } else if s.contains('.') {
            s.parse().map(MaxSamples::Fraction).map_err(|_| invalid())
        } else {
            s.parse().map(MaxSamples::Count).map_err(|_| invalid())
        }
    }
}

/// How the decision boundary behind the binary label is placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contamination {
    /// Records scoring below -0.5 are outliers.
    Auto,
    /// Expected share of outliers in the training data, in `(0, 0.5]`.
    Fraction(f64),
}

impl FromStr for Contamination {
    type Err = OutlierError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "auto" {
            return Ok(Contamination::Auto);
        }
        s.parse().map(Contamination::Fraction).map_err(|_| {
            OutlierError::invalid_parameter("contamination", format!("cannot parse '{}'", s))
        })
    }
}

/// Hyper-parameters of an [`IsolationForest`].
///
/// # Example
///
/// ```
/// use light_outliers::anomaly::isolation_forest::{IsolationForestParams, MaxSamples};
///
/// let params = IsolationForestParams::default()
///     .with_n_estimators(200)
///     .with_max_samples(MaxSamples::Count(128))
///     .with_seed(Some(7));
/// assert_eq!(params.n_estimators, 200);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForestParams {
    pub n_estimators: usize,
    pub max_samples: MaxSamples,
    /// Draw each tree's subsample with replacement.
    pub bootstrap: bool,
    pub contamination: Contamination,
    /// `None` seeds from the operating system.
    pub seed: Option<u64>,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 1000,
            max_samples: MaxSamples::Auto,
            bootstrap: false,
            contamination: Contamination::Auto,
            seed: Some(42),
        }
    }
}

impl IsolationForestParams {
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn with_max_samples(mut self, max_samples: MaxSamples) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_contamination(mut self, contamination: Contamination) -> Self {
        self.contamination = contamination;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(OutlierError::invalid_parameter(
                "n_estimators",
                "must be at least 1",
            ));
        }
        if let Contamination::Fraction(c) = self.contamination {
            if !(c > 0.0 && c <= 0.5) {
                return Err(OutlierError::invalid_parameter(
                    "contamination",
                    format!("must be in (0, 0.5], got {}", c),
                ));
            }
        }
        Ok(())
    }
}

/// Average path length of an unsuccessful search in a binary search tree
/// of `n` records. Normalizes isolation depths.
fn average_path_length<F: FType>(n: usize) -> F {
    match n {
        0 | 1 => F::zero(),
        2 => F::one(),
        _ => {
            let n_f = cast_usize::<F>(n);
            let m = n_f - F::one();
            let two = cast_f64::<F>(2.0);
            two * (m.ln() + cast_f64(EULER_GAMMA)) - two * m / n_f
        }
    }
}

/// One isolation tree, stored as flat node arrays.
///
/// `children[node]` is `None` for leaves; `n_samples[node]` is the number of
/// training records that reached the node.
#[derive(Debug, Clone)]
struct IsolationTree<F: FType> {
    feature: Vec<usize>,
    threshold: Vec<F>,
    children: Vec<Option<(usize, usize)>>,
    n_samples: Vec<usize>,
}

impl<F: FType> IsolationTree<F> {
    fn push_node(&mut self, n_samples: usize) -> usize {
        self.feature.push(0);
        self.threshold.push(F::zero());
        self.children.push(None);
        self.n_samples.push(n_samples);
        self.n_samples.len() - 1
    }

    /// Grow a tree on the records `rows` of `x`, splitting on random features
    /// at random thresholds until each record is isolated or `max_depth` is hit.
    fn grow(x: &Array2<F>, rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = IsolationTree {
            feature: Vec::new(),
            threshold: Vec::new(),
            children: Vec::new(),
            n_samples: Vec::new(),
        };
        let root = tree.push_node(rows.len());
        let mut stack = vec![(root, rows, 0usize)];

        while let Some((node, rows, depth)) = stack.pop() {
            if depth >= max_depth || rows.len() <= 1 {
                continue;
            }
            // Only features that still vary among the node's records can split it
            let candidates: Vec<(usize, F, F)> = (0..x.ncols())
                .filter_map(|feature| {
                    let (lo, hi) = rows.iter().fold(
                        (F::infinity(), F::neg_infinity()),
                        |(lo, hi), &r| (lo.min(x[[r, feature]]), hi.max(x[[r, feature]])),
                    );
                    (lo < hi).then_some((feature, lo, hi))
                })
                .collect();
            let Some(&(feature, lo, hi)) = candidates.choose(rng) else {
                continue;
            };

            let u: f64 = rng.gen();
            let mut threshold = lo + (hi - lo) * cast_f64(u);
            if threshold <= lo {
                threshold = hi;
            }

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                rows.iter().copied().partition(|&r| x[[r, feature]] < threshold);
            let left = tree.push_node(left_rows.len());
            let right = tree.push_node(right_rows.len());
            tree.feature[node] = feature;
            tree.threshold[node] = threshold;
            tree.children[node] = Some((left, right));

            stack.push((left, left_rows, depth + 1));
            stack.push((right, right_rows, depth + 1));
        }
        tree
    }

    /// Depth of the leaf reached by `sample`, plus the expected remaining
    /// depth for the records that leaf was not able to separate.
    fn path_length(&self, sample: ArrayView1<F>) -> F {
        let mut node = 0;
        let mut depth = 0;
        while let Some((left, right)) = self.children[node] {
            node = if sample[self.feature[node]] < self.threshold[node] {
                left
            } else {
                right
            };
            depth += 1;
        }
        cast_usize::<F>(depth) + average_path_length(self.n_samples[node])
    }

    fn n_nodes(&self) -> usize {
        self.n_samples.len()
    }
}

#[derive(Debug, Clone)]
struct Forest<F: FType> {
    trees: Vec<IsolationTree<F>>,
    n_features: usize,
    max_samples: usize,
    offset: F,
}

impl<F: FType> Forest<F> {
    /// `-2^(-E[h(x)] / c(max_samples))`: close to -1 for anomalies, above -0.5
    /// for ordinary records.
    fn score_row(&self, sample: ArrayView1<F>) -> F {
        let total = self
            .trees
            .iter()
            .fold(F::zero(), |acc, tree| acc + tree.path_length(sample));
        let mean = total / cast_usize(self.trees.len());
        let normalizer = average_path_length::<F>(self.max_samples);
        // single-record subsamples carry no depth information: score -0.5
        let ratio = if normalizer > F::zero() {
            mean / normalizer
        } else {
            F::one()
        };
        -cast_f64::<F>(2.0).powf(-ratio)
    }
}

/// Isolation forest: an ensemble of random trees scoring records by how
/// quickly random axis-aligned splits isolate them.
///
/// Scores follow the negated convention: values near -1 are anomalies,
/// values near 0 are normal. The model is immutable once fitted and can be
/// shared between threads for scoring.
///
/// # Example
///
/// ```
/// use light_outliers::anomaly::isolation_forest::{IsolationForest, IsolationForestParams};
/// use light_outliers::anomaly::AnomalyDetector;
/// use ndarray::array;
///
/// let x = array![[-2.0, -1.0], [-1.0, -1.0], [-1.0, -2.0], [1.0, 1.0], [1.0, 2.0], [2.0, 1.0], [6.0, 3.0], [-4.0, 7.0]];
///
/// let mut forest = IsolationForest::new(IsolationForestParams::default().with_n_estimators(100));
/// forest.fit(&x).unwrap();
///
/// let scores = forest.score_samples(&x).unwrap();
/// assert!(scores.iter().all(|s| (-1.0..=0.0).contains(s)));
/// ```
#[derive(Debug, Clone)]
pub struct IsolationForest<F: FType> {
    params: IsolationForestParams,
    features: Option<Vec<String>>,
    forest: Option<Forest<F>>,
}

impl<F: FType> IsolationForest<F> {
    pub fn new(params: IsolationForestParams) -> Self {
        IsolationForest {
            params,
            features: None,
            forest: None,
        }
    }

    pub fn params(&self) -> &IsolationForestParams {
        &self.params
    }

    /// Feature names the model was trained on, when trained from a dataset.
    pub fn features(&self) -> Option<&[String]> {
        self.features.as_deref()
    }

    /// Score boundary separating normal records from outliers.
    pub fn offset(&self) -> Result<F> {
        Ok(self.fitted()?.offset)
    }

    /// Total number of nodes per tree.
    pub fn tree_sizes(&self) -> Vec<usize> {
        self.forest
            .as_ref()
            .map(|f| f.trees.iter().map(|t| t.n_nodes()).collect())
            .unwrap_or_default()
    }

    fn fitted(&self) -> Result<&Forest<F>> {
        self.forest.as_ref().ok_or(OutlierError::UntrainedModel)
    }

    /// Shifted scores: negative for outliers, non-negative for normal records.
    pub fn decision_function(&self, x: &Array2<F>) -> Result<Array1<F>> {
        let offset = self.fitted()?.offset;
        Ok(self.score_samples(x)? - offset)
    }

    /// Train on the projection of `dataset` onto `features`.
    pub fn fit_dataset<S: AsRef<str>>(&mut self, dataset: &Dataset<F>, features: &[S]) -> Result<()> {
        let x = dataset.select(features)?;
        self.fit(&x)?;
        self.features = Some(features.iter().map(|f| f.as_ref().to_string()).collect());
        Ok(())
    }

    /// Label and score every record of `dataset` over `features`.
    pub fn score_dataset<S: AsRef<str>>(
        &self,
        dataset: &Dataset<F>,
        features: &[S],
    ) -> Result<ScoredDataset<F>> {
        self.fitted()?;
        let x = dataset.select(features)?;
        if let Some(trained) = &self.features {
            let same = trained.len() == features.len()
                && trained.iter().zip(features).all(|(t, f)| t == f.as_ref());
            if !same {
                return Err(OutlierError::InvalidFeatureSet {
                    features: features.iter().map(|f| f.as_ref().to_string()).collect(),
                    reason: format!("model was trained on [{}]", trained.join(", ")),
                });
            }
        }
        let scores = self.score_samples(&x)?;
        let labels = self.labels_from_scores(&scores)?;
        ScoredDataset::new(dataset.clone(), labels, scores.to_vec())
    }

    fn labels_from_scores(&self, scores: &Array1<F>) -> Result<Vec<AnomalyLabel>> {
        let offset = self.fitted()?.offset;
        Ok(scores
            .iter()
            .map(|&s| {
                if s < offset {
                    AnomalyLabel::Outlier
                } else {
                    AnomalyLabel::Normal
                }
            })
            .collect())
    }
}

fn draw_rows(n_records: usize, max_samples: usize, bootstrap: bool, rng: &mut StdRng) -> Vec<usize> {
    if bootstrap {
        (0..max_samples).map(|_| rng.gen_range(0..n_records)).collect()
    } else if max_samples == n_records {
        (0..n_records).collect()
    } else {
        index::sample(rng, n_records, max_samples).into_vec()
    }
}

impl<F: FType> AnomalyDetector<F> for IsolationForest<F> {
    fn fit(&mut self, x: &Array2<F>) -> Result<()> {
        self.params.validate()?;
        let n_records = x.nrows();
        if n_records == 0 {
            return Err(OutlierError::EmptyDataset);
        }
        if x.ncols() == 0 {
            return Err(OutlierError::InvalidFeatureSet {
                features: Vec::new(),
                reason: "no features selected".to_string(),
            });
        }

        let max_samples = self.params.max_samples.resolve(n_records)?;
        let max_depth = (max_samples.max(2) as f64).log2().ceil() as usize;

        let mut rng = match self.params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        // Seeds are drawn up front so the result does not depend on thread scheduling
        let tree_seeds: Vec<u64> = (0..self.params.n_estimators).map(|_| rng.gen()).collect();
        let bootstrap = self.params.bootstrap;

        let trees: Vec<IsolationTree<F>> = tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let rows = draw_rows(n_records, max_samples, bootstrap, &mut rng);
                IsolationTree::grow(x, rows, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Forest {
            trees,
            n_features: x.ncols(),
            max_samples,
            offset: cast_f64(-0.5),
        };
        if let Contamination::Fraction(c) = self.params.contamination {
            let mut training_scores: Vec<F> = x.rows().into_iter().map(|r| forest.score_row(r)).collect();
            training_scores.sort_by(nan_last);
            forest.offset = quantile(&training_scores, cast_f64(c)).ok_or(OutlierError::EmptyDataset)?;
        }

        info!(
            n_estimators = self.params.n_estimators,
            max_samples,
            max_depth,
            n_records,
            offset = %forest.offset,
            "isolation forest trained"
        );
        self.forest = Some(forest);
        self.features = None;
        Ok(())
    }

    fn score_samples(&self, x: &Array2<F>) -> Result<Array1<F>> {
        let forest = self.fitted()?;
        if x.ncols() != forest.n_features {
            return Err(OutlierError::InvalidFeatureSet {
                features: Vec::new(),
                reason: format!(
                    "expected {} features, got {}",
                    forest.n_features,
                    x.ncols()
                ),
            });
        }
        let scores: Vec<F> = (0..x.nrows())
            .into_par_iter()
            .map(|row| forest.score_row(x.row(row)))
            .collect();
        debug!(n_records = scores.len(), "scored records");
        Ok(Array1::from(scores))
    }

    fn predict(&self, x: &Array2<F>) -> Result<Vec<AnomalyLabel>> {
        let scores = self.score_samples(x)?;
        self.labels_from_scores(&scores)
    }

    fn is_fitted(&self) -> bool {
        self.forest.is_some()
    }
}
