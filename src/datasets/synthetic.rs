use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::common::{cast_f64, Dataset, FType};
use crate::error::{OutlierError, Result};

/// Gaussian blob with a few injected outliers.
///
/// Inliers are drawn from a standard normal in every dimension; outliers are
/// drawn uniformly from `[-spread, spread]` and pushed away from the origin
/// so that each lies at least `spread / 2` from it. Outliers occupy the last
/// rows, which lets tests and benches check them by index.
///
/// # Examples
/// ```
/// use light_outliers::datasets::synthetic::Synthetic;
///
/// let blob = Synthetic::new(200, 10, 3).with_seed(7);
/// let ds = blob.generate::<f64>().unwrap();
/// assert_eq!(ds.len(), 210);
/// assert_eq!(blob.outlier_keys(), (200..210).collect::<Vec<_>>());
/// ```
#[derive(Debug, Clone)]
pub struct Synthetic {
    pub n_inliers: usize,
    pub n_outliers: usize,
    pub n_features: usize,
    pub spread: f64,
    pub seed: u64,
}

impl Synthetic {
    pub fn new(n_inliers: usize, n_outliers: usize, n_features: usize) -> Self {
        Synthetic {
            n_inliers,
            n_outliers,
            n_features,
            spread: 10.0,
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = spread;
        self
    }

    /// Feature names `x0`, `x1`, ...
    pub fn feature_names(&self) -> Vec<String> {
        (0..self.n_features).map(|i| format!("x{}", i)).collect()
    }

    pub fn outlier_keys(&self) -> Vec<usize> {
        (self.n_inliers..self.n_inliers + self.n_outliers).collect()
    }

    pub fn generate<F: FType>(&self) -> Result<Dataset<F>> {
        if self.n_features == 0 {
            return Err(OutlierError::invalid_parameter(
                "n_features",
                "must be positive",
            ));
        }
        if !(self.spread > 0.0) {
            return Err(OutlierError::invalid_parameter(
                "spread",
                format!("must be positive, got {}", self.spread),
            ));
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| OutlierError::invalid_parameter("normal", e.to_string()))?;
        let uniform = Uniform::new_inclusive(-self.spread, self.spread);

        let mut values = Vec::with_capacity((self.n_inliers + self.n_outliers) * self.n_features);
        for _ in 0..self.n_inliers {
            values.extend((0..self.n_features).map(|_| cast_f64::<F>(normal.sample(&mut rng))));
        }
        let min_norm = self.spread / 2.0;
        for _ in 0..self.n_outliers {
            let mut point: Vec<f64> = (0..self.n_features).map(|_| uniform.sample(&mut rng)).collect();
            let norm = point.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm < min_norm {
                let scale = if norm > 0.0 { min_norm / norm } else { 1.0 };
                point.iter_mut().for_each(|v| *v *= scale);
                if norm == 0.0 {
                    point[0] = min_norm;
                }
            }
            values.extend(point.into_iter().map(cast_f64::<F>));
        }

        let shape = (self.n_inliers + self.n_outliers, self.n_features);
        let values = ndarray::Array2::from_shape_vec(shape, values)
            .map_err(|e| OutlierError::invalid_parameter("shape", e.to_string()))?;
        Dataset::new(self.feature_names(), values)
    }
}
