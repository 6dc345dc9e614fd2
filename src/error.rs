//! Error types shared by every stage of the outlier pipeline.

use thiserror::Error;

/// Errors raised by trimming, scoring, partitioning and plotting.
#[derive(Debug, Error)]
pub enum OutlierError {
    #[error("Invalid feature: '{0}' is not a column of the dataset")]
    InvalidFeature(String),

    #[error("Invalid feature set: {reason} ({})", .features.join(", "))]
    InvalidFeatureSet {
        features: Vec<String>,
        reason: String,
    },

    #[error("Model not trained: call fit() before scoring")]
    UntrainedModel,

    #[error("Invalid {kind} mode: '{value}'")]
    InvalidMode { kind: &'static str, value: String },

    #[error("Empty dataset: at least one record is required")]
    EmptyDataset,

    #[error("Invalid parameter: {name} - {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Download error: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl OutlierError {
    pub(crate) fn missing_features(features: Vec<String>) -> Self {
        OutlierError::InvalidFeatureSet {
            features,
            reason: "not present in dataset".to_string(),
        }
    }

    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        OutlierError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for outlier detection operations.
pub type Result<T> = std::result::Result<T, OutlierError>;
