pub mod anomaly;
pub mod common;
pub mod datasets;
pub mod error;
pub mod partition;
pub mod plot;
pub mod stream;
pub mod trimming;
