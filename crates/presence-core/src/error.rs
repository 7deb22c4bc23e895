//! Error types for the Presence scoring engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Metric id not present in the catalog. This is a configuration or
    /// programming error, not a data error; callers should treat it as fatal.
    #[error("unknown metric: {id}")]
    UnknownMetric { id: String },

    /// Catalog failed validation (gapped or overlapping buckets, bad tiers,
    /// missing or unbounded optimal bucket). Fatal.
    #[error("invalid catalog for metric {metric}: {reason}")]
    Catalog { metric: String, reason: String },

    /// Not enough raw signal to aggregate. Recoverable: callers may skip the
    /// metric and report "insufficient data" instead of a fabricated score.
    #[error("insufficient data for metric {metric}: need {required} {what}, have {available}")]
    InsufficientData {
        metric: String,
        what: &'static str,
        required: usize,
        available: usize,
    },

    /// Too few human-labeled manifest rows to run a calibration search.
    #[error("insufficient calibration data for metric {metric}: need {required} entries, have {available}")]
    InsufficientCalibrationData {
        metric: String,
        required: usize,
        available: usize,
    },

    /// Clustering produced an empty cluster.
    #[error("degenerate clustering: cluster {cluster} of {k} is empty")]
    DegenerateClustering { cluster: usize, k: usize },

    /// Input rejected at the aggregator boundary (negative duration,
    /// timestamps outside the declared duration, unordered samples).
    #[error("domain error: {0}")]
    Domain(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
