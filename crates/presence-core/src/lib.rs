//! # Presence-Core
//!
//! Core types, error taxonomy, and the metric catalog for the Presence
//! communication-scoring engine.

pub mod catalog;
pub mod error;
pub mod types;

pub use catalog::{
    AggregationSpec, BinStat, Bucket, BucketSlope, MetricCatalog, MetricDefinition, VideoStat,
};
pub use error::{Error, Result};
pub use types::*;
