//! # Presence-Engine
//!
//! The processing pipeline of the Presence scoring system: windowed
//! aggregation of raw per-frame signals, tiered scoring against the metric
//! catalog, boundary calibration against human-labeled manifests, and
//! persona clustering over per-video feature vectors.
//!
//! Raw signals come from external face/body/audio extractors; this crate
//! starts at timestamped samples and ends at scores, labels, calibrated
//! catalogs, and persona assignments.

pub mod aggregate;
pub mod calibrate;
pub mod persona;
pub mod score;

pub use aggregate::Aggregator;
pub use calibrate::{
    Agreement, CalibrationCandidate, ObjectiveWeights, SearchOptions, search,
};
pub use persona::{FeatureSpec, FitOptions, Persona, PersonaModel};
pub use score::{module_summary, score, score_metric};
