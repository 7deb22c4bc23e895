//! Fundamental types for the Presence scoring engine.

use serde::{Deserialize, Serialize};

/// Signal source module for a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Face,
    Body,
    Audio,
}

impl Module {
    pub fn name(&self) -> &'static str {
        match self {
            Module::Face => "face",
            Module::Body => "body",
            Module::Audio => "audio",
        }
    }
}

/// One raw measurement from an external extractor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Seconds from the start of the video
    pub timestamp: f64,
    pub value: f64,
}

impl RawSample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Time-ordered raw signal for one metric of one video.
///
/// Produced by the face/body/audio extractors; read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSeries {
    pub metric_id: String,
    /// Declared video duration in seconds
    pub duration_secs: f64,
    pub samples: Vec<RawSample>,
}

impl RawSeries {
    pub fn new(metric_id: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            metric_id: metric_id.into(),
            duration_secs,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, timestamp: f64, value: f64) {
        self.samples.push(RawSample::new(timestamp, value));
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

/// One smoothed sliding-window value for a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateWindow {
    pub start_sec: f64,
    pub end_sec: f64,
    pub value: f64,
}

impl AggregateWindow {
    pub fn new(start_sec: f64, end_sec: f64, value: f64) -> Self {
        Self {
            start_sec,
            end_sec,
            value,
        }
    }

    /// Whether this window covers the given second, `[start, end)`
    pub fn covers(&self, second: f64) -> bool {
        self.start_sec <= second && second < self.end_sec
    }
}

/// Scored result for one metric of one video.
///
/// Invariant: `score` always lies inside the tier of the bucket that
/// produced `label`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub metric_id: String,
    pub raw_value: f64,
    pub label: String,
    /// Score in [0, 100]
    pub score: f64,
    /// The matched bucket's guaranteed score range
    pub tier: (f64, f64),
}

/// Coarse quality band for a module-level summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreBand {
    Excellent,
    Good,
    NeedsWork,
}

impl ScoreBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            ScoreBand::Excellent
        } else if score >= 50.0 {
            ScoreBand::Good
        } else {
            ScoreBand::NeedsWork
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScoreBand::Excellent => "Excellent communication. High presence and control.",
            ScoreBand::Good => "Good communication. Balanced and effective.",
            ScoreBand::NeedsWork => "Needs improvement. Signals may be weak or distracting.",
        }
    }
}

/// Mean score across a module's scored metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub module: Module,
    pub score: f64,
    pub band: ScoreBand,
    /// Metrics that contributed to the mean
    pub scored: usize,
    /// Metrics skipped for insufficient data
    pub skipped: usize,
}

/// Human-supplied ground-truth label for one metric of one video.
///
/// Never mutated by the engine, only read by the calibration search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub video_id: String,
    pub metric_id: String,
    pub human_label: String,
}

impl ManifestEntry {
    pub fn new(
        video_id: impl Into<String>,
        metric_id: impl Into<String>,
        human_label: impl Into<String>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            metric_id: metric_id.into(),
            human_label: human_label.into(),
        }
    }
}

/// Ordered per-video feature values for clustering.
///
/// Values are raw video-level aggregates; standardization happens inside the
/// persona model so the scaler travels with the centroids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub video_id: String,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(video_id: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            video_id: video_id.into(),
            values,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}
