//! Metric catalog: bucket/tier definitions, aggregation dispatch tags, and
//! partition validation.
//!
//! A catalog is an immutable snapshot. Calibration produces a *new* catalog
//! via [`MetricCatalog::with_boundaries`]; scoring code never observes a
//! partially updated bucket set.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Module;

/// Per-bin statistic applied to raw samples falling in one time bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinStat {
    /// Mean of sample values (level metrics: smile intensity, speech rate)
    Mean,
    /// Variance of frame-to-frame deltas (stability/jitter metrics)
    DeltaVariance,
    /// Fraction of samples with value above 0.5 (boolean indicator metrics)
    Ratio,
}

/// Video-level reduction of the smoothed window sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStat {
    /// Mean across valid smoothed windows
    MeanOfWindows,
    /// Time-weighted ratio computed directly over valid bins, bypassing
    /// window smoothing (head-down style indicator metrics)
    TimeWeightedRatio,
}

/// How one metric's raw series is binned, smoothed, and reduced
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub bin_secs: f64,
    /// Sliding window length in bins
    pub window_bins: usize,
    /// Minimum fraction of valid bins for a window to count
    pub min_valid_fraction: f64,
    pub bin_stat: BinStat,
    pub video_stat: VideoStat,
}

impl Default for AggregationSpec {
    fn default() -> Self {
        Self {
            bin_secs: 1.0,
            window_bins: 5,
            min_valid_fraction: 0.6,
            bin_stat: BinStat::Mean,
            video_stat: VideoStat::MeanOfWindows,
        }
    }
}

impl AggregationSpec {
    pub fn mean() -> Self {
        Self::default()
    }

    pub fn jitter() -> Self {
        Self {
            bin_stat: BinStat::DeltaVariance,
            ..Self::default()
        }
    }

    pub fn indicator_ratio() -> Self {
        Self {
            bin_stat: BinStat::Ratio,
            video_stat: VideoStat::TimeWeightedRatio,
            ..Self::default()
        }
    }
}

/// Orientation of a non-optimal bucket's linear score ramp.
///
/// Derived at validation time from position relative to the optimal bucket:
/// buckets below it rise toward it, buckets above it fall away from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketSlope {
    /// Score increases with raw value
    Rising,
    /// Score decreases with raw value
    Falling,
}

/// One contiguous raw-value interval with a label and a score tier.
///
/// The raw range is `[raw_low, raw_high)`; the first bucket of a metric has
/// `raw_low = -inf` and the last has `raw_high = +inf`. Tier bounds are on
/// the 0-100 score scale and need not be ordered the same way as raw ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub label: String,
    /// serde_json writes non-finite floats as `null`; map it back to the
    /// open lower bound on deserialize so the roundtrip is lossless.
    #[serde(deserialize_with = "null_as_neg_infinity")]
    pub raw_low: f64,
    /// See `raw_low`: `null` maps back to the open upper bound.
    #[serde(deserialize_with = "null_as_infinity")]
    pub raw_high: f64,
    pub tier_low: f64,
    pub tier_high: f64,
    pub is_optimal: bool,
    #[serde(default = "default_slope")]
    pub slope: BucketSlope,
}

fn default_slope() -> BucketSlope {
    BucketSlope::Rising
}

fn null_as_neg_infinity<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
}

fn null_as_infinity<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

impl Bucket {
    pub fn contains(&self, raw: f64) -> bool {
        self.raw_low <= raw && raw < self.raw_high
    }

    pub fn tier(&self) -> (f64, f64) {
        (self.tier_low, self.tier_high)
    }

    pub fn tier_midpoint(&self) -> f64 {
        (self.tier_low + self.tier_high) / 2.0
    }

    /// Finite width, or `None` for an open-ended bucket
    pub fn width(&self) -> Option<f64> {
        if self.raw_low.is_finite() && self.raw_high.is_finite() {
            Some(self.raw_high - self.raw_low)
        } else {
            None
        }
    }
}

/// Immutable definition of one metric: unit, bucket partition, aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: String,
    pub module: Module,
    pub unit: String,
    /// Ordered by raw value; validated to tile the whole real line
    pub buckets: Vec<Bucket>,
    pub aggregation: AggregationSpec,
}

impl MetricDefinition {
    /// Index of the bucket whose raw range contains `raw`.
    ///
    /// Binary search over the validated partition; total for finite input.
    pub fn bucket_index_for(&self, raw: f64) -> usize {
        // partition_point returns the count of buckets entirely below raw
        let idx = self.buckets.partition_point(|b| b.raw_high <= raw);
        idx.min(self.buckets.len() - 1)
    }

    pub fn bucket_for(&self, raw: f64) -> &Bucket {
        &self.buckets[self.bucket_index_for(raw)]
    }

    pub fn optimal_index(&self) -> usize {
        self.buckets
            .iter()
            .position(|b| b.is_optimal)
            .expect("validated catalog has an optimal bucket")
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.buckets
            .iter()
            .position(|b| b.label.eq_ignore_ascii_case(label))
    }

    /// Ordinal encoding of a label for rank correlation: the bucket's tier
    /// midpoint, which re-orders the worst-best-worst label sequence
    /// monotonically by desirability.
    pub fn ordinal_for_label(&self, label: &str) -> Option<f64> {
        self.label_index(label).map(|i| self.buckets[i].tier_midpoint())
    }

    /// Whether two labels sit on opposite flanks of the optimal bucket with
    /// low tiers. Confusing one for the other is the worst kind of error a
    /// calibration can make.
    pub fn are_opposite_labels(&self, a: &str, b: &str) -> bool {
        let (Some(ia), Some(ib)) = (self.label_index(a), self.label_index(b)) else {
            return false;
        };
        if ia == ib {
            return false;
        }
        let opt = self.optimal_index();
        let opposite_sides = (ia < opt && ib > opt) || (ia > opt && ib < opt);
        opposite_sides
            && self.buckets[ia].tier_midpoint() < 50.0
            && self.buckets[ib].tier_midpoint() < 50.0
    }

    /// The interior cut points between adjacent buckets, low to high
    pub fn boundaries(&self) -> Vec<f64> {
        self.buckets[..self.buckets.len() - 1]
            .iter()
            .map(|b| b.raw_high)
            .collect()
    }

    fn validate(&self) -> Result<()> {
        let err = |reason: String| Error::Catalog {
            metric: self.id.clone(),
            reason,
        };

        if self.buckets.len() < 2 {
            return Err(err("needs at least two buckets".into()));
        }
        if self.buckets.first().unwrap().raw_low != f64::NEG_INFINITY {
            return Err(err("first bucket must be open below".into()));
        }
        if self.buckets.last().unwrap().raw_high != f64::INFINITY {
            return Err(err("last bucket must be open above".into()));
        }

        let mut labels: Vec<&str> = Vec::with_capacity(self.buckets.len());
        for (i, b) in self.buckets.iter().enumerate() {
            if !(b.raw_low < b.raw_high) {
                return Err(err(format!("bucket '{}' has empty raw range", b.label)));
            }
            if i > 0 && self.buckets[i - 1].raw_high != b.raw_low {
                return Err(err(format!(
                    "gap or overlap between '{}' and '{}'",
                    self.buckets[i - 1].label,
                    b.label
                )));
            }
            if !(0.0..=100.0).contains(&b.tier_low)
                || !(0.0..=100.0).contains(&b.tier_high)
                || b.tier_low > b.tier_high
            {
                return Err(err(format!("bucket '{}' has invalid tier", b.label)));
            }
            if labels.iter().any(|l| l.eq_ignore_ascii_case(&b.label)) {
                return Err(err(format!("duplicate label '{}'", b.label)));
            }
            labels.push(&b.label);
        }

        let optimal_count = self.buckets.iter().filter(|b| b.is_optimal).count();
        if optimal_count != 1 {
            return Err(err(format!("expected 1 optimal bucket, found {optimal_count}")));
        }
        let opt = self.buckets.iter().position(|b| b.is_optimal).unwrap();
        if self.buckets[opt].width().is_none() {
            return Err(err("optimal bucket must be bounded on both sides".into()));
        }

        if !(self.aggregation.bin_secs > 0.0) {
            return Err(err("bin_secs must be positive".into()));
        }
        if self.aggregation.window_bins == 0 {
            return Err(err("window_bins must be positive".into()));
        }

        Ok(())
    }

    /// Orient every non-optimal bucket's ramp toward the optimal bucket
    fn derive_slopes(&mut self) {
        let opt = self.optimal_index();
        for (i, b) in self.buckets.iter_mut().enumerate() {
            b.slope = if i <= opt {
                BucketSlope::Rising
            } else {
                BucketSlope::Falling
            };
        }
    }
}

/// Validated, read-only collection of metric definitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricCatalog {
    metrics: Vec<MetricDefinition>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl MetricCatalog {
    /// Validate definitions and derive bucket slopes. Fails fast on any
    /// partition violation.
    pub fn new(mut metrics: Vec<MetricDefinition>) -> Result<Self> {
        for m in &mut metrics {
            m.validate()?;
            m.derive_slopes();
        }
        let index = Self::build_index(&metrics);
        Ok(Self { metrics, index })
    }

    fn build_index(metrics: &[MetricDefinition]) -> HashMap<String, usize> {
        metrics
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect()
    }

    pub fn get(&self, metric_id: &str) -> Result<&MetricDefinition> {
        self.index
            .get(metric_id)
            .map(|&i| &self.metrics[i])
            .ok_or_else(|| Error::UnknownMetric {
                id: metric_id.to_string(),
            })
    }

    pub fn contains(&self, metric_id: &str) -> bool {
        self.index.contains_key(metric_id)
    }

    pub fn metrics(&self) -> &[MetricDefinition] {
        &self.metrics
    }

    pub fn metrics_for(&self, module: Module) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.iter().filter(move |m| m.module == module)
    }

    /// Build a new catalog version with the given metric's interior cut
    /// points replaced. Bucket count, labels, and tiers are unchanged. This
    /// is the only way a calibration result becomes live.
    pub fn with_boundaries(&self, metric_id: &str, boundaries: &[f64]) -> Result<Self> {
        let def = self.get(metric_id)?;
        if boundaries.len() != def.buckets.len() - 1 {
            return Err(Error::Catalog {
                metric: metric_id.to_string(),
                reason: format!(
                    "expected {} boundaries, got {}",
                    def.buckets.len() - 1,
                    boundaries.len()
                ),
            });
        }

        let mut metrics = self.metrics.clone();
        let def = &mut metrics[self.index[metric_id]];
        for (i, b) in def.buckets.iter_mut().enumerate() {
            if i > 0 {
                b.raw_low = boundaries[i - 1];
            }
            if i < boundaries.len() {
                b.raw_high = boundaries[i];
            }
        }
        Self::new(metrics)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: MetricCatalog = serde_json::from_str(json)?;
        Self::new(raw.metrics)
    }
}

impl Default for MetricCatalog {
    /// The built-in catalog: fourteen empirically calibrated metrics across
    /// face, body, and audio.
    fn default() -> Self {
        Self::new(default_metrics()).expect("built-in catalog is valid")
    }
}

/// Shorthand bucket row: (label, upper bound, tier_low, tier_high, optimal)
type BucketRow = (&'static str, f64, f64, f64, bool);

fn buckets(rows: &[BucketRow]) -> Vec<Bucket> {
    let mut out = Vec::with_capacity(rows.len());
    let mut low = f64::NEG_INFINITY;
    for &(label, max, tier_low, tier_high, is_optimal) in rows {
        out.push(Bucket {
            label: label.to_string(),
            raw_low: low,
            raw_high: max,
            tier_low,
            tier_high,
            is_optimal,
            slope: BucketSlope::Rising,
        });
        low = max;
    }
    out
}

fn metric(
    id: &str,
    module: Module,
    unit: &str,
    aggregation: AggregationSpec,
    rows: &[BucketRow],
) -> MetricDefinition {
    MetricDefinition {
        id: id.to_string(),
        module,
        unit: unit.to_string(),
        buckets: buckets(rows),
        aggregation,
    }
}

const INF: f64 = f64::INFINITY;

fn default_metrics() -> Vec<MetricDefinition> {
    vec![
        // ---- Face ----
        metric(
            "head_stability",
            Module::Face,
            "iod/sec",
            AggregationSpec::mean(),
            &[
                ("rigid", 0.60, 0.0, 40.0, false),
                ("stable", 1.00, 60.0, 80.0, false),
                ("optimal", 2.00, 80.0, 100.0, true),
                ("high", 3.00, 40.0, 60.0, false),
                ("distracting", INF, 0.0, 40.0, false),
            ],
        ),
        metric(
            "gaze_stability",
            Module::Face,
            "variance",
            AggregationSpec::jitter(),
            &[
                ("fixed", 0.02, 60.0, 80.0, false),
                ("optimal", 0.08, 80.0, 100.0, true),
                ("good", 0.15, 60.0, 80.0, false),
                ("weak", 0.22, 40.0, 60.0, false),
                ("poor", INF, 0.0, 40.0, false),
            ],
        ),
        metric(
            "smile_activation",
            Module::Face,
            "ratio",
            AggregationSpec::mean(),
            &[
                ("flat", 0.74, 0.0, 40.0, false),
                ("neutral", 0.76, 40.0, 80.0, false),
                ("optimal", 0.80, 80.0, 100.0, true),
                ("excessive", INF, 40.0, 80.0, false),
            ],
        ),
        metric(
            "head_down_ratio",
            Module::Face,
            "ratio",
            AggregationSpec::indicator_ratio(),
            &[
                ("locked", 0.02, 60.0, 80.0, false),
                ("forward", 0.10, 80.0, 100.0, true),
                ("occasional", 0.25, 60.0, 80.0, false),
                ("frequent", 0.45, 40.0, 60.0, false),
                ("down", INF, 0.0, 40.0, false),
            ],
        ),
        // ---- Body ----
        metric(
            "gesture_magnitude",
            Module::Body,
            "sw",
            AggregationSpec::mean(),
            &[
                ("very_low", 1.2, 0.0, 40.0, false),
                ("low", 2.0, 40.0, 60.0, false),
                ("optimal", 3.0, 80.0, 100.0, true),
                ("high", 3.5, 40.0, 60.0, false),
                ("very_high", INF, 0.0, 40.0, false),
            ],
        ),
        metric(
            "gesture_activity",
            Module::Body,
            "sw/sec",
            AggregationSpec::mean(),
            &[
                ("very_low", 1.0, 0.0, 40.0, false),
                ("low", 2.5, 40.0, 60.0, false),
                ("optimal", 5.0, 80.0, 100.0, true),
                ("high", 7.5, 40.0, 60.0, false),
                ("very_high", INF, 0.0, 40.0, false),
            ],
        ),
        metric(
            "gesture_stability",
            Module::Body,
            "variance",
            AggregationSpec::jitter(),
            &[
                ("frozen", 0.5, 60.0, 80.0, false),
                ("optimal", 5.0, 80.0, 100.0, true),
                ("good", 12.0, 60.0, 80.0, false),
                ("high", 20.0, 40.0, 60.0, false),
                ("very_high", INF, 0.0, 40.0, false),
            ],
        ),
        metric(
            "body_sway",
            Module::Body,
            "sw/sec",
            AggregationSpec::mean(),
            &[
                ("rigid", 0.30, 0.0, 40.0, false),
                ("stable", 0.55, 60.0, 80.0, false),
                ("optimal", 1.00, 80.0, 100.0, true),
                ("unstable", 1.30, 40.0, 60.0, false),
                ("distracting", INF, 0.0, 40.0, false),
            ],
        ),
        metric(
            "posture_openness",
            Module::Body,
            "score",
            AggregationSpec::mean(),
            &[
                ("closed", 0.3, 0.0, 40.0, false),
                ("neutral", 0.7, 40.0, 60.0, false),
                ("open", 1.3, 80.0, 100.0, true),
                ("exaggerated", INF, 40.0, 80.0, false),
            ],
        ),
        // ---- Audio ----
        metric(
            "speech_rate",
            Module::Audio,
            "wpm",
            AggregationSpec::mean(),
            &[
                ("very_slow", 100.0, 0.0, 40.0, false),
                ("slow", 120.0, 40.0, 80.0, false),
                ("optimal", 170.0, 80.0, 100.0, true),
                ("fast", 190.0, 60.0, 80.0, false),
                ("rushed", 210.0, 40.0, 60.0, false),
                ("overwhelming", INF, 0.0, 40.0, false),
            ],
        ),
        metric(
            "pause_ratio",
            Module::Audio,
            "ratio",
            AggregationSpec::indicator_ratio(),
            &[
                ("no_pauses", 0.02, 40.0, 60.0, false),
                ("low_pauses", 0.04, 60.0, 80.0, false),
                ("optimal", 0.08, 80.0, 100.0, true),
                ("frequent_pauses", 0.12, 60.0, 80.0, false),
                ("disjointed", 0.18, 40.0, 60.0, false),
                ("fragmented", INF, 0.0, 40.0, false),
            ],
        ),
        metric(
            "pitch_dynamic",
            Module::Audio,
            "semitones",
            AggregationSpec::mean(),
            &[
                ("robotic", 1.5, 0.0, 40.0, false),
                ("flat", 2.0, 40.0, 80.0, false),
                ("optimal", 4.5, 80.0, 100.0, true),
                ("theatrical", 6.0, 60.0, 80.0, false),
                ("exaggerated", INF, 0.0, 60.0, false),
            ],
        ),
        metric(
            "volume_dynamic",
            Module::Audio,
            "cv",
            AggregationSpec::mean(),
            &[
                ("monotone", 0.55, 0.0, 40.0, false),
                ("reserved", 0.65, 40.0, 80.0, false),
                ("optimal", 0.75, 80.0, 100.0, true),
                ("expressive", 0.85, 60.0, 80.0, false),
                ("unstable", INF, 0.0, 60.0, false),
            ],
        ),
        metric(
            "vocal_punch",
            Module::Audio,
            "db",
            AggregationSpec::mean(),
            &[
                ("muffled", 14.0, 0.0, 40.0, false),
                ("soft", 17.0, 40.0, 80.0, false),
                ("optimal", 21.0, 80.0, 100.0, true),
                ("strong", 24.0, 60.0, 80.0, false),
                ("aggressive", INF, 0.0, 60.0, false),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_valid() {
        let catalog = MetricCatalog::default();
        assert_eq!(catalog.metrics().len(), 14);
        assert!(catalog.contains("head_stability"));
        assert!(catalog.contains("vocal_punch"));
    }

    #[test]
    fn test_bucket_lookup() {
        let catalog = MetricCatalog::default();
        let def = catalog.get("head_stability").unwrap();

        assert_eq!(def.bucket_for(-5.0).label, "rigid");
        assert_eq!(def.bucket_for(0.59).label, "rigid");
        assert_eq!(def.bucket_for(0.60).label, "stable");
        assert_eq!(def.bucket_for(1.5).label, "optimal");
        assert_eq!(def.bucket_for(2.5).label, "high");
        assert_eq!(def.bucket_for(100.0).label, "distracting");
    }

    #[test]
    fn test_slopes_derived() {
        let catalog = MetricCatalog::default();
        let def = catalog.get("head_stability").unwrap();
        let opt = def.optimal_index();

        for (i, b) in def.buckets.iter().enumerate() {
            if i < opt {
                assert_eq!(b.slope, BucketSlope::Rising, "{}", b.label);
            } else if i > opt {
                assert_eq!(b.slope, BucketSlope::Falling, "{}", b.label);
            }
        }
    }

    #[test]
    fn test_unknown_metric() {
        let catalog = MetricCatalog::default();
        assert!(matches!(
            catalog.get("nonexistent"),
            Err(Error::UnknownMetric { .. })
        ));
    }

    #[test]
    fn test_gapped_partition_rejected() {
        let mut defs = default_metrics();
        defs[0].buckets[1].raw_low = 0.55; // introduce a gap
        assert!(matches!(
            MetricCatalog::new(defs),
            Err(Error::Catalog { .. })
        ));
    }

    #[test]
    fn test_unbounded_optimal_rejected() {
        let mut defs = default_metrics();
        // make the last bucket optimal (open above)
        let n = defs[0].buckets.len();
        defs[0].buckets[2].is_optimal = false;
        defs[0].buckets[n - 1].is_optimal = true;
        assert!(matches!(
            MetricCatalog::new(defs),
            Err(Error::Catalog { .. })
        ));
    }

    #[test]
    fn test_with_boundaries_versioning() {
        let catalog = MetricCatalog::default();
        let original = catalog.get("head_stability").unwrap().boundaries();

        let shifted: Vec<f64> = original.iter().map(|b| b + 0.05).collect();
        let updated = catalog.with_boundaries("head_stability", &shifted).unwrap();

        // new version carries the shift; the old snapshot is untouched
        assert_eq!(updated.get("head_stability").unwrap().boundaries(), shifted);
        assert_eq!(catalog.get("head_stability").unwrap().boundaries(), original);
    }

    #[test]
    fn test_opposite_labels() {
        let catalog = MetricCatalog::default();
        let def = catalog.get("head_stability").unwrap();

        assert!(def.are_opposite_labels("rigid", "distracting"));
        assert!(!def.are_opposite_labels("rigid", "stable"));
        assert!(!def.are_opposite_labels("optimal", "distracting"));
        assert!(!def.are_opposite_labels("rigid", "rigid"));
    }

    #[test]
    fn test_ordinal_encoding() {
        let catalog = MetricCatalog::default();
        let def = catalog.get("speech_rate").unwrap();

        let slow = def.ordinal_for_label("slow").unwrap();
        let optimal = def.ordinal_for_label("optimal").unwrap();
        let overwhelming = def.ordinal_for_label("overwhelming").unwrap();

        assert!(optimal > slow);
        assert!(optimal > overwhelming);
        assert!(def.ordinal_for_label("bogus").is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let catalog = MetricCatalog::default();
        let json = catalog.to_json().unwrap();
        let restored = MetricCatalog::from_json(&json).unwrap();
        assert_eq!(restored.metrics().len(), catalog.metrics().len());
        assert!(restored.contains("pause_ratio"));
    }
}
