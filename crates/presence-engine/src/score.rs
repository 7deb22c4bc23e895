//! Tiered scoring: map one aggregate value to a (label, score) pair.
//!
//! The score is guaranteed to lie inside the matched bucket's tier, and as a
//! function of the raw value it is unimodal with its unique maximum at the
//! optimal bucket's center: an inverted parabola inside the optimal bucket,
//! linear ramps oriented toward it everywhere else.
//!
//! Open-ended edge buckets have no finite width for the ramp; the decay span
//! is borrowed from the adjacent bounded bucket, and values more than one
//! span past the finite edge saturate at the far tier bound.

use presence_core::{
    Bucket, BucketSlope, MetricCatalog, MetricDefinition, Module, ModuleSummary, Result,
    ScoreBand, ScoreResult,
};

/// Score a raw aggregate against the catalog.
///
/// Fails only with `UnknownMetric`; total over all finite raw values.
pub fn score(catalog: &MetricCatalog, metric_id: &str, raw_value: f64) -> Result<ScoreResult> {
    let def = catalog.get(metric_id)?;
    Ok(score_metric(def, raw_value))
}

/// Score against a single metric definition
pub fn score_metric(def: &MetricDefinition, raw_value: f64) -> ScoreResult {
    let idx = def.bucket_index_for(raw_value);
    let bucket = &def.buckets[idx];

    let score = if bucket.is_optimal {
        optimal_score(bucket, raw_value)
    } else {
        ramp_score(def, idx, raw_value)
    };

    ScoreResult {
        metric_id: def.id.clone(),
        raw_value,
        label: bucket.label.clone(),
        score: score.clamp(bucket.tier_low, bucket.tier_high),
        tier: bucket.tier(),
    }
}

/// Inverted parabola: peak at the bucket center, tier_low at both edges
fn optimal_score(bucket: &Bucket, raw: f64) -> f64 {
    // validation guarantees the optimal bucket is bounded
    let center = (bucket.raw_low + bucket.raw_high) / 2.0;
    let half_width = (bucket.raw_high - bucket.raw_low) / 2.0;
    let d = ((raw - center) / half_width).clamp(-1.0, 1.0);
    bucket.tier_high - d * d * (bucket.tier_high - bucket.tier_low)
}

/// Linear ramp oriented so the side nearer the optimal bucket gets tier_high
fn ramp_score(def: &MetricDefinition, idx: usize, raw: f64) -> f64 {
    let bucket = &def.buckets[idx];
    let span = bucket.tier_high - bucket.tier_low;

    match bucket.width() {
        Some(width) => {
            let p = ((raw - bucket.raw_low) / width).clamp(0.0, 1.0);
            match bucket.slope {
                BucketSlope::Rising => bucket.tier_low + p * span,
                BucketSlope::Falling => bucket.tier_high - p * span,
            }
        }
        None => {
            // edge bucket: measure distance past the finite edge in units of
            // the neighbor's width, saturating at the far tier bound
            let (edge, decay) = if bucket.raw_low.is_finite() {
                (bucket.raw_low, neighbor_width(def, idx - 1))
            } else {
                (bucket.raw_high, neighbor_width(def, idx + 1))
            };
            let q = ((raw - edge).abs() / decay).clamp(0.0, 1.0);
            // both edge buckets slope away from the optimal interior
            bucket.tier_high - q * span
        }
    }
}

fn neighbor_width(def: &MetricDefinition, neighbor: usize) -> f64 {
    // a validated catalog always has a bounded neighbor next to an edge
    // bucket; the fallback keeps the function total regardless
    def.buckets.get(neighbor).and_then(Bucket::width).unwrap_or(1.0)
}

/// Mean score over one module's results, with a coarse band.
///
/// `skipped` counts the module's metrics that produced no score (insufficient
/// data); they are excluded from the mean, never defaulted. Returns `None`
/// when nothing in the module could be scored.
pub fn module_summary(
    catalog: &MetricCatalog,
    module: Module,
    results: &[ScoreResult],
) -> Option<ModuleSummary> {
    let module_scores: Vec<f64> = results
        .iter()
        .filter(|r| {
            catalog
                .get(&r.metric_id)
                .map(|d| d.module == module)
                .unwrap_or(false)
        })
        .map(|r| r.score)
        .collect();

    if module_scores.is_empty() {
        return None;
    }

    let total = catalog.metrics_for(module).count();
    let score = module_scores.iter().sum::<f64>() / module_scores.len() as f64;
    Some(ModuleSummary {
        module,
        score,
        band: ScoreBand::from_score(score),
        scored: module_scores.len(),
        skipped: total - module_scores.len(),
    })
}
