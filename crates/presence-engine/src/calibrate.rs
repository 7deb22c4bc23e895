//! Boundary calibration against human-labeled manifests.
//!
//! A deterministic coordinate-descent search over one metric's interior cut
//! points. Each boundary may move only within the midpoints to its original
//! neighbors, so bucket ordering and identity are preserved and no bucket can
//! be squeezed out of existence. The search starts from the current cuts and
//! only accepts improvements, so the result never scores worse than the
//! catalog it started from.

use std::collections::HashMap;

use presence_core::{Error, MetricCatalog, MetricDefinition, ManifestEntry, Result};
use tracing::{debug, info};

/// Relative weights of the agreement components in the search objective
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveWeights {
    /// Predicted label equals the human label
    pub exact: f64,
    /// Predicted label within one bucket of the human label
    pub adjacent: f64,
    /// Spearman rank correlation between predicted and human ordinals
    pub rank: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            exact: 0.6,
            adjacent: 0.2,
            rank: 0.2,
        }
    }
}

/// Tuning knobs for [`search`]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Minimum usable manifest rows; below this the search refuses to run
    pub min_entries: usize,
    /// Maximum full coordinate-descent passes
    pub max_iterations: usize,
    /// Trial offsets per boundary per direction
    pub steps_per_boundary: usize,
    /// Minimum objective gain to accept a move
    pub tolerance: f64,
    pub weights: ObjectiveWeights,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_entries: 5,
            max_iterations: 20,
            steps_per_boundary: 4,
            tolerance: 1e-6,
            weights: ObjectiveWeights::default(),
        }
    }
}

/// How well a boundary set reproduces the human labels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Agreement {
    pub exact_rate: f64,
    /// Exact or one bucket off
    pub within_one_rate: f64,
    /// Predictions on the wrong flank of the optimal bucket
    pub opposite_rate: f64,
    /// Spearman correlation of predicted vs human ordinals; 0.0 when either
    /// side has no variance
    pub rank_correlation: f64,
    /// Manifest rows that contributed
    pub evaluated: usize,
}

/// Outcome of a calibration search for one metric.
///
/// Carries both the found boundaries and the baseline they were measured
/// against; the caller decides whether the gain justifies adopting them via
/// [`MetricCatalog::with_boundaries`].
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCandidate {
    pub metric_id: String,
    pub boundaries: Vec<f64>,
    pub agreement: Agreement,
    pub objective: f64,
    pub baseline: Agreement,
    pub baseline_objective: f64,
}

impl CalibrationCandidate {
    pub fn is_improvement(&self) -> bool {
        self.objective > self.baseline_objective
    }

    pub fn gain(&self) -> f64 {
        self.objective - self.baseline_objective
    }
}

/// One usable manifest row: the video's aggregate and the human bucket index
#[derive(Debug, Clone, Copy)]
struct LabeledPoint {
    aggregate: f64,
    human_index: usize,
}

/// Search for boundaries that better reproduce the human labels.
///
/// `aggregates` maps video id to the metric's video-level aggregate. Manifest
/// rows for other metrics, rows with labels the metric does not define, and
/// rows without an aggregate are skipped; if fewer than
/// `opts.min_entries` rows remain the search fails with
/// `InsufficientCalibrationData` rather than overfit a handful of points.
pub fn search(
    catalog: &MetricCatalog,
    metric_id: &str,
    manifest: &[ManifestEntry],
    aggregates: &HashMap<String, f64>,
    opts: &SearchOptions,
) -> Result<CalibrationCandidate> {
    let def = catalog.get(metric_id)?;
    let points = collect_points(def, manifest, aggregates);

    if points.len() < opts.min_entries {
        return Err(Error::InsufficientCalibrationData {
            metric: metric_id.to_string(),
            required: opts.min_entries,
            available: points.len(),
        });
    }

    let original = def.boundaries();
    let bounds = boundary_bounds(&original);

    let baseline = evaluate(def, &original, &points);
    let baseline_objective = objective(&baseline, &opts.weights);

    let mut current = original.clone();
    let mut best_objective = baseline_objective;

    for pass in 0..opts.max_iterations {
        let mut improved = false;

        for i in 0..current.len() {
            let (lo, hi) = bounds[i];
            let mut best_value = current[i];

            for candidate in trial_values(current[i], lo, hi, opts.steps_per_boundary) {
                let mut trial = current.clone();
                trial[i] = candidate;
                let score = objective(&evaluate(def, &trial, &points), &opts.weights);
                if score > best_objective + opts.tolerance {
                    best_objective = score;
                    best_value = candidate;
                }
            }

            if best_value != current[i] {
                debug!(
                    metric = metric_id,
                    boundary = i,
                    from = current[i],
                    to = best_value,
                    objective = best_objective,
                    "boundary moved"
                );
                current[i] = best_value;
                improved = true;
            }
        }

        if !improved {
            debug!(metric = metric_id, pass, "search converged");
            break;
        }
    }

    let agreement = evaluate(def, &current, &points);
    info!(
        metric = metric_id,
        evaluated = agreement.evaluated,
        baseline = baseline_objective,
        objective = best_objective,
        "calibration search finished"
    );

    Ok(CalibrationCandidate {
        metric_id: metric_id.to_string(),
        boundaries: current,
        agreement,
        objective: best_objective,
        baseline,
        baseline_objective,
    })
}

fn collect_points(
    def: &MetricDefinition,
    manifest: &[ManifestEntry],
    aggregates: &HashMap<String, f64>,
) -> Vec<LabeledPoint> {
    manifest
        .iter()
        .filter(|e| e.metric_id == def.id)
        .filter_map(|e| {
            let aggregate = *aggregates.get(&e.video_id)?;
            let human_index = def.label_index(&e.human_label)?;
            Some(LabeledPoint {
                aggregate,
                human_index,
            })
        })
        .collect()
}

/// Allowed interval for each cut: midpoints to the original neighbor cuts,
/// with the outermost intervals extended by half the adjacent gap.
fn boundary_bounds(original: &[f64]) -> Vec<(f64, f64)> {
    let n = original.len();
    (0..n)
        .map(|i| {
            let lo = if i == 0 {
                let gap = if n > 1 {
                    original[1] - original[0]
                } else {
                    original[0].abs().max(1.0)
                };
                original[0] - gap / 2.0
            } else {
                (original[i - 1] + original[i]) / 2.0
            };
            let hi = if i == n - 1 {
                let gap = if n > 1 {
                    original[n - 1] - original[n - 2]
                } else {
                    original[n - 1].abs().max(1.0)
                };
                original[n - 1] + gap / 2.0
            } else {
                (original[i] + original[i + 1]) / 2.0
            };
            (lo, hi)
        })
        .collect()
}

/// Evenly spaced trial offsets toward each bound, never reaching it
fn trial_values(center: f64, lo: f64, hi: f64, steps: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(2 * steps);
    for k in 1..=steps {
        let f = k as f64 / (steps + 1) as f64;
        out.push(center - f * (center - lo));
        out.push(center + f * (hi - center));
    }
    out
}

fn predicted_index(boundaries: &[f64], aggregate: f64) -> usize {
    boundaries.partition_point(|&c| c <= aggregate)
}

fn evaluate(def: &MetricDefinition, boundaries: &[f64], points: &[LabeledPoint]) -> Agreement {
    let n = points.len();
    let mut exact = 0usize;
    let mut within_one = 0usize;
    let mut opposite = 0usize;
    let mut predicted_ord = Vec::with_capacity(n);
    let mut human_ord = Vec::with_capacity(n);

    for p in points {
        let pred = predicted_index(boundaries, p.aggregate);
        if pred == p.human_index {
            exact += 1;
        }
        if pred.abs_diff(p.human_index) <= 1 {
            within_one += 1;
        }
        if def.are_opposite_labels(&def.buckets[pred].label, &def.buckets[p.human_index].label) {
            opposite += 1;
        }
        predicted_ord.push(def.buckets[pred].tier_midpoint());
        human_ord.push(def.buckets[p.human_index].tier_midpoint());
    }

    Agreement {
        exact_rate: exact as f64 / n as f64,
        within_one_rate: within_one as f64 / n as f64,
        opposite_rate: opposite as f64 / n as f64,
        rank_correlation: spearman(&predicted_ord, &human_ord),
        evaluated: n,
    }
}

fn objective(a: &Agreement, w: &ObjectiveWeights) -> f64 {
    w.exact * a.exact_rate + w.adjacent * a.within_one_rate + w.rank * a.rank_correlation
}

/// Spearman correlation: Pearson on average ranks, 0.0 on zero variance
fn spearman(a: &[f64], b: &[f64]) -> f64 {
    let ra = average_ranks(a);
    let rb = average_ranks(b);
    pearson(&ra, &rb)
}

fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // ties share the average of the ranks they span
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    cov / (var_a * var_b).sqrt()
}
