//! Persona clustering: seeded k-means over standardized behavioral features.
//!
//! The model carries its own scaler (per-feature mean and standard deviation)
//! so assignment of a new video standardizes with the statistics of the fit
//! population, never its own. Everything downstream of the seed is
//! deterministic: same vectors, same options, same model.

use std::collections::HashMap;

use presence_core::{Error, FeatureVector, MetricCatalog, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Ordered list of metric ids that make up a clustering feature vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub metric_ids: Vec<String>,
}

impl Default for FeatureSpec {
    /// The seven behavioral axes that separate presentation styles
    fn default() -> Self {
        Self {
            metric_ids: [
                "gesture_activity",
                "posture_openness",
                "body_sway",
                "speech_rate",
                "head_stability",
                "smile_activation",
                "pitch_dynamic",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl FeatureSpec {
    pub fn dim(&self) -> usize {
        self.metric_ids.len()
    }

    /// Build one video's feature vector from its video-level aggregates.
    ///
    /// Values are placed in spec order. Every metric must be present; a
    /// missing one fails rather than silently imputing.
    pub fn build_vector(
        &self,
        catalog: &MetricCatalog,
        video_id: &str,
        aggregates: &HashMap<String, f64>,
    ) -> Result<FeatureVector> {
        let mut values = Vec::with_capacity(self.metric_ids.len());
        for id in &self.metric_ids {
            catalog.get(id)?;
            let value = aggregates.get(id).ok_or_else(|| Error::InsufficientData {
                metric: id.clone(),
                what: "video aggregate",
                required: 1,
                available: 0,
            })?;
            values.push(*value);
        }
        Ok(FeatureVector::new(video_id, values))
    }
}

/// Fit parameters for [`PersonaModel::fit`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    pub k: usize,
    /// Independent seeded restarts; the lowest-inertia run wins
    pub restarts: usize,
    /// Lloyd iteration cap per restart
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            k: 4,
            restarts: 50,
            max_iterations: 100,
            seed: 42,
        }
    }
}

/// A named cluster with its defining traits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// e.g. "High gesture_activity, Low head_stability"
    pub name: String,
    /// Up to three strongest trait descriptions, strongest first
    pub traits: Vec<String>,
}

/// Fitted clustering model: scaler, centroids, and persona names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaModel {
    pub feature_ids: Vec<String>,
    /// Per-feature mean of the fit population
    pub means: Vec<f64>,
    /// Per-feature standard deviation of the fit population
    pub stds: Vec<f64>,
    /// Centroids in standardized space, one row per cluster
    pub centroids: Vec<Vec<f64>>,
    pub personas: Vec<Persona>,
    /// Within-cluster sum of squares of the winning restart
    pub inertia: f64,
}

impl PersonaModel {
    /// Fit `k` personas over the given vectors.
    ///
    /// Runs `restarts` independent seeded k-means initializations and keeps
    /// the lowest-inertia run whose clusters are all non-empty. Increasing
    /// `restarts` with everything else fixed can only keep or improve the
    /// winning inertia. Fails with `DegenerateClustering` when no restart
    /// produces `k` non-empty clusters.
    pub fn fit(spec: &FeatureSpec, vectors: &[FeatureVector], opts: &FitOptions) -> Result<Self> {
        let dim = spec.dim();
        if opts.k == 0 {
            return Err(Error::Domain("k must be positive".into()));
        }
        if vectors.len() < opts.k {
            return Err(Error::InsufficientData {
                metric: "persona_features".into(),
                what: "feature vectors",
                required: opts.k,
                available: vectors.len(),
            });
        }
        for v in vectors {
            if v.dim() != dim {
                return Err(Error::Domain(format!(
                    "feature vector for {} has dim {}, expected {dim}",
                    v.video_id,
                    v.dim()
                )));
            }
        }

        let (means, stds) = scaler(vectors, dim);
        let data: Vec<Vec<f64>> = vectors
            .iter()
            .map(|v| standardize(&v.values, &means, &stds))
            .collect();

        let mut best: Option<(Vec<Vec<f64>>, f64)> = None;
        for r in 0..opts.restarts {
            let mut rng = StdRng::seed_from_u64(opts.seed.wrapping_add(r as u64));
            match lloyd(&data, opts.k, opts.max_iterations, &mut rng) {
                Some((centroids, inertia)) => {
                    let better = best
                        .as_ref()
                        .map(|(_, best_inertia)| inertia < *best_inertia)
                        .unwrap_or(true);
                    if better {
                        debug!(restart = r, inertia, "new best clustering");
                        best = Some((centroids, inertia));
                    }
                }
                None => debug!(restart = r, "degenerate restart discarded"),
            }
        }

        let (centroids, inertia) = best.ok_or(Error::DegenerateClustering {
            cluster: 0,
            k: opts.k,
        })?;

        let personas = centroids
            .iter()
            .map(|c| name_persona(&spec.metric_ids, c))
            .collect();

        info!(
            k = opts.k,
            vectors = vectors.len(),
            inertia,
            "persona model fitted"
        );

        Ok(Self {
            feature_ids: spec.metric_ids.clone(),
            means,
            stds,
            centroids,
            personas,
            inertia,
        })
    }

    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    /// Index of the nearest persona; ties resolve to the lowest index
    pub fn assign(&self, vector: &FeatureVector) -> Result<usize> {
        if vector.dim() != self.feature_ids.len() {
            return Err(Error::Domain(format!(
                "feature vector for {} has dim {}, expected {}",
                vector.video_id,
                vector.dim(),
                self.feature_ids.len()
            )));
        }
        let z = standardize(&vector.values, &self.means, &self.stds);
        Ok(nearest(&self.centroids, &z).0)
    }

    pub fn persona_for(&self, vector: &FeatureVector) -> Result<&Persona> {
        Ok(&self.personas[self.assign(vector)?])
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn scaler(vectors: &[FeatureVector], dim: usize) -> (Vec<f64>, Vec<f64>) {
    let n = vectors.len() as f64;
    let mut means = vec![0.0; dim];
    for v in vectors {
        for (m, x) in means.iter_mut().zip(&v.values) {
            *m += x;
        }
    }
    for m in &mut means {
        *m /= n;
    }

    let mut stds = vec![0.0; dim];
    for v in vectors {
        for ((s, x), m) in stds.iter_mut().zip(&v.values).zip(&means) {
            *s += (x - m).powi(2);
        }
    }
    for s in &mut stds {
        *s = (*s / n).sqrt();
        // constant features pass through unscaled
        if *s < 1e-12 {
            *s = 1.0;
        }
    }
    (means, stds)
}

fn standardize(values: &[f64], means: &[f64], stds: &[f64]) -> Vec<f64> {
    values
        .iter()
        .zip(means)
        .zip(stds)
        .map(|((x, m), s)| (x - m) / s)
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(centroids: &[Vec<f64>], point: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(c, point);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// One k-means run: random distinct points as initial centroids, then Lloyd
/// iterations to convergence or the cap. Returns `None` when the final
/// assignment leaves a cluster empty.
fn lloyd(
    data: &[Vec<f64>],
    k: usize,
    max_iterations: usize,
    rng: &mut StdRng,
) -> Option<(Vec<Vec<f64>>, f64)> {
    let mut indices: Vec<usize> = (0..data.len()).collect();
    indices.shuffle(rng);
    let mut centroids: Vec<Vec<f64>> = indices[..k].iter().map(|&i| data[i].clone()).collect();

    let mut assignment = vec![0usize; data.len()];
    for _ in 0..max_iterations {
        let mut changed = false;
        for (i, point) in data.iter().enumerate() {
            let (c, _) = nearest(&centroids, point);
            if assignment[i] != c {
                assignment[i] = c;
                changed = true;
            }
        }

        let dim = centroids[0].len();
        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (point, &c) in data.iter().zip(&assignment) {
            counts[c] += 1;
            for (s, x) in sums[c].iter_mut().zip(point) {
                *s += x;
            }
        }
        for c in 0..k {
            // an empty cluster keeps its previous centroid mid-run
            if counts[c] > 0 {
                for s in &mut sums[c] {
                    *s /= counts[c] as f64;
                }
                centroids[c] = std::mem::take(&mut sums[c]);
            }
        }

        if !changed {
            break;
        }
    }

    let mut counts = vec![0usize; k];
    let mut inertia = 0.0;
    for (point, &c) in data.iter().zip(&assignment) {
        counts[c] += 1;
        inertia += squared_distance(point, &centroids[c]);
    }
    if counts.iter().any(|&c| c == 0) {
        return None;
    }
    Some((centroids, inertia))
}

/// Name a persona from its centroid's strongest standardized deviations:
/// "High x, Low y" from the top two, plus up to three trait strings.
fn name_persona(feature_ids: &[String], centroid: &[f64]) -> Persona {
    let mut ranked: Vec<(usize, f64)> = centroid
        .iter()
        .copied()
        .enumerate()
        .collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

    let describe = |&(i, z): &(usize, f64)| {
        let direction = if z >= 0.0 { "High" } else { "Low" };
        format!("{direction} {}", feature_ids[i])
    };

    let traits: Vec<String> = ranked.iter().take(3).map(describe).collect();
    let name = ranked.iter().take(2).map(describe).collect::<Vec<_>>().join(", ");

    Persona { name, traits }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec2() -> FeatureSpec {
        FeatureSpec {
            metric_ids: vec!["gesture_activity".into(), "head_stability".into()],
        }
    }

    /// Two tight blobs far apart in both features
    fn blobs() -> Vec<FeatureVector> {
        let mut vectors = Vec::new();
        for i in 0..6 {
            let jitter = i as f64 * 0.01;
            vectors.push(FeatureVector::new(
                format!("lo{i}"),
                vec![1.0 + jitter, 0.5 + jitter],
            ));
            vectors.push(FeatureVector::new(
                format!("hi{i}"),
                vec![6.0 + jitter, 2.5 + jitter],
            ));
        }
        vectors
    }

    #[test]
    fn test_fit_separates_blobs() {
        let vectors = blobs();
        let opts = FitOptions {
            k: 2,
            ..FitOptions::default()
        };
        let model = PersonaModel::fit(&spec2(), &vectors, &opts).unwrap();

        assert_eq!(model.k(), 2);
        let lo = model.assign(&vectors[0]).unwrap();
        let hi = model.assign(&vectors[1]).unwrap();
        assert_ne!(lo, hi);
        // every lo vector lands with lo, every hi vector with hi
        for v in &vectors {
            let c = model.assign(v).unwrap();
            if v.video_id.starts_with("lo") {
                assert_eq!(c, lo);
            } else {
                assert_eq!(c, hi);
            }
        }
    }

    #[test]
    fn test_fit_is_deterministic() {
        let vectors = blobs();
        let opts = FitOptions {
            k: 2,
            ..FitOptions::default()
        };
        let a = PersonaModel::fit(&spec2(), &vectors, &opts).unwrap();
        let b = PersonaModel::fit(&spec2(), &vectors, &opts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_more_restarts_never_worse() {
        let vectors = blobs();
        let few = FitOptions {
            k: 2,
            restarts: 3,
            ..FitOptions::default()
        };
        let many = FitOptions {
            k: 2,
            restarts: 30,
            ..FitOptions::default()
        };
        let a = PersonaModel::fit(&spec2(), &vectors, &few).unwrap();
        let b = PersonaModel::fit(&spec2(), &vectors, &many).unwrap();
        assert!(b.inertia <= a.inertia);
    }

    #[test]
    fn test_identical_points_are_degenerate() {
        let vectors: Vec<FeatureVector> = (0..8)
            .map(|i| FeatureVector::new(format!("v{i}"), vec![1.0, 1.0]))
            .collect();
        let opts = FitOptions {
            k: 3,
            restarts: 5,
            ..FitOptions::default()
        };
        assert!(matches!(
            PersonaModel::fit(&spec2(), &vectors, &opts),
            Err(Error::DegenerateClustering { .. })
        ));
    }

    #[test]
    fn test_too_few_vectors() {
        let vectors = vec![FeatureVector::new("v0", vec![1.0, 2.0])];
        let opts = FitOptions {
            k: 4,
            ..FitOptions::default()
        };
        assert!(matches!(
            PersonaModel::fit(&spec2(), &vectors, &opts),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_build_vector_order_and_missing() {
        let catalog = MetricCatalog::default();
        let spec = spec2();
        let aggregates: HashMap<String, f64> = [
            ("head_stability".to_string(), 1.4),
            ("gesture_activity".to_string(), 4.2),
        ]
        .into();

        let v = spec.build_vector(&catalog, "v1", &aggregates).unwrap();
        assert_eq!(v.values, vec![4.2, 1.4]);

        let missing: HashMap<String, f64> =
            [("gesture_activity".to_string(), 4.2)].into();
        assert!(matches!(
            spec.build_vector(&catalog, "v1", &missing),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_persona_naming() {
        let ids = vec![
            "gesture_activity".to_string(),
            "head_stability".to_string(),
            "speech_rate".to_string(),
        ];
        let p = name_persona(&ids, &[1.8, -1.2, 0.1]);
        assert_eq!(p.name, "High gesture_activity, Low head_stability");
        assert_eq!(p.traits.len(), 3);
        assert_eq!(p.traits[2], "High speech_rate");
    }

    #[test]
    fn test_saved_model_assigns_identically() {
        let vectors = blobs();
        let opts = FitOptions {
            k: 2,
            ..FitOptions::default()
        };
        let model = PersonaModel::fit(&spec2(), &vectors, &opts).unwrap();
        let restored = PersonaModel::from_json(&model.to_json().unwrap()).unwrap();
        for v in &vectors {
            assert_eq!(model.assign(v).unwrap(), restored.assign(v).unwrap());
        }
    }

    #[test]
    fn test_assign_rejects_wrong_dim() {
        let vectors = blobs();
        let opts = FitOptions {
            k: 2,
            ..FitOptions::default()
        };
        let model = PersonaModel::fit(&spec2(), &vectors, &opts).unwrap();
        let bad = FeatureVector::new("v", vec![1.0]);
        assert!(matches!(model.assign(&bad), Err(Error::Domain(_))));
    }
}
