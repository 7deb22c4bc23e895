//! Windowing and aggregation of raw per-frame signals.
//!
//! Three stages, all deterministic:
//! 1. Binning: the video duration is tiled with fixed-size bins and a
//!    per-bin statistic is computed (mean, delta-variance, or ratio).
//!    A bin with no samples is missing, never zero.
//! 2. Smoothing: a sliding window (stride one bin) averages the valid bins;
//!    a window below the minimum valid fraction is dropped.
//! 3. Video-level reduction: mean across windows, or a time-weighted ratio
//!    computed directly over the bins for indicator metrics.

use presence_core::{
    AggregateWindow, AggregationSpec, BinStat, Error, MetricDefinition, RawSeries, Result,
    VideoStat,
};

/// Aggregates one metric's raw series according to its [`AggregationSpec`]
#[derive(Debug, Clone)]
pub struct Aggregator {
    spec: AggregationSpec,
}

impl Aggregator {
    pub fn new(spec: AggregationSpec) -> Self {
        Self { spec }
    }

    pub fn for_metric(def: &MetricDefinition) -> Self {
        Self::new(def.aggregation)
    }

    pub fn spec(&self) -> &AggregationSpec {
        &self.spec
    }

    /// Per-bin statistics over the series; `None` marks an empty bin.
    pub fn bins(&self, series: &RawSeries) -> Result<Vec<Option<f64>>> {
        self.check_domain(series)?;

        let bin = self.spec.bin_secs;
        if series.duration_secs < bin {
            return Err(Error::InsufficientData {
                metric: series.metric_id.clone(),
                what: "seconds",
                required: bin.ceil() as usize,
                available: series.duration_secs.floor() as usize,
            });
        }

        let n_bins = (series.duration_secs / bin).floor() as usize;
        let mut grouped: Vec<Vec<f64>> = vec![Vec::new(); n_bins];
        for s in &series.samples {
            // a sample at exactly t == duration lands in the last bin
            let idx = ((s.timestamp / bin) as usize).min(n_bins - 1);
            grouped[idx].push(s.value);
        }

        Ok(grouped
            .iter()
            .map(|values| bin_statistic(self.spec.bin_stat, values))
            .collect())
    }

    /// Smoothed sliding-window sequence. Errors if the series is too short
    /// for a single window or no window meets the validity threshold.
    pub fn windows(&self, series: &RawSeries) -> Result<Vec<AggregateWindow>> {
        let bins = self.bins(series)?;
        let w = self.spec.window_bins;

        if bins.len() < w {
            return Err(Error::InsufficientData {
                metric: series.metric_id.clone(),
                what: "bins",
                required: w,
                available: bins.len(),
            });
        }

        let min_valid = (self.spec.min_valid_fraction * w as f64).ceil() as usize;
        let mut out = Vec::with_capacity(bins.len() - w + 1);

        for start in 0..=(bins.len() - w) {
            let slice = &bins[start..start + w];
            let valid: Vec<f64> = slice.iter().filter_map(|b| *b).collect();
            if valid.len() < min_valid.max(1) {
                continue;
            }
            let value = valid.iter().sum::<f64>() / valid.len() as f64;
            out.push(AggregateWindow::new(
                start as f64 * self.spec.bin_secs,
                (start + w) as f64 * self.spec.bin_secs,
                value,
            ));
        }

        if out.is_empty() {
            return Err(Error::InsufficientData {
                metric: series.metric_id.clone(),
                what: "valid windows",
                required: 1,
                available: 0,
            });
        }
        Ok(out)
    }

    /// Single scalar for scoring and feature building
    pub fn video_aggregate(&self, series: &RawSeries) -> Result<f64> {
        match self.spec.video_stat {
            VideoStat::MeanOfWindows => {
                let windows = self.windows(series)?;
                Ok(windows.iter().map(|w| w.value).sum::<f64>() / windows.len() as f64)
            }
            VideoStat::TimeWeightedRatio => {
                // bins are equal-duration, so the time weighting reduces to a
                // mean over valid bins
                let bins = self.bins(series)?;
                let valid: Vec<f64> = bins.iter().filter_map(|b| *b).collect();
                if valid.is_empty() {
                    return Err(Error::InsufficientData {
                        metric: series.metric_id.clone(),
                        what: "valid bins",
                        required: 1,
                        available: 0,
                    });
                }
                Ok(valid.iter().sum::<f64>() / valid.len() as f64)
            }
        }
    }

    fn check_domain(&self, series: &RawSeries) -> Result<()> {
        if !(series.duration_secs > 0.0) {
            return Err(Error::Domain(format!(
                "non-positive duration {} for metric {}",
                series.duration_secs, series.metric_id
            )));
        }
        if series.is_empty() {
            return Err(Error::InsufficientData {
                metric: series.metric_id.clone(),
                what: "samples",
                required: 1,
                available: 0,
            });
        }

        let mut prev = f64::NEG_INFINITY;
        for s in &series.samples {
            if s.timestamp < 0.0 || s.timestamp > series.duration_secs {
                return Err(Error::Domain(format!(
                    "timestamp {} outside video duration {} for metric {}",
                    s.timestamp, series.duration_secs, series.metric_id
                )));
            }
            if s.timestamp < prev {
                return Err(Error::Domain(format!(
                    "unordered timestamps for metric {}",
                    series.metric_id
                )));
            }
            prev = s.timestamp;
        }
        Ok(())
    }
}

fn bin_statistic(stat: BinStat, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    match stat {
        BinStat::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
        BinStat::DeltaVariance => {
            if values.len() < 2 {
                return None;
            }
            let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
            let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
            let var =
                deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / deltas.len() as f64;
            Some(var)
        }
        BinStat::Ratio => {
            let hits = values.iter().filter(|&&v| v > 0.5).count();
            Some(hits as f64 / values.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::RawSeries;

    fn fps_series(metric: &str, duration: f64, fps: usize, f: impl Fn(f64) -> f64) -> RawSeries {
        let mut s = RawSeries::new(metric, duration);
        let n = (duration * fps as f64) as usize;
        for i in 0..n {
            let t = i as f64 / fps as f64;
            s.push(t, f(t));
        }
        s
    }

    #[test]
    fn test_mean_bins() {
        let series = fps_series("head_stability", 10.0, 10, |_| 1.5);
        let agg = Aggregator::new(AggregationSpec::mean());

        let bins = agg.bins(&series).unwrap();
        assert_eq!(bins.len(), 10);
        for b in bins {
            assert!((b.unwrap() - 1.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_empty_bin_is_missing_not_zero() {
        let mut series = RawSeries::new("smile_activation", 10.0);
        // samples only in seconds 0..3 and 6..10
        for i in 0..30 {
            series.push(i as f64 * 0.1, 0.8);
        }
        for i in 60..100 {
            series.push(i as f64 * 0.1, 0.8);
        }
        let agg = Aggregator::new(AggregationSpec::mean());

        let bins = agg.bins(&series).unwrap();
        assert!(bins[3].is_none());
        assert!(bins[4].is_none());
        assert!(bins[5].is_none());
        assert!(bins[0].is_some());
        assert!(bins[9].is_some());
    }

    #[test]
    fn test_delta_variance_of_constant_signal_is_zero() {
        let series = fps_series("gaze_stability", 6.0, 20, |_| 0.3);
        let agg = Aggregator::new(AggregationSpec::jitter());

        let bins = agg.bins(&series).unwrap();
        for b in bins {
            assert!(b.unwrap().abs() < 1e-12);
        }
    }

    #[test]
    fn test_delta_variance_detects_jitter() {
        let noisy = fps_series("gaze_stability", 6.0, 20, |t| {
            if (t * 20.0) as usize % 2 == 0 {
                1.0
            } else {
                -1.0
            }
        });
        let smooth = fps_series("gaze_stability", 6.0, 20, |t| t * 0.01);
        let agg = Aggregator::new(AggregationSpec::jitter());

        let noisy_val = agg.video_aggregate(&noisy).unwrap();
        let smooth_val = agg.video_aggregate(&smooth).unwrap();
        assert!(noisy_val > smooth_val);
    }

    #[test]
    fn test_indicator_ratio() {
        // head down for the first 2 of 8 seconds
        let series = fps_series("head_down_ratio", 8.0, 10, |t| if t < 2.0 { 1.0 } else { 0.0 });
        let agg = Aggregator::new(AggregationSpec::indicator_ratio());

        let ratio = agg.video_aggregate(&series).unwrap();
        assert!((ratio - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_window_smoothing() {
        let series = fps_series("head_stability", 10.0, 10, |t| t.floor());
        let agg = Aggregator::new(AggregationSpec::mean());

        let windows = agg.windows(&series).unwrap();
        assert_eq!(windows.len(), 6); // 10 bins, window of 5, stride 1
        // first window covers bins 0..5 with values 0,1,2,3,4
        assert!((windows[0].value - 2.0).abs() < 1e-12);
        assert_eq!(windows[0].start_sec, 0.0);
        assert_eq!(windows[0].end_sec, 5.0);
    }

    #[test]
    fn test_sparse_window_excluded() {
        let mut series = RawSeries::new("head_stability", 10.0);
        // only seconds 0 and 9 have data: every window has 1-2 valid bins
        series.push(0.5, 1.0);
        series.push(9.5, 1.0);
        let agg = Aggregator::new(AggregationSpec::mean());

        assert!(matches!(
            agg.windows(&series),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_too_short_series() {
        let mut series = RawSeries::new("head_stability", 0.5);
        series.push(0.1, 1.0);
        let agg = Aggregator::new(AggregationSpec::mean());

        assert!(matches!(
            agg.bins(&series),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_domain_rejections() {
        let agg = Aggregator::new(AggregationSpec::mean());

        let mut out_of_range = RawSeries::new("head_stability", 5.0);
        out_of_range.push(6.0, 1.0);
        assert!(matches!(agg.bins(&out_of_range), Err(Error::Domain(_))));

        let mut negative = RawSeries::new("head_stability", -3.0);
        negative.push(0.0, 1.0);
        assert!(matches!(agg.bins(&negative), Err(Error::Domain(_))));

        let mut unordered = RawSeries::new("head_stability", 5.0);
        unordered.push(2.0, 1.0);
        unordered.push(1.0, 1.0);
        assert!(matches!(agg.bins(&unordered), Err(Error::Domain(_))));
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let series = fps_series("head_stability", 30.0, 25, |t| 1.0 + (t * 0.7).sin());
        let agg = Aggregator::new(AggregationSpec::mean());

        let a = agg.windows(&series).unwrap();
        let b = agg.windows(&series).unwrap();
        assert_eq!(a, b);

        let va = agg.video_aggregate(&series).unwrap();
        let vb = agg.video_aggregate(&series).unwrap();
        assert_eq!(va.to_bits(), vb.to_bits());
    }
}
