use std::collections::VecDeque;

use parking_lot::Mutex;

/// Tuning for [`PercentileTracker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileSettings {
    /// Maximum samples kept; the oldest is evicted first.
    pub capacity: usize,
    /// Recompute when the window length is a positive multiple of this.
    pub recompute_interval: usize,
    /// Quantile in `[0, 1)`, 0.99 for p99.
    pub percentile: f64,
    /// Threshold reported until the first recomputation.
    pub initial_threshold_ms: u64,
}

impl Default for PercentileSettings {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            recompute_interval: 100,
            percentile: 0.99,
            initial_threshold_ms: 1_000,
        }
    }
}

/// Moving p99 of request durations, used as the adaptive slow-request cutoff.
///
/// One instance is shared by every request in the process. The sample window and
/// the cached threshold sit behind a single lock so that updates from concurrent
/// worker threads never interleave a push with a recomputation.
#[derive(Debug)]
pub struct PercentileTracker {
    settings: PercentileSettings,
    inner: Mutex<TrackerInner>,
}

#[derive(Debug)]
struct TrackerInner {
    durations: VecDeque<u64>,
    threshold_ms: u64,
    recomputations: u64,
}

impl PercentileTracker {
    pub fn new(settings: PercentileSettings) -> Self {
        let settings = PercentileSettings {
            capacity: settings.capacity.max(1),
            recompute_interval: settings.recompute_interval.max(1),
            percentile: settings.percentile.clamp(0.0, 1.0),
            initial_threshold_ms: settings.initial_threshold_ms,
        };

        Self {
            inner: Mutex::new(TrackerInner {
                durations: VecDeque::with_capacity(settings.capacity),
                threshold_ms: settings.initial_threshold_ms,
                recomputations: 0,
            }),
            settings,
        }
    }

    pub fn settings(&self) -> &PercentileSettings {
        &self.settings
    }

    /// Append a sample and recompute the threshold at interval boundaries.
    pub fn update(&self, duration_ms: u64) {
        let mut inner = self.inner.lock();

        if inner.durations.len() >= self.settings.capacity {
            inner.durations.pop_front();
        }
        inner.durations.push_back(duration_ms);

        let len = inner.durations.len();
        let interval = self.settings.recompute_interval;
        if len >= interval && len % interval == 0 {
            let mut sorted: Vec<u64> = inner.durations.iter().copied().collect();
            sorted.sort_unstable();

            let index = (len as f64 * self.settings.percentile).floor() as usize;
            // Quantiles at 1.0 land one past the end; keep the old threshold then.
            if let Some(&value) = sorted.get(index) {
                inner.threshold_ms = value;
            }
            inner.recomputations += 1;

            tracing::trace!(
                samples = len,
                threshold_ms = inner.threshold_ms,
                "recomputed slow-request threshold"
            );
        }
    }

    pub fn threshold(&self) -> u64 {
        self.inner.lock().threshold_ms
    }

    pub fn sample_count(&self) -> usize {
        self.inner.lock().durations.len()
    }

    pub fn recomputations(&self) -> u64 {
        self.inner.lock().recomputations
    }
}

impl Default for PercentileTracker {
    fn default() -> Self {
        Self::new(PercentileSettings::default())
    }
}
