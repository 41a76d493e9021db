use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::percentile::PercentileTracker;

/// Why a finished request's log line was kept or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingReason {
    Error,
    Slow,
    Random,
    /// Baseline bucket: dropped in production, kept unconditionally in development.
    All,
}

impl SamplingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingReason::Error => "error",
            SamplingReason::Slow => "slow",
            SamplingReason::Random => "random",
            SamplingReason::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingDecision {
    pub should_log: bool,
    pub reason: SamplingReason,
}

impl SamplingDecision {
    pub const fn keep(reason: SamplingReason) -> Self {
        Self {
            should_log: true,
            reason,
        }
    }

    pub const fn drop_baseline() -> Self {
        Self {
            should_log: false,
            reason: SamplingReason::All,
        }
    }
}

/// Final facts the policy decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOutcome {
    pub status_code: u16,
    pub duration_ms: u64,
}

/// Log severity, both as the `LOG_LEVEL` floor and as the emission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// 5xx is `Error`, 4xx is `Warn`, everything else `Info`.
    pub fn for_status(status_code: u16) -> Self {
        if status_code >= 500 {
            Severity::Error
        } else if status_code >= 400 {
            Severity::Warn
        } else {
            Severity::Info
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(Severity::Debug),
            "info" => Some(Severity::Info),
            "warn" | "warning" => Some(Severity::Warn),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingMode {
    /// Tail sampling: errors and slow requests always, the baseline at `sample_rate`.
    Production,
    /// Keep everything.
    Development,
}

/// Tail sampling policy over a shared [`PercentileTracker`].
#[derive(Debug, Clone)]
pub struct SamplingPolicy {
    tracker: Arc<PercentileTracker>,
    sample_rate: f64,
    mode: SamplingMode,
}

impl SamplingPolicy {
    pub fn new(tracker: Arc<PercentileTracker>, sample_rate: f64, mode: SamplingMode) -> Self {
        Self {
            tracker,
            sample_rate: sample_rate.clamp(0.0, 1.0),
            mode,
        }
    }

    pub fn tracker(&self) -> &Arc<PercentileTracker> {
        &self.tracker
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    pub fn decide(&self, outcome: RequestOutcome) -> SamplingDecision {
        self.decide_with(outcome, &mut rand::thread_rng())
    }

    pub fn decide_with<R: Rng + ?Sized>(&self, outcome: RequestOutcome, rng: &mut R) -> SamplingDecision {
        match self.mode {
            SamplingMode::Production => self.production_decision(outcome, rng),
            SamplingMode::Development => Self::development_decision(outcome),
        }
    }

    /// Ordered checks: error, then slow, then the random draw.
    ///
    /// Errors never reach the tracker; slow and baseline requests both feed it.
    pub fn production_decision<R: Rng + ?Sized>(&self, outcome: RequestOutcome, rng: &mut R) -> SamplingDecision {
        if outcome.status_code >= 400 {
            return SamplingDecision::keep(SamplingReason::Error);
        }

        if outcome.duration_ms > self.tracker.threshold() {
            self.tracker.update(outcome.duration_ms);
            return SamplingDecision::keep(SamplingReason::Slow);
        }

        self.tracker.update(outcome.duration_ms);

        let draw: f64 = rng.gen();
        if draw < self.sample_rate {
            SamplingDecision::keep(SamplingReason::Random)
        } else {
            SamplingDecision::drop_baseline()
        }
    }

    pub fn development_decision(_outcome: RequestOutcome) -> SamplingDecision {
        SamplingDecision::keep(SamplingReason::All)
    }
}
