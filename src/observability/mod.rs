//! Request observability: per-request log context and tail sampling.
//!
//! ```text
//! request start ──▶ LogContext created (middleware::request_log)
//!      │
//!      ▼
//! collaborators enrich it (enrich::*, log::*) through the task-local store
//!      │
//!      ▼
//! completion ──▶ SamplingPolicy (error > slow > random) ──▶ Emitter ──▶ LogSink
//!                      │
//!                      └── PercentileTracker (shared p99 threshold)
//! ```

pub mod context;
pub mod enrich;
pub mod filter;
pub mod log;
pub mod logger;
pub mod percentile;
pub mod sampling;
pub mod sink;
pub mod store;

use std::sync::Arc;

use crate::config::AppConfig;

pub use context::{ContextPatch, ErrorDetails, LogContext, OrgIdentity, TraceEntry, TraceLevel, UserIdentity};
pub use enrich::{add_org_context, add_user_context, increment_db_queries, record_error, set_impersonation, trace};
pub use filter::RequestFilter;
pub use percentile::{PercentileSettings, PercentileTracker};
pub use sampling::{RequestOutcome, SamplingDecision, SamplingMode, SamplingPolicy, SamplingReason, Severity};
pub use sink::{Emitter, JsonLinesSink, LogSink, MemorySink, ObservabilityError, RequestRecord, TracingSink};
pub use store::{
    current_handle, get_request_context, run_with_context, run_with_context_sync, set_request_context,
    spawn_with_context, RequestHandle,
};

/// Process-wide observability state, constructed once and shared by reference.
#[derive(Debug, Clone)]
pub struct Observability {
    pub policy: SamplingPolicy,
    pub filter: RequestFilter,
    pub emitter: Emitter,
    pub enabled: bool,
}

impl Observability {
    pub fn new(policy: SamplingPolicy, filter: RequestFilter, emitter: Emitter) -> Self {
        Self {
            policy,
            filter,
            emitter,
            enabled: true,
        }
    }

    /// Wire the tracker, policy, filter and emitter from configuration.
    pub fn from_config(config: &AppConfig, sink: Arc<dyn LogSink>) -> Self {
        let sampling = &config.sampling;
        let tracker = Arc::new(PercentileTracker::new(PercentileSettings {
            capacity: sampling.window_capacity,
            recompute_interval: sampling.recompute_interval,
            percentile: sampling.percentile,
            initial_threshold_ms: sampling.initial_threshold_ms,
        }));
        let mode = if sampling.keep_all {
            SamplingMode::Development
        } else {
            SamplingMode::Production
        };

        let filter = RequestFilter {
            include_prefixes: config.api.log_include_prefixes.clone(),
            exclude_paths: config.api.log_exclude_paths.clone(),
            exclude_extensions: config.api.log_exclude_extensions.clone(),
        };

        Self {
            policy: SamplingPolicy::new(tracker, sampling.sample_rate, mode),
            filter,
            emitter: Emitter::new(sink, config.is_development()),
            enabled: config.api.enable_request_logging,
        }
    }

    pub fn tracker(&self) -> &Arc<PercentileTracker> {
        self.policy.tracker()
    }

    pub fn should_track(&self, path: &str) -> bool {
        self.enabled && self.filter.should_track(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_production_config() {
        let obs = Observability::from_config(&AppConfig::production(), Arc::new(MemorySink::new()));
        assert_eq!(obs.policy.mode(), SamplingMode::Production);
        assert_eq!(obs.policy.sample_rate(), 0.05);
        assert_eq!(obs.tracker().threshold(), 1_000);
        assert!(!obs.emitter.is_development());
        assert!(obs.should_track("/api/orgs/acme/todos"));
    }

    #[test]
    fn test_development_keeps_all_and_disabled_tracks_nothing() {
        let mut config = AppConfig::development();
        config.api.enable_request_logging = false;
        let obs = Observability::from_config(&config, Arc::new(MemorySink::new()));
        assert_eq!(obs.policy.mode(), SamplingMode::Development);
        assert!(obs.emitter.is_development());
        assert!(!obs.should_track("/api/orgs/acme/todos"));
    }
}
