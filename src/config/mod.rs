use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

use crate::observability::Severity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub logging: LoggingConfig,
    pub sampling: SamplingConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum severity written by the subscriber (`LOG_LEVEL`).
    pub level: Severity,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Probability of keeping a fast, successful request.
    pub sample_rate: f64,
    pub initial_threshold_ms: u64,
    pub window_capacity: usize,
    pub recompute_interval: usize,
    pub percentile: f64,
    /// Keep every request (development behaviour).
    pub keep_all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub log_include_prefixes: Vec<String>,
    pub log_exclude_paths: Vec<String>,
    pub log_exclude_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(|key| env::var(key).ok())
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Apply per-key overrides on top of a preset. `lookup` is `env::var` in
    /// production and a fixed map in tests.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        // Logging overrides
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = Severity::parse(&v).unwrap_or(self.logging.level);
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            self.logging.json = match v.trim().to_ascii_lowercase().as_str() {
                "json" => true,
                "pretty" | "text" => false,
                _ => self.logging.json,
            };
        }

        // Sampling overrides
        if let Some(v) = lookup("LOG_SAMPLE_RATE") {
            self.sampling.sample_rate = v.trim().parse::<f64>().ok()
                .filter(|rate| rate.is_finite())
                .map(|rate| rate.clamp(0.0, 1.0))
                .unwrap_or(self.sampling.sample_rate);
        }
        if let Some(v) = lookup("LOG_SLOW_THRESHOLD_MS") {
            self.sampling.initial_threshold_ms = v.trim().parse().unwrap_or(self.sampling.initial_threshold_ms);
        }
        if let Some(v) = lookup("LOG_PERCENTILE_WINDOW") {
            self.sampling.window_capacity = v.trim().parse().unwrap_or(self.sampling.window_capacity);
        }
        if let Some(v) = lookup("LOG_PERCENTILE_INTERVAL") {
            self.sampling.recompute_interval = v.trim().parse().unwrap_or(self.sampling.recompute_interval);
        }
        if let Some(v) = lookup("LOG_SAMPLE_ALL") {
            self.sampling.keep_all = v.trim().parse().unwrap_or(self.sampling.keep_all);
        }

        // API overrides
        if let Some(v) = lookup("APP_PORT").or_else(|| lookup("PORT")) {
            self.api.port = v.trim().parse().unwrap_or(self.api.port);
        }
        if let Some(v) = lookup("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.trim().parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Some(v) = lookup("API_LOG_INCLUDE_PREFIXES") {
            self.api.log_include_prefixes = split_list(&v);
        }
        if let Some(v) = lookup("API_LOG_EXCLUDE_PATHS") {
            self.api.log_exclude_paths = split_list(&v);
        }
        if let Some(v) = lookup("API_LOG_EXCLUDE_EXTENSIONS") {
            self.api.log_exclude_extensions = split_list(&v);
        }

        // Security overrides
        if let Some(v) = lookup("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Some(v) = lookup("JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.trim().parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            logging: LoggingConfig {
                level: Severity::Debug,
                json: false,
            },
            sampling: SamplingConfig {
                keep_all: true,
                ..SamplingConfig::default()
            },
            api: ApiConfig::default(),
            security: SecurityConfig {
                jwt_secret: "reqtail-development-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            logging: LoggingConfig {
                level: Severity::Info,
                json: true,
            },
            sampling: SamplingConfig::default(),
            api: ApiConfig::default(),
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            logging: LoggingConfig {
                level: Severity::Info,
                json: true,
            },
            sampling: SamplingConfig::default(),
            api: ApiConfig::default(),
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
            },
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 0.05,
            initial_threshold_ms: 1_000,
            window_capacity: 1_000,
            recompute_interval: 100,
            percentile: 0.99,
            keep_all: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        let filter = crate::observability::RequestFilter::default();
        Self {
            port: 3000,
            enable_request_logging: true,
            log_include_prefixes: filter.include_prefixes,
            log_exclude_paths: filter.exclude_paths,
            log_exclude_extensions: filter.exclude_extensions,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

// Helper macros for common checks
#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.logging.level, Severity::Debug);
        assert!(config.sampling.keep_all);
        assert!(!config.security.jwt_secret.is_empty());
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.logging.level, Severity::Info);
        assert!(config.logging.json);
        assert!(!config.sampling.keep_all);
        assert_eq!(config.sampling.sample_rate, 0.05);
        assert_eq!(config.sampling.initial_threshold_ms, 1_000);
        assert_eq!(config.sampling.window_capacity, 1_000);
        assert_eq!(config.sampling.recompute_interval, 100);
        assert!(config.security.jwt_secret.is_empty());
    }

    #[test]
    fn test_default_request_filter_lists() {
        let config = AppConfig::production();
        assert_eq!(config.api.log_include_prefixes, vec!["/api/".to_string()]);
        assert!(config.api.log_exclude_paths.contains(&"/api/_auth/session".to_string()));
        assert!(config.api.enable_request_logging);
    }

    fn overrides(preset: AppConfig, vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        preset.with_overrides(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_every_preset_samples_five_percent() {
        for config in [AppConfig::development(), AppConfig::staging(), AppConfig::production()] {
            assert_eq!(config.sampling.sample_rate, 0.05, "{:?}", config.environment);
        }
        let staging = overrides(AppConfig::staging(), &[]);
        assert_eq!(staging.sampling.sample_rate, 0.05);
    }

    #[test]
    fn test_sample_rate_override_parses_and_clamps() {
        let config = overrides(AppConfig::production(), &[("LOG_SAMPLE_RATE", "0.2")]);
        assert_eq!(config.sampling.sample_rate, 0.2);

        let config = overrides(AppConfig::production(), &[("LOG_SAMPLE_RATE", " 1.7 ")]);
        assert_eq!(config.sampling.sample_rate, 1.0);

        let config = overrides(AppConfig::production(), &[("LOG_SAMPLE_RATE", "-3")]);
        assert_eq!(config.sampling.sample_rate, 0.0);
    }

    #[test]
    fn test_invalid_sample_rate_keeps_preset() {
        for raw in ["NaN", "inf", "-inf", "five percent", ""] {
            let config = overrides(AppConfig::production(), &[("LOG_SAMPLE_RATE", raw)]);
            assert_eq!(config.sampling.sample_rate, 0.05, "LOG_SAMPLE_RATE={raw:?}");
        }
    }

    #[test]
    fn test_log_level_override_and_fallback() {
        let config = overrides(AppConfig::production(), &[("LOG_LEVEL", "WARN")]);
        assert_eq!(config.logging.level, Severity::Warn);

        let config = overrides(AppConfig::development(), &[("LOG_LEVEL", "error")]);
        assert_eq!(config.logging.level, Severity::Error);

        let config = overrides(AppConfig::production(), &[("LOG_LEVEL", "loud")]);
        assert_eq!(config.logging.level, Severity::Info);

        let config = overrides(AppConfig::development(), &[]);
        assert_eq!(config.logging.level, Severity::Debug);
    }

    #[test]
    fn test_api_and_security_overrides() {
        let config = overrides(
            AppConfig::production(),
            &[
                ("PORT", "8080"),
                ("API_ENABLE_REQUEST_LOGGING", "false"),
                ("API_LOG_EXCLUDE_PATHS", "/api/health, /api/metrics"),
                ("JWT_SECRET", "s3cret"),
                ("LOG_SAMPLE_ALL", "true"),
            ],
        );
        assert_eq!(config.api.port, 8080);
        assert!(!config.api.enable_request_logging);
        assert_eq!(config.api.log_exclude_paths, vec!["/api/health", "/api/metrics"]);
        assert_eq!(config.security.jwt_secret, "s3cret");
        assert!(config.sampling.keep_all);
    }

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        assert_eq!(split_list(" /api/ , ,/internal/"), vec!["/api/", "/internal/"]);
    }
}
