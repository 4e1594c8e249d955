use crate::error::{AppError, AppResult};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub id: String,
    pub env: String,
    pub config_version: u32,

    pub timings: TimingsConfig,
    pub retry: RetryConfig,
    pub cutover: CutoverConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub prometheus: PrometheusConfig,
}

/// Durations spec pins to specific numbers (discovery empty-pass sleep,
/// parent-gate poll interval, empty-batch sleep). Kept configurable with
/// the spec's numbers as defaults so an operator can tune without a rebuild.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingsConfig {
    pub discovery_empty_pass_sleep_secs: u64,
    pub parent_gate_poll_secs: u64,
    pub empty_batch_sleep_secs: u64,
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            discovery_empty_pass_sleep_secs: 10,
            parent_gate_poll_secs: 6,
            empty_batch_sleep_secs: 5,
        }
    }
}

/// Bounded-retry knobs for the shard worker's trimmed-data recovery and the
/// Spanner writer's parent-row-missing recovery.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub trim_retry_max: u32,
    pub parent_missing_retry_max: u32,
    pub parent_missing_retry_spacing_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            trim_retry_max: 5,
            parent_missing_retry_max: 1000,
            parent_missing_retry_spacing_secs: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CutoverConfig {
    pub tick_interval_secs: u64,
    pub decay_threshold_pct: u64,
}

impl Default for CutoverConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            decay_threshold_pct: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct PrometheusConfig {
    pub bind_addr: String,
    pub port: u16,
    pub metrics_path: String,
}

fn validate_config(cfg: &AppConfig) -> AppResult<()> {
    if cfg.id.is_empty() {
        return Err(AppError::MissingConfig("id"));
    }

    if cfg.config_version == 0 {
        return Err(AppError::InvalidConfig(
            "config_version must be >= 1".into(),
        ));
    }

    // --------------------------------------------------
    // Timing validation
    // --------------------------------------------------
    if cfg.timings.discovery_empty_pass_sleep_secs == 0 {
        return Err(AppError::InvalidConfig(
            "timings.discovery_empty_pass_sleep_secs must be > 0".into(),
        ));
    }
    if cfg.timings.parent_gate_poll_secs == 0 {
        return Err(AppError::InvalidConfig(
            "timings.parent_gate_poll_secs must be > 0".into(),
        ));
    }
    if cfg.timings.empty_batch_sleep_secs == 0 {
        return Err(AppError::InvalidConfig(
            "timings.empty_batch_sleep_secs must be > 0".into(),
        ));
    }

    // --------------------------------------------------
    // Retry validation
    // --------------------------------------------------
    if cfg.retry.trim_retry_max == 0 {
        return Err(AppError::InvalidConfig(
            "retry.trim_retry_max must be > 0".into(),
        ));
    }
    if cfg.retry.parent_missing_retry_max == 0 {
        return Err(AppError::InvalidConfig(
            "retry.parent_missing_retry_max must be > 0".into(),
        ));
    }
    if cfg.retry.parent_missing_retry_spacing_secs == 0 {
        return Err(AppError::InvalidConfig(
            "retry.parent_missing_retry_spacing_secs must be > 0".into(),
        ));
    }

    // --------------------------------------------------
    // Cutover validation
    // --------------------------------------------------
    if cfg.cutover.tick_interval_secs == 0 {
        return Err(AppError::InvalidConfig(
            "cutover.tick_interval_secs must be > 0".into(),
        ));
    }
    if cfg.cutover.decay_threshold_pct == 0 || cfg.cutover.decay_threshold_pct > 100 {
        return Err(AppError::InvalidConfig(
            "cutover.decay_threshold_pct must be in 1..=100".into(),
        ));
    }

    // --------------------------------------------------
    // Prometheus validation
    // --------------------------------------------------
    if cfg.prometheus.bind_addr.is_empty() {
        return Err(AppError::InvalidConfig(
            "prometheus.bind_addr must not be empty".into(),
        ));
    }
    if cfg.prometheus.metrics_path.is_empty() || !cfg.prometheus.metrics_path.starts_with('/') {
        return Err(AppError::InvalidConfig(
            "prometheus.metrics_path must start with '/'".into(),
        ));
    }

    Ok(())
}

const APP_CONFIG_PATH_ENV: &str = "DYNAMOSTREAM_CONFIG";
const APP_CONFIG_PATH_DEFAULT: &str = "config/app.toml";

pub fn load_app_config() -> AppResult<AppConfig> {
    let path = std::env::var(APP_CONFIG_PATH_ENV)
        .unwrap_or_else(|_| APP_CONFIG_PATH_DEFAULT.to_string());
    let contents = fs::read_to_string(&path)?; // AppError::ConfigIo
    let config: AppConfig = toml::from_str(&contents)?; // AppError::ConfigToml
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            id: "run-1".into(),
            env: "dev".into(),
            config_version: 1,
            timings: TimingsConfig::default(),
            retry: RetryConfig::default(),
            cutover: CutoverConfig::default(),
            logging: LoggingConfig {
                level: "info".into(),
            },
            metrics: MetricsConfig { enabled: true },
            prometheus: PrometheusConfig {
                bind_addr: "0.0.0.0".into(),
                port: 9898,
                metrics_path: "/metrics".into(),
            },
        }
    }

    #[test]
    fn sample_config_validates() {
        validate_config(&sample()).expect("sample config should be valid");
    }

    #[test]
    fn rejects_empty_id() {
        let mut cfg = sample();
        cfg.id = String::new();
        assert!(matches!(
            validate_config(&cfg),
            Err(AppError::MissingConfig("id"))
        ));
    }

    #[test]
    fn rejects_zero_trim_retry_max() {
        let mut cfg = sample();
        cfg.retry.trim_retry_max = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_decay_threshold_over_100() {
        let mut cfg = sample();
        cfg.cutover.decay_threshold_pct = 150;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_metrics_path_without_leading_slash() {
        let mut cfg = sample();
        cfg.prometheus.metrics_path = "metrics".into();
        assert!(validate_config(&cfg).is_err());
    }
}
