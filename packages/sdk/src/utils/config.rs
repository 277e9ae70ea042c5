// packages/sdk/src/utils/config.rs
//! SDK configuration
//!
//! All tunables recognized by the core, grouped by concern. `appId`,
//! `apiKey`, and `endpoint` are mandatory; everything else has defaults.

use crate::utils::errors::{MonitorError, Result};
use serde::{Deserialize, Serialize};

/// Per-capability enable flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFlags {
    /// Collect navigation timing and web vitals
    pub performance: bool,

    /// Install error, rejection, and network hooks
    pub errors: bool,

    /// Install interaction listeners and history wraps
    pub behavior: bool,

    /// Record DOM snapshots and mutation deltas
    pub replay: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            performance: true,
            errors: true,
            behavior: true,
            replay: false,
        }
    }
}

/// Per-kind Bernoulli sampling rates, each in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingConfig {
    pub performance: f64,

    pub errors: f64,

    pub behavior: f64,

    pub replay: f64,

    /// Performance events whose page load time exceeds this always pass
    pub slow_load_threshold_ms: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            performance: 1.0,
            errors: 1.0,
            behavior: 0.1,
            replay: 0.01,
            slow_load_threshold_ms: 3_000.0,
        }
    }
}

/// Delivery tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportingConfig {
    /// Maximum events per POST body
    pub batch_size: usize,

    /// Periodic collection interval (milliseconds)
    pub flush_interval_ms: u64,

    /// Retries per batch after the initial attempt
    pub max_retries: u32,

    /// Per-request deadline (milliseconds)
    pub timeout_ms: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval_ms: 5_000,
            max_retries: 3,
            timeout_ms: 10_000,
        }
    }
}

/// Privacy controls applied at capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivacyConfig {
    /// Mask sensitive inputs and scrub PII from messages
    pub mask_sensitive_data: bool,

    /// When non-empty, the SDK refuses to start on other hosts
    pub allowed_domains: Vec<String>,

    /// Extra CSS selectors masked in replay and skipped by behavior capture
    pub blocked_elements: Vec<String>,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            mask_sensitive_data: true,
            allowed_domains: Vec::new(),
            blocked_elements: Vec::new(),
        }
    }
}

/// Top-level SDK configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Tenant identifier
    pub app_id: String,

    /// Collector API key
    pub api_key: String,

    /// Collector endpoint URL
    pub endpoint: String,

    #[serde(default)]
    pub features: FeatureFlags,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub reporting: ReportingConfig,

    #[serde(default)]
    pub privacy: PrivacyConfig,

    /// Verbose logging
    #[serde(default)]
    pub debug: bool,

    /// Free-form deployment label
    #[serde(default)]
    pub environment: Option<String>,
}

impl MonitorConfig {
    /// Create a configuration with the three mandatory fields and defaults
    /// for everything else.
    pub fn new(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            features: FeatureFlags::default(),
            sampling: SamplingConfig::default(),
            reporting: ReportingConfig::default(),
            privacy: PrivacyConfig::default(),
            debug: false,
            environment: None,
        }
    }

    /// Validate the configuration.
    ///
    /// Called at construction; the core refuses to initialize on error.
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(MonitorError::ConfigError("appId is required".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(MonitorError::ConfigError("apiKey is required".to_string()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(MonitorError::ConfigError("endpoint is required".to_string()));
        }

        for (name, rate) in [
            ("performance", self.sampling.performance),
            ("errors", self.sampling.errors),
            ("behavior", self.sampling.behavior),
            ("replay", self.sampling.replay),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(MonitorError::ConfigError(format!(
                    "sampling rate for {} must be in [0, 1], got {}",
                    name, rate
                )));
            }
        }

        if self.reporting.batch_size == 0 {
            return Err(MonitorError::ConfigError(
                "batchSize must be at least 1".to_string(),
            ));
        }
        if self.reporting.timeout_ms == 0 {
            return Err(MonitorError::ConfigError(
                "timeout must be at least 1 ms".to_string(),
            ));
        }

        Ok(())
    }
}
