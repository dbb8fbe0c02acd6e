use std::time::Duration;

use serde::Deserialize;

use crate::MetricsError;

/// Where and how often dispatch metrics are pushed
///
/// Metrics are off unless `enabled` is set; with them off nothing is
/// exported and recording sites skip their work.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricsConfig {
    /// Default: false
    #[serde(default)]
    pub enabled: bool,

    /// OTLP/HTTP collector endpoint
    ///
    /// Default: `http://localhost:4318/v1/metrics`
    #[serde(default = "defaults::endpoint")]
    pub endpoint: String,

    /// Seconds between pushes to the collector
    ///
    /// Default: 60
    #[serde(default = "defaults::export_interval_secs")]
    pub export_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: defaults::endpoint(),
            export_interval_secs: defaults::export_interval_secs(),
        }
    }
}

impl MetricsConfig {
    #[must_use]
    pub const fn export_interval(&self) -> Duration {
        Duration::from_secs(self.export_interval_secs)
    }

    /// # Errors
    ///
    /// Returns an error if the endpoint is not an http(s) URL or the export
    /// interval is zero.
    pub fn validate(&self) -> Result<(), MetricsError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(MetricsError::InvalidConfig(format!(
                "endpoint must be an http(s) URL, got {:?}",
                self.endpoint
            )));
        }
        if self.export_interval_secs == 0 {
            return Err(MetricsError::InvalidConfig(
                "export_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

mod defaults {
    pub fn endpoint() -> String {
        "http://localhost:4318/v1/metrics".to_string()
    }

    pub const fn export_interval_secs() -> u64 {
        60
    }
}
