//! Error types for metrics operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metrics system has already been initialized
    #[error("Metrics system already initialized")]
    AlreadyInitialized,

    #[error("Invalid metrics configuration: {0}")]
    InvalidConfig(String),

    /// OpenTelemetry SDK error
    #[error("OpenTelemetry error: {0}")]
    OpenTelemetry(String),
}
