//! OpenTelemetry metrics for outreach
//!
//! Dispatch metrics are pushed over OTLP/HTTP to a collector when enabled.
//! Callers check [`is_enabled`] before recording, so a disabled
//! configuration costs nothing beyond that check.
//!
//! ```text
//! outreach → OTLP/HTTP → OpenTelemetry Collector → Prometheus
//! ```

mod config;
mod dispatch;
mod error;

pub use config::MetricsConfig;
pub use dispatch::DispatchMetrics;
pub use error::MetricsError;
use once_cell::sync::OnceCell;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};

static METRICS_INSTANCE: OnceCell<Metrics> = OnceCell::new();

/// Root metrics container
#[derive(Debug)]
pub struct Metrics {
    pub dispatch: DispatchMetrics,
}

/// Initialize the metrics system
///
/// Must be called once at startup before anything is recorded. A no-op when
/// metrics are disabled in the config.
///
/// # Errors
///
/// Returns an error if the config is invalid, the exporter cannot be built,
/// or metrics were already initialised.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        tracing::info!("Dispatch metrics disabled");
        return Ok(());
    }
    config.validate()?;

    opentelemetry::global::set_meter_provider(push_provider(config)?);

    let metrics = Metrics {
        dispatch: DispatchMetrics::new()?,
    };

    METRICS_INSTANCE
        .set(metrics)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    tracing::info!(
        endpoint = %config.endpoint,
        interval_secs = config.export_interval_secs,
        "Pushing dispatch metrics over OTLP/HTTP"
    );

    Ok(())
}

/// Meter provider whose reader pushes to the collector on a fixed interval
fn push_provider(config: &MetricsConfig) -> Result<SdkMeterProvider, MetricsError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_endpoint(config.endpoint.as_str())
        .build()
        .map_err(|e| MetricsError::OpenTelemetry(e.to_string()))?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(config.export_interval())
        .build();

    Ok(SdkMeterProvider::builder().with_reader(reader).build())
}

/// The global metrics instance, if [`init_metrics`] installed one
#[must_use]
pub fn metrics() -> Option<&'static Metrics> {
    METRICS_INSTANCE.get()
}

#[must_use]
pub fn is_enabled() -> bool {
    METRICS_INSTANCE.get().is_some()
}
