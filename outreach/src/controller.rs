use std::sync::{Arc, LazyLock};

use outreach_common::{Signal, internal, logging};
use outreach_delivery::{
    DeliveryConfig, Dispatcher, DispatcherConfig, JobQueue, StatusProjection, SuppressionConfig,
    SuppressionRegistry,
};
use outreach_metrics::MetricsConfig;
use outreach_server::{AppState, AuthTokens, HealthChecker, OutreachServer, ServerConfig};
use outreach_store::JobStore;
use serde::Deserialize;
use tokio::sync::broadcast;

/// Top-level configuration, one section per component
#[derive(Debug, Default, Deserialize)]
pub struct Outreach {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub suppression: SuppressionConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for CTRL+C or SIGTERM, then tell every component to stop
#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Outreach {
    /// Run the dispatcher and the HTTP server until shutdown
    ///
    /// # Errors
    ///
    /// This function will return an error if a component fails to initialise,
    /// the server cannot bind, or the dispatcher halts on an invariant
    /// violation.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        outreach_metrics::init_metrics(&self.metrics)?;

        let store = JobStore::new();
        let queue = JobQueue::new(store.clone());
        let suppression = SuppressionRegistry::from_config(&self.suppression).await?;
        let client = self.delivery.build()?;

        let dispatcher = Arc::new(Dispatcher::new(
            self.dispatcher,
            queue.clone(),
            suppression.clone(),
            client,
        )?);

        let state = AppState {
            queue,
            queries: Arc::new(StatusProjection::new(store)),
            suppression,
            health: Arc::new(HealthChecker::new(
                dispatcher.clone(),
                self.server.max_queued_jobs,
            )),
            auth: Arc::new(AuthTokens::from(&self.server)),
        };

        let server = OutreachServer::new(&self.server, state).await?;

        internal!(level = INFO, "Controller running");

        let dispatcher_shutdown = SHUTDOWN_BROADCAST.subscribe();
        let server_shutdown = SHUTDOWN_BROADCAST.subscribe();
        let signals = tokio::spawn(shutdown());

        let dispatch = async {
            let result = dispatcher.serve(dispatcher_shutdown).await;
            if result.is_err() {
                // Take the server down with a halted dispatcher
                let _ = SHUTDOWN_BROADCAST.send(Signal::Shutdown);
            }
            result
        };

        let (dispatched, served) = tokio::join!(dispatch, server.serve(server_shutdown));
        signals.abort();

        internal!(level = INFO, "Shutting down...");

        dispatched?;
        served?;
        Ok(())
    }
}
