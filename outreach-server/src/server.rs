//! HTTP server

use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use outreach_common::Signal;
use serde_json::json;
use tokio::{net::TcpListener, sync::broadcast};
use tower_http::timeout::TimeoutLayer;

use crate::{AppState, ServerConfig, ServerError, api, auth::require_api_token};

/// The outreach HTTP API
pub struct OutreachServer {
    listener: TcpListener,
    router: Router,
}

impl OutreachServer {
    /// Bind the listener and build the router
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn new(config: &ServerConfig, state: AppState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| ServerError::BindError {
                address: config.listen_address.clone(),
                source: e,
            })?;

        tracing::info!(
            address = %config.listen_address,
            "Outreach server bound successfully"
        );

        Ok(Self {
            listener,
            router: router(state, config.request_timeout()),
        })
    }

    /// Run the server until a shutdown signal is received
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a runtime error.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), ServerError> {
        tracing::info!("Outreach server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Outreach server received shutdown signal");
            })
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        tracing::info!("Outreach server stopped");
        Ok(())
    }
}

/// Every route, with the token check on all but health and unsubscribe
pub fn router(state: AppState, timeout: Duration) -> Router {
    let public = Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/unsubscribe", get(api::unsubscribe));

    let protected = Router::new()
        .route("/prepare", post(api::prepare))
        .route("/send", post(api::send))
        .route("/direct_send", post(api::direct_send))
        .route("/status/{job_id}", get(api::status))
        .route("/jobs", get(api::list_jobs))
        .route("/jobs/{job_id}/cancel", post(api::cancel))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_token,
        ));

    public
        .merge(protected)
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Returns 200 OK if the application can respond to requests
async fn liveness_handler(State(state): State<AppState>) -> Response {
    if state.health.is_alive() {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
    }
}

/// Returns 200 OK while the dispatcher is running and the queue has room
async fn readiness_handler(State(state): State<AppState>) -> Response {
    if state.health.is_ready() {
        (StatusCode::OK, "OK").into_response()
    } else {
        let status = state.health.get_status();
        tracing::warn!(
            dispatcher_running = status.dispatcher_running,
            queued_jobs = status.queued_jobs,
            max_queued_jobs = status.max_queued_jobs,
            "Readiness probe failed"
        );
        (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response()
    }
}
