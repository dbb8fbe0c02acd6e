//! HTTP API for outreach
//!
//! Exposes batch preparation, job submission and status, cancellation,
//! unsubscribe and health probes over axum. Everything except health and
//! unsubscribe sits behind a bearer token when one is configured.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ApiError, ServerError};
pub use health::{HealthChecker, HealthStatus};
pub use server::{OutreachServer, router};
pub use state::{AppState, AuthTokens};
