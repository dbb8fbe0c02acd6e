//! Shared building blocks for the outreach workspace
//!
//! - Logging macros and subscriber initialisation
//! - Configuration error types
//! - Email address normalisation used by suppression and dispatch

pub mod email;
pub mod error;
pub mod logging;

pub use email::{InvalidEmail, normalize_email};
pub use error::ConfigError;
pub use tracing;

/// Process-wide lifecycle signal broadcast to every long-running task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
