//! HTTP server configuration

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP server
    ///
    /// Common values:
    /// - `[::]:8080` (IPv6 any address, port 8080)
    /// - `0.0.0.0:8080` (IPv4 any address, port 8080)
    /// - `127.0.0.1:8080` (localhost only, port 8080)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Bearer token required on every endpoint except health and unsubscribe.
    ///
    /// When unset, the API is open.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Token that unmasks recipient addresses in status responses
    #[serde(default)]
    pub admin_token: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Readiness fails while more jobs than this are waiting
    #[serde(default = "default_max_queued_jobs")]
    pub max_queued_jobs: usize,
}

fn default_listen_address() -> String {
    "[::]:8080".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    10
}

const fn default_max_queued_jobs() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            api_token: None,
            admin_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_queued_jobs: default_max_queued_jobs(),
        }
    }
}

impl ServerConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
