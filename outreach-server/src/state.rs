use std::sync::Arc;

use outreach_delivery::{JobQueryService, JobQueue, SuppressionRegistry};

use crate::{HealthChecker, ServerConfig};

/// Tokens the server checks callers against
#[derive(Debug, Clone, Default)]
pub struct AuthTokens {
    pub api_token: Option<String>,
    pub admin_token: Option<String>,
}

impl From<&ServerConfig> for AuthTokens {
    fn from(config: &ServerConfig) -> Self {
        // A blank token in the config means "not configured"
        let token = |t: &Option<String>| t.as_ref().filter(|t| !t.trim().is_empty()).cloned();
        Self {
            api_token: token(&config.api_token),
            admin_token: token(&config.admin_token),
        }
    }
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub queue: JobQueue,
    pub queries: Arc<dyn JobQueryService>,
    pub suppression: SuppressionRegistry,
    pub health: Arc<HealthChecker>,
    pub auth: Arc<AuthTokens>,
}
