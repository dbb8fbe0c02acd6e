//! Liveness and readiness

use std::sync::Arc;

use outreach_delivery::{Dispatcher, RateLimitStats};
use serde::Serialize;

/// Derives readiness from the dispatcher and the depth of its queue
#[derive(Debug)]
pub struct HealthChecker {
    dispatcher: Arc<Dispatcher>,
    max_queued_jobs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub alive: bool,
    pub ready: bool,
    pub dispatcher_running: bool,
    pub queued_jobs: usize,
    pub max_queued_jobs: usize,
    pub rate_limit: RateLimitStats,
}

impl HealthChecker {
    pub const fn new(dispatcher: Arc<Dispatcher>, max_queued_jobs: usize) -> Self {
        Self {
            dispatcher,
            max_queued_jobs,
        }
    }

    /// If the server can answer, it is alive
    pub const fn is_alive(&self) -> bool {
        true
    }

    /// Ready while the dispatcher loop runs and the queue is below its limit
    pub fn is_ready(&self) -> bool {
        let running = self.dispatcher.is_running();
        let queued = self.dispatcher.queue().store().queued_len();
        let ready = running && queued < self.max_queued_jobs;

        if !ready {
            tracing::debug!(
                dispatcher_running = running,
                queued_jobs = queued,
                max_queued_jobs = self.max_queued_jobs,
                "Readiness check failed"
            );
        }

        ready
    }

    pub fn get_status(&self) -> HealthStatus {
        HealthStatus {
            alive: self.is_alive(),
            ready: self.is_ready(),
            dispatcher_running: self.dispatcher.is_running(),
            queued_jobs: self.dispatcher.queue().store().queued_len(),
            max_queued_jobs: self.max_queued_jobs,
            rate_limit: self.dispatcher.rate_limiter().stats(),
        }
    }
}
