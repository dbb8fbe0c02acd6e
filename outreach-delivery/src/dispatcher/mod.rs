//! The dispatcher: drains one job at a time, in submission order
//!
//! ```text
//! submit ──► JobStore (queued, FIFO) ──claim_next──► drain ──► record_outcome
//!                 ▲                                    │
//!                 └──────── finish / abort / cancel ◄──┘
//! ```
//!
//! Every client call takes a permit from the shared [`RateLimiter`] first,
//! and every recipient is checked against the [`SuppressionRegistry`]
//! immediately before that.

mod drain;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use outreach_common::{ConfigError, Signal, internal};
use outreach_store::{JobId, JobStatus};
use serde::Deserialize;
use tokio::sync::{broadcast, watch};

use crate::{
    DispatchError, client::DeliveryClient, queue::JobQueue, rate_limiter::RateLimiter,
    retry::RetryPolicy, suppression::SuppressionRegistry,
};

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum client calls within any `window_secs` interval
    #[serde(default = "default_mps_limit")]
    pub mps_limit: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Upper bound on a single client call. Expiry fails that item only.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// How often an idle dispatcher re-checks the queue without a wake-up
    #[serde(default = "default_idle_poll_secs")]
    pub idle_poll_secs: u64,

    /// Backoff for throttled or briefly unavailable sends
    #[serde(default)]
    pub retry: RetryPolicy,
}

const fn default_mps_limit() -> u32 {
    60
}

const fn default_window_secs() -> u64 {
    60
}

const fn default_send_timeout_secs() -> u64 {
    30
}

const fn default_idle_poll_secs() -> u64 {
    5
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mps_limit: default_mps_limit(),
            window_secs: default_window_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            idle_poll_secs: default_idle_poll_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DispatcherConfig {
    /// # Errors
    ///
    /// Returns an error naming the first zero-valued field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("mps_limit", u64::from(self.mps_limit)),
            ("window_secs", self.window_secs),
            ("send_timeout_secs", self.send_timeout_secs),
            ("idle_poll_secs", self.idle_poll_secs),
        ];

        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than 0"));
            }
        }

        self.retry.validate()
    }

    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub const fn idle_poll(&self) -> Duration {
        Duration::from_secs(self.idle_poll_secs)
    }
}

/// How a drained job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug)]
pub struct Dispatcher {
    config: DispatcherConfig,
    queue: JobQueue,
    suppression: SuppressionRegistry,
    limiter: Arc<RateLimiter>,
    client: Arc<dyn DeliveryClient>,
    running: AtomicBool,
    stop: watch::Sender<bool>,
}

impl Dispatcher {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: DispatcherConfig,
        queue: JobQueue,
        suppression: SuppressionRegistry,
        client: Arc<dyn DeliveryClient>,
    ) -> Result<Self, DispatchError> {
        config.validate()?;
        let limiter = Arc::new(RateLimiter::new(config.mps_limit, config.window())?);

        Ok(Self {
            config,
            queue,
            suppression,
            limiter,
            client,
            running: AtomicBool::new(false),
            stop: watch::Sender::new(false),
        })
    }

    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub const fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub const fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Whether [`Dispatcher::serve`] is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the dispatcher to stop after the in-flight item.
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolves once [`Dispatcher::request_stop`] has been called
    async fn stopped(&self) {
        let mut stop = self.stop.subscribe();
        // Only fails if the sender is gone, which cannot happen while `self` lives
        let _ = stop.wait_for(|stop| *stop).await;
    }

    /// Claim and drain the next queued job, if any.
    ///
    /// A job that hits a store error is failed and the error logged; only an
    /// invariant violation is returned, since the dispatcher cannot safely
    /// continue after one.
    pub async fn run_next(&self) -> Result<Option<JobOutcome>, DispatchError> {
        let Some(job) = self.queue.store().claim_next() else {
            return Ok(None);
        };
        self.queue.publish_queue_depth();

        let job_id = job.job_id;
        internal!(
            level = INFO,
            %job_id,
            prepare_id = %job.prepare_id,
            dry_run = job.dry_run,
            total = job.counts.total,
            "Job started"
        );

        let status = match self.drain(&job).await {
            Ok(status) => status,
            Err(error) => {
                internal!(level = ERROR, %job_id, %error, "Job dispatch failed");

                if self.queue.store().running_job() == Some(job_id)
                    && let Err(abort_error) = self.queue.store().abort_job(job_id, &error.to_string())
                {
                    internal!(level = ERROR, %job_id, error = %abort_error, "Unable to fail job");
                }

                if error.is_invariant_violation() {
                    return Err(error);
                }
                JobStatus::Failed
            }
        };

        let counts = self.queue.store().job_counts(job_id)?;
        internal!(
            level = INFO,
            %job_id,
            %status,
            sent = counts.sent,
            dry_sent = counts.dry_sent,
            skipped = counts.skipped,
            failed = counts.failed,
            total = counts.total,
            "Job finished"
        );
        if let Some(metrics) = outreach_metrics::metrics() {
            metrics.dispatch.record_job(status.as_str());
        }

        Ok(Some(JobOutcome { job_id, status }))
    }

    /// Drain every queued job, returning their outcomes in order
    pub async fn run_until_idle(&self) -> Result<Vec<JobOutcome>, DispatchError> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_next().await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Run until a shutdown signal arrives.
    ///
    /// On shutdown the in-flight item completes; the rest of the running job
    /// is cancelled.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), DispatchError> {
        internal!(
            level = INFO,
            mps_limit = self.config.mps_limit,
            window_secs = self.config.window_secs,
            client = self.client.name(),
            "Dispatcher starting"
        );

        self.running.store(true, Ordering::SeqCst);
        let result = self.serve_until_stopped(&mut shutdown).await;
        self.running.store(false, Ordering::SeqCst);

        match &result {
            Ok(()) => internal!(level = INFO, "Dispatcher stopped"),
            Err(error) => internal!(level = ERROR, %error, "Dispatcher halted"),
        }

        result
    }

    async fn serve_until_stopped(
        &self,
        shutdown: &mut broadcast::Receiver<Signal>,
    ) -> Result<(), DispatchError> {
        loop {
            let next = self.run_next();
            tokio::pin!(next);

            let outcome = tokio::select! {
                outcome = &mut next => outcome,
                signal = shutdown.recv() => {
                    internal!(level = INFO, ?signal, "Dispatcher received shutdown signal");
                    self.request_stop();
                    next.await
                }
            }?;

            if self.stop_requested() {
                return Ok(());
            }

            if outcome.is_some() {
                continue;
            }

            tokio::select! {
                () = self.queue.wait() => {}
                () = tokio::time::sleep(self.config.idle_poll()) => {}
                () = self.stopped() => return Ok(()),
                signal = shutdown.recv() => {
                    internal!(level = INFO, ?signal, "Dispatcher received shutdown signal");
                    self.request_stop();
                    return Ok(());
                }
            }
        }
    }
}
