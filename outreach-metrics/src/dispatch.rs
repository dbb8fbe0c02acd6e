//! Dispatcher metrics
//!
//! Tracks:
//! - Line item outcomes by status
//! - Job completions by final status
//! - Delivery client latency
//! - Time spent waiting on the rate limiter
//! - Number of jobs waiting in the queue

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::MetricsError;

#[derive(Debug)]
pub struct DispatchMetrics {
    /// Line items reaching a terminal status, by status
    items_total: Counter<u64>,

    /// Jobs reaching a terminal status, by status
    jobs_total: Counter<u64>,

    /// Delivery client call latency, by outcome
    send_duration_seconds: Histogram<f64>,

    /// Time the dispatcher blocked on the rate limiter
    rate_limit_wait_seconds: Histogram<f64>,

    /// Newly added suppression entries
    suppressions_total: Counter<u64>,

    queued_jobs: Arc<AtomicU64>,
}

impl DispatchMetrics {
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let items_total = meter
            .u64_counter("outreach.dispatch.items.total")
            .with_description("Line items reaching a terminal status")
            .build();

        let jobs_total = meter
            .u64_counter("outreach.dispatch.jobs.total")
            .with_description("Jobs reaching a terminal status")
            .build();

        let send_duration_seconds = meter
            .f64_histogram("outreach.dispatch.send.duration.seconds")
            .with_description("Delivery client call latency")
            .build();

        let rate_limit_wait_seconds = meter
            .f64_histogram("outreach.dispatch.rate_limit.wait.seconds")
            .with_description("Time spent waiting for a rate limit permit")
            .build();

        let suppressions_total = meter
            .u64_counter("outreach.dispatch.suppressions.total")
            .with_description("Addresses newly added to the suppression list")
            .build();

        let queued_jobs = Arc::new(AtomicU64::new(0));
        let observed = Arc::clone(&queued_jobs);

        meter
            .u64_observable_gauge("outreach.dispatch.jobs.queued")
            .with_description("Jobs waiting for the dispatcher")
            .with_callback(move |observer| {
                observer.observe(observed.load(Ordering::Relaxed), &[]);
            })
            .build();

        Ok(Self {
            items_total,
            jobs_total,
            send_duration_seconds,
            rate_limit_wait_seconds,
            suppressions_total,
            queued_jobs,
        })
    }

    pub fn record_item(&self, status: &str, dry_run: bool) {
        self.items_total.add(
            1,
            &[
                KeyValue::new("status", status.to_string()),
                KeyValue::new("dry_run", dry_run),
            ],
        );
    }

    pub fn record_job(&self, status: &str) {
        self.jobs_total
            .add(1, &[KeyValue::new("status", status.to_string())]);
    }

    pub fn record_send(&self, outcome: &str, duration_secs: f64) {
        self.send_duration_seconds.record(
            duration_secs,
            &[KeyValue::new("outcome", outcome.to_string())],
        );
    }

    pub fn record_rate_limit_wait(&self, duration_secs: f64) {
        self.rate_limit_wait_seconds.record(duration_secs, &[]);
    }

    pub fn record_suppression(&self) {
        self.suppressions_total.add(1, &[]);
    }

    pub fn set_queued_jobs(&self, count: u64) {
        self.queued_jobs.store(count, Ordering::Relaxed);
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("outreach.dispatch")
}
