use std::time::Duration;

use outreach_common::{internal, outgoing};
use outreach_store::{Job, JobId, JobStatus, LineItem, LineStatus};
use tokio::time::Instant;

use super::Dispatcher;
use crate::{
    DispatchError,
    client::{OutboundEmail, SendError},
    redact::mask_email,
};

/// What the drain loop does after one item
enum Step {
    Next,
    Stop(JobStatus),
}

impl Dispatcher {
    /// Process every pending item of a claimed job, in batch order
    #[tracing::instrument(skip_all, fields(job_id = %job.job_id))]
    pub(super) async fn drain(&self, job: &Job) -> Result<JobStatus, DispatchError> {
        let job_id = job.job_id;

        for (index, item) in job.items.iter().enumerate() {
            if item.status.is_terminal() {
                continue;
            }

            if self.queue.store().cancellation_requested(job_id) {
                return self.cancel_remaining(job_id, "cancelled by request");
            }
            if self.stop_requested() {
                return self.cancel_remaining(job_id, "dispatcher shutting down");
            }

            match self.dispatch_item(job, index, item).await? {
                Step::Next => {}
                Step::Stop(status) => return Ok(status),
            }
        }

        Ok(self.queue.store().finish_job(job_id)?)
    }

    async fn dispatch_item(
        &self,
        job: &Job,
        index: usize,
        item: &LineItem,
    ) -> Result<Step, DispatchError> {
        if self.suppression.is_suppressed(&item.recipient_email).await? {
            self.record(job, index, item, LineStatus::SkippedSuppressed, None)?;
            return Ok(Step::Next);
        }

        let Some(waited) = self.acquire_permit().await else {
            return self
                .cancel_remaining(job.job_id, "dispatcher shutting down")
                .map(Step::Stop);
        };
        if self.queue.store().cancellation_requested(job.job_id) {
            return self
                .cancel_remaining(job.job_id, "cancelled by request")
                .map(Step::Stop);
        }

        if !waited.is_zero() {
            internal!(
                level = DEBUG,
                job_id = %job.job_id,
                line_index = index,
                waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                "Waited for rate limit permit"
            );
        }

        // An opt-out acknowledged while this item waited for a permit still wins
        if !waited.is_zero() && self.suppression.is_suppressed(&item.recipient_email).await? {
            self.record(job, index, item, LineStatus::SkippedSuppressed, None)?;
            return Ok(Step::Next);
        }

        if job.dry_run {
            self.record(job, index, item, LineStatus::DrySent, None)?;
            return Ok(Step::Next);
        }

        match self.send(job.job_id, index, item).await {
            Ok(()) => {
                self.record(job, index, item, LineStatus::Sent, None)?;
                Ok(Step::Next)
            }
            Err(error) if error.is_channel_failure() => {
                let detail = error.to_string();
                self.record(job, index, item, LineStatus::Failed, Some(detail.clone()))?;

                let aborted = self.queue.store().abort_job(job.job_id, &detail)?;
                outgoing!(
                    level = ERROR,
                    job_id = %job.job_id,
                    line_index = index,
                    aborted,
                    %error,
                    "Delivery channel unavailable, job aborted"
                );
                Ok(Step::Stop(JobStatus::Failed))
            }
            Err(error) => {
                self.record(job, index, item, LineStatus::Failed, Some(error.to_string()))?;
                Ok(Step::Next)
            }
        }
    }

    /// Wait for a rate limit permit, or `None` if a stop was requested first
    async fn acquire_permit(&self) -> Option<Duration> {
        let waited = tokio::select! {
            biased;
            () = self.stopped() => return None,
            waited = self.limiter.acquire() => waited,
        };

        if let Some(metrics) = outreach_metrics::metrics() {
            metrics.dispatch.record_rate_limit_wait(waited.as_secs_f64());
        }
        Some(waited)
    }

    /// Hand one item to the client, retrying transient failures.
    ///
    /// Retries reuse the item's permit. A transient failure that outlasts the
    /// retry policy becomes a channel failure.
    async fn send(&self, job_id: JobId, index: usize, item: &LineItem) -> Result<(), SendError> {
        let message = OutboundEmail {
            to: item.recipient_email.clone(),
            subject: item.rendered_subject.clone(),
            body_html: item.rendered_body.clone(),
        };
        let retry = &self.config.retry;

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(&message).await {
                Err(error) if error.is_transient() && retry.should_retry(attempts) => {
                    let delay = retry.backoff(attempts);
                    outgoing!(
                        level = WARN,
                        %job_id,
                        line_index = index,
                        attempt = attempts,
                        delay_secs = delay.as_secs(),
                        %error,
                        "Transient send failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(SendError::TemporarilyUnavailable(detail)) => {
                    return Err(SendError::ChannelUnavailable(format!(
                        "{detail} (after {attempts} attempts)"
                    )));
                }
                result => return result,
            }
        }
    }

    /// One client call, bounded by the send timeout
    async fn attempt(&self, message: &OutboundEmail) -> Result<(), SendError> {
        let timeout = self.config.send_timeout();
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, self.client.send(message))
            .await
            .unwrap_or(Err(SendError::Timeout(timeout)));

        if let Some(metrics) = outreach_metrics::metrics() {
            let outcome = result.as_ref().map_or_else(SendError::kind, |_| "ok");
            metrics
                .dispatch
                .record_send(outcome, started.elapsed().as_secs_f64());
        }

        result
    }

    fn record(
        &self,
        job: &Job,
        index: usize,
        item: &LineItem,
        status: LineStatus,
        detail: Option<String>,
    ) -> Result<(), DispatchError> {
        let recipient = mask_email(&item.recipient_email);
        match &detail {
            Some(detail) => outgoing!(
                level = WARN,
                job_id = %job.job_id,
                line_index = index,
                %recipient,
                %status,
                detail = %detail,
                "Line item failed"
            ),
            None => outgoing!(
                level = INFO,
                job_id = %job.job_id,
                line_index = index,
                %recipient,
                %status,
                "Line item processed"
            ),
        }

        self.queue
            .store()
            .record_outcome(job.job_id, index, status, detail)?;

        if let Some(metrics) = outreach_metrics::metrics() {
            metrics.dispatch.record_item(status.as_str(), job.dry_run);
        }

        Ok(())
    }

    fn cancel_remaining(&self, job_id: JobId, reason: &str) -> Result<JobStatus, DispatchError> {
        let skipped = self.queue.store().complete_cancellation(job_id)?;
        internal!(level = INFO, %job_id, skipped, reason, "Job cancelled");
        Ok(JobStatus::Cancelled)
    }
}
