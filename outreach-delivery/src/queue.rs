//! Submission side of the dispatcher
//!
//! Jobs are queued inside the [`JobStore`] itself (FIFO, one running at a
//! time). The queue adds a wake-up so the dispatcher does not have to poll
//! for new work.

use std::sync::Arc;

use outreach_common::incoming;
use outreach_store::{JobCreation, JobId, JobStatus, JobStore, NewLineItem, PrepareId, StoreError};
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct JobQueue {
    store: JobStore,
    wake: Arc<Notify>,
}

impl JobQueue {
    pub fn new(store: JobStore) -> Self {
        Self {
            store,
            wake: Arc::new(Notify::new()),
        }
    }

    pub const fn store(&self) -> &JobStore {
        &self.store
    }

    /// Store a rendered batch for a later [`JobQueue::submit`]
    pub fn prepare(&self, tone: &str, items: Vec<NewLineItem>) -> Result<PrepareId, StoreError> {
        let count = items.len();
        let prepare_id = self.store.create_batch(tone, items)?;
        incoming!(level = INFO, %prepare_id, tone, count, "Batch prepared");
        Ok(prepare_id)
    }

    /// Create a job for `prepare_id` and wake the dispatcher.
    ///
    /// While a job on the batch is queued or running, its id is returned
    /// instead (`created == false`).
    pub fn submit(&self, prepare_id: PrepareId, dry_run: bool) -> Result<JobCreation, StoreError> {
        let creation = self.store.create_job(prepare_id, dry_run)?;
        self.after_submit(prepare_id, dry_run, &creation);
        Ok(creation)
    }

    /// Like [`JobQueue::submit`], but an active job on the batch is a
    /// [`StoreError::Conflict`].
    pub fn submit_exclusive(
        &self,
        prepare_id: PrepareId,
        dry_run: bool,
    ) -> Result<JobCreation, StoreError> {
        let creation = self.store.create_job_exclusive(prepare_id, dry_run)?;
        self.after_submit(prepare_id, dry_run, &creation);
        Ok(creation)
    }

    fn after_submit(&self, prepare_id: PrepareId, dry_run: bool, creation: &JobCreation) {
        incoming!(
            level = INFO,
            %prepare_id,
            job_id = %creation.job_id,
            dry_run,
            created = creation.created,
            status = %creation.status,
            "Send requested"
        );

        if creation.created && creation.status == JobStatus::Queued {
            self.wake.notify_one();
            self.publish_queue_depth();
        }
    }

    /// Cancel a queued job at once, or flag a running one.
    pub fn cancel(&self, job_id: JobId) -> Result<JobStatus, StoreError> {
        let status = self.store.cancel_job(job_id)?;
        incoming!(level = INFO, %job_id, %status, "Cancellation requested");
        self.publish_queue_depth();
        Ok(status)
    }

    pub(crate) fn publish_queue_depth(&self) {
        if let Some(metrics) = outreach_metrics::metrics() {
            metrics
                .dispatch
                .set_queued_jobs(self.store.queued_len() as u64);
        }
    }

    /// Resolves after the next successful submit, or at once if one happened
    /// since the last wait.
    pub(crate) async fn wait(&self) {
        self.wake.notified().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn items() -> Vec<NewLineItem> {
        vec![NewLineItem {
            recipient_email: "alice@example.com".to_string(),
            rendered_subject: "Subject".to_string(),
            rendered_body: "<p>Body</p>".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_submit_wakes_a_later_waiter() {
        let queue = JobQueue::default();
        let prepare_id = queue.prepare("conservative", items()).unwrap();

        // The permit is stored even though nobody is waiting yet
        queue.submit(prepare_id, true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), queue.wait())
            .await
            .expect("wait should resolve");
    }

    #[tokio::test]
    async fn test_idempotent_submit_does_not_queue_twice() {
        let queue = JobQueue::default();
        let prepare_id = queue.prepare("conservative", items()).unwrap();

        let first = queue.submit(prepare_id, false).unwrap();
        let second = queue.submit(prepare_id, false).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.job_id, second.job_id);
        assert_eq!(queue.store().queued_len(), 1);

        assert!(queue.submit_exclusive(prepare_id, false).unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_cancel_queued_job() {
        let queue = JobQueue::default();
        let prepare_id = queue.prepare("conservative", items()).unwrap();
        let job_id = queue.submit(prepare_id, false).unwrap().job_id;

        assert_eq!(queue.cancel(job_id).unwrap(), JobStatus::Cancelled);
        assert_eq!(queue.store().queued_len(), 0);
        assert!(queue.cancel(job_id).unwrap_err().is_conflict());
    }
}
