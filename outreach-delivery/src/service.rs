//! Read-only projections of job state for callers
//!
//! Transports depend on [`JobQueryService`] rather than on the store, so the
//! decision of what a caller may see lives in one place: recipient addresses
//! are masked unless the caller is privileged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use outreach_store::{
    Batch, Job, JobCounts, JobId, JobStatus, JobStore, JobSummary, LineStatus, PrepareId,
    StoreError,
};
use serde::Serialize;

use crate::redact::{MaskingRedactor, Redactor};

/// Whether recipient addresses may be shown in full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Masked,
    Unmasked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    #[serde(flatten)]
    pub counts: JobCounts,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientView {
    pub index: usize,
    pub email: String,
    pub status: LineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub prepare_id: PrepareId,
    pub status: JobStatus,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_of: Option<JobId>,
    pub cancel_requested: bool,
    pub recipients: Vec<RecipientView>,
}

/// One rendered item shown back after preparation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewItem {
    pub email: String,
    pub subject: String,
    pub body_html: String,
}

pub trait JobQueryService: Send + Sync {
    /// Snapshot of one job, with addresses masked per `visibility`
    fn job_status(&self, job_id: JobId, visibility: Visibility)
    -> Result<JobStatusView, StoreError>;

    /// Every job, oldest first, without per-recipient detail
    fn list_jobs(&self) -> Vec<JobSummary>;

    /// The first `limit` items of a batch, addresses masked
    fn preview(&self, prepare_id: PrepareId, limit: usize) -> Result<Vec<PreviewItem>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct StatusProjection {
    store: JobStore,
    redactor: Arc<dyn Redactor>,
}

impl StatusProjection {
    pub fn new(store: JobStore) -> Self {
        Self::with_redactor(store, Arc::new(MaskingRedactor))
    }

    pub fn with_redactor(store: JobStore, redactor: Arc<dyn Redactor>) -> Self {
        Self { store, redactor }
    }

    fn project(&self, job: Job, visibility: Visibility) -> JobStatusView {
        let recipients = job
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let (email, error_detail) = match visibility {
                    Visibility::Unmasked => (item.recipient_email, item.error_detail),
                    Visibility::Masked => (
                        self.redactor.mask_email(&item.recipient_email),
                        item.error_detail
                            .map(|detail| self.redactor.mask_detail(&detail, &item.recipient_email)),
                    ),
                };

                RecipientView {
                    index,
                    email,
                    status: item.status,
                    error_detail,
                    attempted_at: item.attempted_at,
                }
            })
            .collect();

        JobStatusView {
            job_id: job.job_id,
            prepare_id: job.prepare_id,
            status: job.status,
            dry_run: job.dry_run,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            progress: Progress {
                counts: job.counts,
                pending: job.counts.pending(),
            },
            failure_reason: job.failure_reason,
            replay_of: job.replay_of,
            cancel_requested: job.cancel_requested,
            recipients,
        }
    }

    fn preview_batch(&self, batch: &Batch, limit: usize) -> Vec<PreviewItem> {
        batch
            .items
            .iter()
            .take(limit)
            .map(|item| PreviewItem {
                email: self.redactor.mask_email(&item.recipient_email),
                subject: item.rendered_subject.clone(),
                body_html: item.rendered_body.clone(),
            })
            .collect()
    }
}

impl JobQueryService for StatusProjection {
    fn job_status(
        &self,
        job_id: JobId,
        visibility: Visibility,
    ) -> Result<JobStatusView, StoreError> {
        let job = self.store.get_status(job_id)?;
        Ok(self.project(job, visibility))
    }

    fn list_jobs(&self) -> Vec<JobSummary> {
        self.store.list_jobs()
    }

    fn preview(&self, prepare_id: PrepareId, limit: usize) -> Result<Vec<PreviewItem>, StoreError> {
        let batch = self.store.get_batch(prepare_id)?;
        Ok(self.preview_batch(&batch, limit))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use outreach_store::NewLineItem;
    use pretty_assertions::assert_eq;

    use super::*;

    fn setup(emails: &[&str]) -> (JobStore, JobId) {
        let store = JobStore::new();
        let items = emails
            .iter()
            .map(|email| NewLineItem {
                recipient_email: (*email).to_string(),
                rendered_subject: "Subject".to_string(),
                rendered_body: "<p>Body</p>".to_string(),
            })
            .collect();
        let prepare_id = store.create_batch("conservative", items).unwrap();
        let job_id = store.create_job(prepare_id, false).unwrap().job_id;
        (store, job_id)
    }

    #[test]
    fn test_masked_by_default_unmasked_when_privileged() {
        let (store, job_id) = setup(&["alice@example.com", "al@example.com"]);
        store.claim_next().unwrap();
        store
            .record_outcome(
                job_id,
                0,
                LineStatus::Failed,
                Some("Recipient rejected: alice@example.com bounced".to_string()),
            )
            .unwrap();

        let projection = StatusProjection::new(store);

        let masked = projection.job_status(job_id, Visibility::Masked).unwrap();
        assert_eq!(masked.recipients[0].email, "a***e@example.com");
        assert_eq!(
            masked.recipients[0].error_detail.as_deref(),
            Some("Recipient rejected: a***e@example.com bounced")
        );
        assert_eq!(masked.recipients[1].email, "**@example.com");
        assert_eq!(masked.status, JobStatus::Running);
        assert_eq!(masked.progress.counts.failed, 1);
        assert_eq!(masked.progress.pending, 1);

        let unmasked = projection.job_status(job_id, Visibility::Unmasked).unwrap();
        assert_eq!(unmasked.recipients[0].email, "alice@example.com");
        assert_eq!(
            unmasked.recipients[0].error_detail.as_deref(),
            Some("Recipient rejected: alice@example.com bounced")
        );
    }

    #[test]
    fn test_projection_never_mutates() {
        let (store, job_id) = setup(&["alice@example.com"]);
        let projection = StatusProjection::new(store.clone());

        let before = store.get_status(job_id).unwrap();
        projection.job_status(job_id, Visibility::Masked).unwrap();
        let after = store.get_status(job_id).unwrap();

        assert_eq!(before.items, after.items);
        assert_eq!(before.status, after.status);
    }

    #[test]
    fn test_unknown_job_is_not_found() {
        let projection = StatusProjection::new(JobStore::new());
        let err = projection
            .job_status(JobId::generate(), Visibility::Masked)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_preview_is_truncated_and_masked() {
        let emails: Vec<String> = (0..15).map(|i| format!("user{i}@example.com")).collect();
        let refs: Vec<&str> = emails.iter().map(String::as_str).collect();
        let (store, job_id) = setup(&refs);
        let prepare_id = store.get_status(job_id).unwrap().prepare_id;

        let preview = StatusProjection::new(store).preview(prepare_id, 10).unwrap();
        assert_eq!(preview.len(), 10);
        assert_eq!(preview[0].email, "u***0@example.com");
        assert_eq!(preview[0].subject, "Subject");
    }

    #[test]
    fn test_status_view_serialises_flat_progress() {
        let (store, job_id) = setup(&["alice@example.com"]);
        let view = StatusProjection::new(store)
            .job_status(job_id, Visibility::Masked)
            .unwrap();

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["progress"]["total"], 1);
        assert_eq!(json["progress"]["pending"], 1);
        assert_eq!(json["recipients"][0]["status"], "pending");
        assert!(json.get("failure_reason").is_none());
    }
}
