//! Batch, line item and job records

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{JobId, PrepareId};

/// Delivery outcome of a single line item.
///
/// `Pending` is the only non-terminal state; every other state is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Pending,
    SkippedSuppressed,
    SkippedCancelled,
    Sent,
    DrySent,
    Failed,
}

impl LineStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::SkippedSuppressed => "skipped_suppressed",
            Self::SkippedCancelled => "skipped_cancelled",
            Self::Sent => "sent",
            Self::DrySent => "dry_sent",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a job.
///
/// ```text
/// queued ──> running ──> completed | completed_with_errors | failed
///    │          │
///    └──────────┴──> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Queued or running jobs hold their batch
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered recipient handed over by the preview collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub recipient_email: String,
    pub rendered_subject: String,
    pub rendered_body: String,
}

/// One recipient within a batch, and its outcome within a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Normalised (trimmed, lower-case) address
    pub recipient_email: String,
    pub rendered_subject: String,
    pub rendered_body: String,
    pub tone: String,
    pub status: LineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempted_at: Option<DateTime<Utc>>,
}

/// An immutable, ordered set of line items produced by preparation
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub prepare_id: PrepareId,
    pub tone: String,
    pub items: Arc<[LineItem]>,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-status tallies for a job.
///
/// `skipped` covers both suppressed and cancelled items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub sent: usize,
    pub dry_sent: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
}

impl JobCounts {
    /// Tally a slice of line items from scratch
    #[must_use]
    pub fn tally(items: &[LineItem]) -> Self {
        let mut counts = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            counts.apply(item.status);
        }
        counts
    }

    /// Account for one item reaching `status`
    pub(crate) const fn apply(&mut self, status: LineStatus) {
        match status {
            LineStatus::Pending => {}
            LineStatus::Sent => self.sent += 1,
            LineStatus::DrySent => self.dry_sent += 1,
            LineStatus::SkippedSuppressed | LineStatus::SkippedCancelled => self.skipped += 1,
            LineStatus::Failed => self.failed += 1,
        }
    }

    /// Items that have reached a terminal status
    #[must_use]
    pub const fn finished(&self) -> usize {
        self.sent + self.dry_sent + self.skipped + self.failed
    }

    #[must_use]
    pub const fn pending(&self) -> usize {
        self.total.saturating_sub(self.finished())
    }

    /// Status of a job whose items have all been dealt with
    #[must_use]
    pub const fn completion_status(&self) -> JobStatus {
        if self.failed > 0 {
            JobStatus::CompletedWithErrors
        } else {
            JobStatus::Completed
        }
    }
}

/// One execution attempt against a batch.
///
/// Values handed out by the store are snapshots taken under the store lock,
/// so a snapshot's counters always agree with its items.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub job_id: JobId,
    pub prepare_id: PrepareId,
    pub dry_run: bool,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counts: JobCounts,
    /// Why the job ended `failed`
    pub failure_reason: Option<String>,
    /// Set when this job replays the outcome of an earlier live job instead
    /// of dispatching again
    pub replay_of: Option<JobId>,
    pub cancel_requested: bool,
    pub items: Vec<LineItem>,
}

impl Job {
    /// Index of the first item that has not reached a terminal status
    #[must_use]
    pub fn next_pending(&self) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.status == LineStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: LineStatus) -> LineItem {
        LineItem {
            recipient_email: "a@example.com".to_string(),
            rendered_subject: "s".to_string(),
            rendered_body: "b".to_string(),
            tone: "conservative".to_string(),
            status,
            error_detail: None,
            attempted_at: None,
        }
    }

    #[test]
    fn test_line_status_terminality() {
        assert!(!LineStatus::Pending.is_terminal());
        for status in [
            LineStatus::SkippedSuppressed,
            LineStatus::SkippedCancelled,
            LineStatus::Sent,
            LineStatus::DrySent,
            LineStatus::Failed,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
    }

    #[test]
    fn test_counts_tally() {
        let items = [
            item(LineStatus::Sent),
            item(LineStatus::SkippedSuppressed),
            item(LineStatus::SkippedCancelled),
            item(LineStatus::Failed),
            item(LineStatus::Pending),
        ];
        let counts = JobCounts::tally(&items);
        assert_eq!(counts.total, 5);
        assert_eq!(counts.sent, 1);
        assert_eq!(counts.skipped, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.finished(), 4);
        assert_eq!(counts.pending(), 1);
    }

    #[test]
    fn test_completion_status_reflects_failures() {
        let clean = JobCounts::tally(&[item(LineStatus::Sent), item(LineStatus::SkippedCancelled)]);
        assert_eq!(clean.completion_status(), JobStatus::Completed);

        let with_failure = JobCounts::tally(&[item(LineStatus::Sent), item(LineStatus::Failed)]);
        assert_eq!(with_failure.completion_status(), JobStatus::CompletedWithErrors);
    }

    #[test]
    fn test_status_display_is_snake_case() {
        assert_eq!(
            JobStatus::CompletedWithErrors.to_string(),
            "completed_with_errors"
        );
        assert_eq!(LineStatus::SkippedSuppressed.to_string(), "skipped_suppressed");
    }

    #[test]
    fn test_active_statuses() {
        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
