//! Error types for the outreach-store crate.

use std::io;

use outreach_common::InvalidEmail;
use thiserror::Error;

use crate::{JobId, JobStatus, PrepareId};

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No batch was prepared under this identifier.
    #[error("Batch not found: {0}")]
    BatchNotFound(PrepareId),

    /// No job exists with this identifier.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// The batch already has a queued or running job.
    #[error("Batch {prepare_id} already has an active job {job_id}")]
    Conflict { prepare_id: PrepareId, job_id: JobId },

    /// The job has already reached a terminal status.
    #[error("Job {job_id} has already finished ({status})")]
    AlreadyFinished { job_id: JobId, status: JobStatus },

    /// Preparation handed over an unusable batch.
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// A recipient address failed normalisation.
    #[error("Invalid recipient at line {index}: {source}")]
    InvalidRecipient {
        index: usize,
        #[source]
        source: InvalidEmail,
    },

    /// A suppression request carried an unusable address.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] InvalidEmail),

    /// A state transition that must never happen was attempted.
    ///
    /// This is a programming fault in the caller, not a runtime condition.
    #[error("Invariant violation on job {job_id}: {reason}")]
    InvariantViolation { job_id: JobId, reason: String },

    /// I/O operation on a persisted suppression list failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persisted suppression list could not be read back.
    #[error("Corrupted suppression list at line {line}: {reason}")]
    Corrupted { line: usize, reason: String },
}

impl StoreError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::BatchNotFound(_) | Self::JobNotFound(_))
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyFinished { .. })
    }

    /// Errors caused by the data a caller supplied
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidBatch(_) | Self::InvalidRecipient { .. } | Self::InvalidEmail(_)
        )
    }

    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(StoreError::JobNotFound(JobId::generate()).is_not_found());
        assert!(StoreError::BatchNotFound(PrepareId::generate()).is_not_found());

        let conflict = StoreError::Conflict {
            prepare_id: PrepareId::generate(),
            job_id: JobId::generate(),
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_not_found());

        let violation = StoreError::InvariantViolation {
            job_id: JobId::generate(),
            reason: "line 0 already sent".to_string(),
        };
        assert!(violation.is_invariant_violation());
        assert!(!violation.is_validation());
    }

    #[test]
    fn test_invalid_recipient_keeps_source() {
        let err = StoreError::InvalidRecipient {
            index: 3,
            source: InvalidEmail::Empty,
        };
        assert!(err.is_validation());
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Invalid recipient at line 3: Email address is empty"
        );
    }
}
