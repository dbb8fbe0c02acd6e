//! Errors raised while running the dispatcher.
//!
//! Per-item send failures are not errors at this level: they are recorded on
//! the line item and the job carries on. What reaches a [`DispatchError`] is
//! either a store problem or a configuration problem.

use outreach_common::ConfigError;
use outreach_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DispatchError {
    /// A broken store invariant. The dispatcher stops rather than continue
    /// with counters it can no longer trust.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        match self {
            Self::Store(e) => e.is_invariant_violation(),
            Self::Config(_) => false,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}

#[cfg(test)]
mod tests {
    use outreach_store::JobId;

    use super::*;

    #[test]
    fn test_classification() {
        let job_id = JobId::generate();

        let violation = DispatchError::from(StoreError::InvariantViolation {
            job_id,
            reason: "line 0 is already sent".to_string(),
        });
        assert!(violation.is_invariant_violation());
        assert!(!violation.is_not_found());

        let missing = DispatchError::from(StoreError::JobNotFound(job_id));
        assert!(missing.is_not_found());
        assert!(!missing.is_invariant_violation());

        let config = DispatchError::from(ConfigError::MissingField("api_key"));
        assert!(!config.is_invariant_violation());
    }
}
