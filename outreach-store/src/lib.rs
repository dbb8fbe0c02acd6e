//! Storage for outreach: prepared batches, dispatch jobs and the
//! suppression list
//!
//! The [`JobStore`] is the single source of truth for job progress and owns
//! the job state machine. Suppression backends implement
//! [`SuppressionBackend`] and are wrapped by the delivery crate's registry.

pub mod error;
pub mod model;
pub mod store;
pub mod suppression;
pub mod types;

pub use error::{Result, StoreError};
pub use model::{Batch, Job, JobCounts, JobStatus, LineItem, LineStatus, NewLineItem};
pub use store::{JobCreation, JobStore, JobSummary};
pub use suppression::{
    FileSuppressionStore, MemorySuppressionStore, SuppressionBackend, SuppressionEntry,
};
pub use types::{JobId, PrepareId};
