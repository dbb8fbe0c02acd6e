//! Storage for suppressed (opted-out) recipient addresses
//!
//! Backends store addresses exactly as given; callers normalise first. There
//! is deliberately no removal operation: an operator purges entries outside
//! the process.

mod file;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use file::FileSuppressionStore;
pub use memory::MemorySuppressionStore;

/// A suppressed address and when it was first suppressed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionEntry {
    pub email: String,
    pub suppressed_at: DateTime<Utc>,
}

#[async_trait]
pub trait SuppressionBackend: std::fmt::Debug + Send + Sync {
    /// Whether `email` has been suppressed
    async fn contains(&self, email: &str) -> crate::Result<bool>;

    /// Suppress `email`.
    ///
    /// Returns `true` if the address was newly added. When this returns the
    /// entry is visible to every later [`SuppressionBackend::contains`] call
    /// and, for persistent backends, durably written.
    async fn insert(&self, email: &str) -> crate::Result<bool>;

    /// Every suppressed entry, ordered by address
    async fn list(&self) -> crate::Result<Vec<SuppressionEntry>>;

    async fn len(&self) -> crate::Result<usize>;
}
