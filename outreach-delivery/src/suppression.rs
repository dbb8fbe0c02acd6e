//! Suppression registry: the opt-out list every dispatch consults

use std::sync::Arc;

use outreach_common::{internal, normalize_email};
use outreach_store::{
    FileSuppressionStore, MemorySuppressionStore, StoreError, SuppressionBackend,
    SuppressionEntry,
};
use serde::Deserialize;

use crate::redact::mask_email;

/// Where suppression entries are kept
#[derive(Debug, Clone, Default, Deserialize)]
pub enum SuppressionConfig {
    #[default]
    Memory,
    File { path: std::path::PathBuf },
}

/// Normalising front for a [`SuppressionBackend`]
///
/// Addresses are trimmed and lower-cased before every lookup and insert, so
/// callers never need to agree on a spelling.
#[derive(Debug, Clone)]
pub struct SuppressionRegistry {
    backend: Arc<dyn SuppressionBackend>,
}

impl Default for SuppressionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(MemorySuppressionStore::new()))
    }
}

impl SuppressionRegistry {
    pub fn new(backend: Arc<dyn SuppressionBackend>) -> Self {
        Self { backend }
    }

    /// Open the backend named by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if a file backend cannot be opened or parsed.
    pub async fn from_config(config: &SuppressionConfig) -> Result<Self, StoreError> {
        let backend: Arc<dyn SuppressionBackend> = match config {
            SuppressionConfig::Memory => Arc::new(MemorySuppressionStore::new()),
            SuppressionConfig::File { path } => Arc::new(FileSuppressionStore::open(path).await?),
        };
        Ok(Self::new(backend))
    }

    /// Whether `email` has opted out.
    ///
    /// An address that cannot be normalised can never have been added, so it
    /// is reported as not suppressed.
    pub async fn is_suppressed(&self, email: &str) -> Result<bool, StoreError> {
        match normalize_email(email) {
            Ok(normalized) => self.backend.contains(&normalized).await,
            Err(_) => Ok(false),
        }
    }

    /// Add `email` to the list, returning whether it was newly added.
    ///
    /// When this returns, every later [`SuppressionRegistry::is_suppressed`]
    /// call sees the entry.
    #[tracing::instrument(skip_all)]
    pub async fn add(&self, email: &str) -> Result<bool, StoreError> {
        let normalized = normalize_email(email)?;
        let added = self.backend.insert(&normalized).await?;

        if added {
            internal!(level = INFO, recipient = %mask_email(&normalized), "Recipient suppressed");
            if let Some(metrics) = outreach_metrics::metrics() {
                metrics.dispatch.record_suppression();
            }
        } else {
            internal!(level = DEBUG, recipient = %mask_email(&normalized), "Recipient already suppressed");
        }

        Ok(added)
    }

    pub async fn list(&self) -> Result<Vec<SuppressionEntry>, StoreError> {
        self.backend.list().await
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.backend.len().await
    }
}
