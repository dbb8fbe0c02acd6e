use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{SuppressionBackend, SuppressionEntry};

/// In-memory suppression list
///
/// Entries live only as long as the process. Suitable for tests and for
/// deployments where the list is re-seeded at start-up.
#[derive(Debug, Clone, Default)]
pub struct MemorySuppressionStore {
    entries: Arc<RwLock<HashMap<String, SuppressionEntry>>>,
}

impl MemorySuppressionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SuppressionBackend for MemorySuppressionStore {
    async fn contains(&self, email: &str) -> crate::Result<bool> {
        Ok(self.entries.read().contains_key(email))
    }

    async fn insert(&self, email: &str) -> crate::Result<bool> {
        let mut entries = self.entries.write();
        if entries.contains_key(email) {
            return Ok(false);
        }

        entries.insert(
            email.to_string(),
            SuppressionEntry {
                email: email.to_string(),
                suppressed_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn list(&self) -> crate::Result<Vec<SuppressionEntry>> {
        let mut entries: Vec<_> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(entries)
    }

    async fn len(&self) -> crate::Result<usize> {
        Ok(self.entries.read().len())
    }
}
