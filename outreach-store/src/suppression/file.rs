use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::internal;
use parking_lot::RwLock;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

use super::{SuppressionBackend, SuppressionEntry};
use crate::StoreError;

/// Append-only, file-backed suppression list
///
/// Each line holds one entry as `<email>\t<rfc3339 timestamp>`. The whole file
/// is loaded at start-up; later additions are appended and `fsync`ed before
/// [`SuppressionBackend::insert`] returns, so an acknowledged opt-out
/// survives a crash.
///
/// A crash mid-append can leave a final line without its newline. On open a
/// well-formed final line is kept and terminated; a malformed one was never
/// acknowledged, so it is cut from the file. Malformed lines anywhere else
/// are corruption.
#[derive(Debug, Clone)]
pub struct FileSuppressionStore {
    path: PathBuf,
    entries: Arc<RwLock<HashMap<String, SuppressionEntry>>>,
    /// Serialises appends; held across the write and sync
    writer: Arc<Mutex<fs::File>>,
}

impl FileSuppressionStore {
    /// Open (or create) the suppression list at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, created, or contains a
    /// malformed line.
    pub async fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let (entries, tail) = match fs::read_to_string(&path).await {
            Ok(contents) => load(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (HashMap::new(), Tail::Clean),
            Err(e) => return Err(e.into()),
        };

        internal!(
            level = INFO,
            path = %path.display(),
            entries = entries.len(),
            "Loaded suppression list"
        );

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        match tail {
            Tail::Clean => {}
            Tail::Unterminated => {
                file.write_all(b"\n").await?;
                file.sync_data().await?;
            }
            Tail::Torn { keep, reason } => {
                internal!(
                    level = WARN,
                    path = %path.display(),
                    %reason,
                    "Dropping torn final line of suppression list"
                );
                file.set_len(keep).await?;
                file.sync_data().await?;
            }
        }

        Ok(Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
            writer: Arc::new(Mutex::new(file)),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// State of the bytes after the last newline
#[derive(Debug, PartialEq, Eq)]
enum Tail {
    Clean,
    /// A valid entry missing its newline
    Unterminated,
    /// A partial write; the file is cut back to `keep` bytes
    Torn { keep: u64, reason: String },
}

fn load(contents: &str) -> crate::Result<(HashMap<String, SuppressionEntry>, Tail)> {
    let complete = contents.rfind('\n').map_or(0, |i| i + 1);
    let (body, rest) = contents.split_at(complete);
    let mut entries = parse(body)?;

    if rest.is_empty() {
        return Ok((entries, Tail::Clean));
    }

    match parse_line(body.lines().count(), rest) {
        Ok(entry) => {
            if let Some(entry) = entry {
                entries.entry(entry.email.clone()).or_insert(entry);
            }
            Ok((entries, Tail::Unterminated))
        }
        Err(e) => Ok((
            entries,
            Tail::Torn {
                keep: complete as u64,
                reason: e.to_string(),
            },
        )),
    }
}

fn parse(contents: &str) -> crate::Result<HashMap<String, SuppressionEntry>> {
    let mut entries = HashMap::new();

    for (index, line) in contents.lines().enumerate() {
        // First occurrence wins, matching the in-process insert semantics
        if let Some(entry) = parse_line(index, line)? {
            entries.entry(entry.email.clone()).or_insert(entry);
        }
    }

    Ok(entries)
}

/// Parse the zero-based line `index`; blank lines yield `None`
fn parse_line(index: usize, line: &str) -> crate::Result<Option<SuppressionEntry>> {
    let line = line.trim_end();
    if line.is_empty() {
        return Ok(None);
    }

    let corrupted = |reason: String| StoreError::Corrupted {
        line: index + 1,
        reason,
    };

    let (email, timestamp) = line
        .split_once('\t')
        .ok_or_else(|| corrupted("missing timestamp".to_string()))?;
    let suppressed_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| corrupted(format!("invalid timestamp: {e}")))?
        .with_timezone(&Utc);

    Ok(Some(SuppressionEntry {
        email: email.to_string(),
        suppressed_at,
    }))
}

#[async_trait]
impl SuppressionBackend for FileSuppressionStore {
    async fn contains(&self, email: &str) -> crate::Result<bool> {
        Ok(self.entries.read().contains_key(email))
    }

    async fn insert(&self, email: &str) -> crate::Result<bool> {
        let mut writer = self.writer.lock().await;

        if self.entries.read().contains_key(email) {
            return Ok(false);
        }

        let entry = SuppressionEntry {
            email: email.to_string(),
            suppressed_at: Utc::now(),
        };

        let line = format!("{}\t{}\n", entry.email, entry.suppressed_at.to_rfc3339());
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        writer.sync_data().await?;

        self.entries.write().insert(entry.email.clone(), entry);
        drop(writer);

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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suppressed.tsv");

        let store = FileSuppressionStore::open(&path).await.unwrap();
        assert!(store.insert("a@example.com").await.unwrap());
        assert!(store.insert("b@example.com").await.unwrap());
        assert!(!store.insert("a@example.com").await.unwrap());
        drop(store);

        let reopened = FileSuppressionStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
        assert!(reopened.contains("a@example.com").await.unwrap());
        assert!(reopened.contains("b@example.com").await.unwrap());
        assert!(!reopened.contains("c@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/suppressed.tsv");

        let store = FileSuppressionStore::open(&path).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_corrupted_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suppressed.tsv");
        std::fs::write(&path, "a@example.com\t2024-01-01T00:00:00+00:00\nbroken-line\n").unwrap();

        let err = FileSuppressionStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_torn_final_line_is_cut_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suppressed.tsv");
        let intact = "a@example.com\t2026-10-19T00:00:00+00:00\n";
        std::fs::write(&path, format!("{intact}b@example.com\t2026-1")).unwrap();

        let store = FileSuppressionStore::open(&path).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
        assert!(store.contains("a@example.com").await.unwrap());
        assert!(!store.contains("b@example.com").await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), intact);

        assert!(store.insert("c@example.com").await.unwrap());
        drop(store);

        let reopened = FileSuppressionStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
        assert!(reopened.contains("c@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_unterminated_final_entry_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suppressed.tsv");
        std::fs::write(&path, "a@example.com\t2026-10-19T00:00:00+00:00").unwrap();

        let store = FileSuppressionStore::open(&path).await.unwrap();
        assert!(store.contains("a@example.com").await.unwrap());
        assert!(store.insert("b@example.com").await.unwrap());
        drop(store);

        let reopened = FileSuppressionStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
        assert!(reopened.contains("a@example.com").await.unwrap());
        assert!(reopened.contains("b@example.com").await.unwrap());
    }

    #[test]
    fn test_load_reports_torn_tail() {
        let (entries, tail) = load("a@example.com\t2026-10-19T00:00:00+00:00\nb@exa").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(tail, Tail::Torn { keep: 40, .. }));
    }

    #[test]
    fn test_parse_keeps_first_occurrence() {
        let parsed = parse(
            "a@example.com\t2024-01-01T00:00:00+00:00\n\na@example.com\t2025-01-01T00:00:00+00:00\n",
        )
        .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(
            parsed["a@example.com"].suppressed_at.to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
    }
}
