// src/manifest.rs
//! Durable log of already-processed input identifiers, enabling
//! incremental re-runs of the quarter merge job.
//!
//! Stored as JSONL, one line per processed input. Growth is unbounded and
//! there is no compaction. The append is read-modify-replace through the
//! store's temp-then-move primitive; it is NOT safe under concurrent
//! writers, which is why the job holds a local lock.

use std::collections::HashSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::storage::StorePath;
use crate::utils::error::StorageError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub input_file: String,
    pub processed_at: String,
}

impl ManifestEntry {
    pub fn now(input_file: impl Into<String>) -> Self {
        Self {
            input_file: input_file.into(),
            processed_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub struct Manifest {
    path: StorePath,
}

impl Manifest {
    pub fn new(path: StorePath) -> Self {
        Self { path }
    }

    /// The set of already-processed input identifiers. A missing or
    /// unreadable manifest yields the empty set (logged): the job then
    /// reprocesses, which is safe but wasteful.
    pub async fn processed(&self) -> HashSet<String> {
        let bytes = match self.path.exists().await {
            Ok(false) => return HashSet::new(),
            Ok(true) => match self.path.get_bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Failed to read manifest {}: {}", self.path.uri(), e);
                    return HashSet::new();
                }
            },
            Err(e) => {
                tracing::warn!("Failed to probe manifest {}: {}", self.path.uri(), e);
                return HashSet::new();
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        let mut out = HashSet::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ManifestEntry>(line) {
                Ok(entry) => {
                    out.insert(entry.input_file);
                }
                Err(e) => {
                    tracing::warn!("Skipping malformed manifest line: {}", e);
                }
            }
        }
        out
    }

    /// Appends entries by rewriting the whole object through a temp
    /// object and an atomic move.
    pub async fn append(&self, entries: &[ManifestEntry]) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut lines: Vec<String> = match self.path.exists().await? {
            true => String::from_utf8_lossy(&self.path.get_bytes().await?)
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect(),
            false => Vec::new(),
        };

        for entry in entries {
            match serde_json::to_string(entry) {
                Ok(line) => lines.push(line),
                Err(e) => {
                    tracing::warn!(
                        "Failed to serialize manifest entry {}: {}",
                        entry.input_file,
                        e
                    );
                }
            }
        }

        let payload = format!("{}\n", lines.join("\n"));
        self.path.replace_bytes(Bytes::from(payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_in(dir: &tempfile::TempDir) -> Manifest {
        Manifest::new(
            StorePath::parse(dir.path().join("manifest.jsonl").to_str().unwrap())
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn missing_manifest_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(manifest_in(&dir).processed().await.is_empty());
    }

    #[tokio::test]
    async fn append_preserves_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_in(&dir);

        manifest
            .append(&[ManifestEntry::now("gs://bucket/parts/a.parquet")])
            .await
            .unwrap();
        manifest
            .append(&[ManifestEntry::now("gs://bucket/parts/b.parquet")])
            .await
            .unwrap();

        let processed = manifest.processed().await;
        assert_eq!(processed.len(), 2);
        assert!(processed.contains("gs://bucket/parts/a.parquet"));
        assert!(processed.contains("gs://bucket/parts/b.parquet"));
    }

    #[tokio::test]
    async fn rerun_processes_only_new_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_in(&dir);

        manifest
            .append(&[ManifestEntry::now("a.parquet")])
            .await
            .unwrap();

        let all = ["a.parquet".to_string(), "b.parquet".to_string()];
        let processed = manifest.processed().await;
        let new_files: Vec<&String> =
            all.iter().filter(|f| !processed.contains(*f)).collect();
        assert_eq!(new_files, vec!["b.parquet"]);

        manifest
            .append(&[ManifestEntry::now("b.parquet")])
            .await
            .unwrap();
        let processed = manifest.processed().await;
        assert_eq!(processed.len(), 2);

        // no duplicate lines for a.parquet
        let raw = StorePath::parse(dir.path().join("manifest.jsonl").to_str().unwrap())
            .unwrap()
            .get_bytes()
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert_eq!(text.matches("a.parquet").count(), 1);
    }
}
