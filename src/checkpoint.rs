// src/checkpoint.rs
//! Durable scan-position snapshot for the scrape loop.
//!
//! Checkpoint durability is best effort: a failed load means "start
//! fresh", a failed save is logged and the run continues. Losing a
//! checkpoint costs re-fetching at most one save-cadence worth of rows;
//! aborting the run would cost everything since the last part.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::storage::StorePath;

/// Scan position plus running counters. `rowgroup` counts row groups
/// across all input parts in listing order; `row_in_rowgroup` indexes the
/// filtered candidate sequence within that row group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub rowgroup: usize,
    pub row_in_rowgroup: usize,
    pub out_part: usize,
    pub ok_in_part: usize,
    pub total_seen: u64,
    pub total_ok: u64,
    #[serde(default)]
    pub updated_at: String,
}

/// Returns `None` when no checkpoint object exists or it cannot be read
/// or parsed; the caller treats all three the same way (start fresh).
pub async fn load(path: &StorePath) -> Option<Checkpoint> {
    match path.exists().await {
        Ok(false) => return None,
        Err(e) => {
            tracing::warn!("Failed to probe checkpoint {}: {}", path.uri(), e);
            return None;
        }
        Ok(true) => {}
    }

    let bytes = match path.get_bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to load checkpoint {}: {}", path.uri(), e);
            return None;
        }
    };

    match serde_json::from_slice::<Checkpoint>(&bytes) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!("Failed to parse checkpoint {}: {}", path.uri(), e);
            None
        }
    }
}

/// Overwrites the checkpoint object in place, stamping `updated_at`.
/// Never fails the run: checkpoint loss is logged and tolerated.
pub async fn save(path: &StorePath, state: &Checkpoint) {
    let mut state = state.clone();
    state.updated_at = chrono::Utc::now().to_rfc3339();

    let payload = match serde_json::to_vec_pretty(&state) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Failed to serialize checkpoint {}: {}", path.uri(), e);
            return;
        }
    };

    if let Err(e) = path.put_bytes(Bytes::from(payload)).await {
        tracing::warn!("Failed to save checkpoint {}: {}", path.uri(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = StorePath::parse(
            dir.path().join("_checkpoint.json").to_str().unwrap(),
        )
        .unwrap();
        assert!(load(&path).await.is_none());
    }

    #[tokio::test]
    async fn load_garbage_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = StorePath::parse(
            dir.path().join("_checkpoint.json").to_str().unwrap(),
        )
        .unwrap();
        path.put_bytes(Bytes::from_static(b"not json"))
            .await
            .unwrap();
        assert!(load(&path).await.is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = StorePath::parse(
            dir.path().join("_checkpoint.json").to_str().unwrap(),
        )
        .unwrap();

        let state = Checkpoint {
            rowgroup: 3,
            row_in_rowgroup: 17,
            out_part: 2,
            ok_in_part: 45,
            total_seen: 612,
            total_ok: 580,
            updated_at: String::new(),
        };
        save(&path, &state).await;

        let loaded = load(&path).await.expect("checkpoint should exist");
        assert_eq!(loaded.rowgroup, 3);
        assert_eq!(loaded.row_in_rowgroup, 17);
        assert_eq!(loaded.out_part, 2);
        assert_eq!(loaded.ok_in_part, 45);
        assert_eq!(loaded.total_seen, 612);
        assert_eq!(loaded.total_ok, 580);
        assert!(!loaded.updated_at.is_empty());
    }
}
