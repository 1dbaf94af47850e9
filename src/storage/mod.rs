// src/storage/mod.rs
pub mod lock;

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};

use crate::utils::error::StorageError;

/// Which storage backend a URI resolved to. Decided once, at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Local,
    Gcs,
    S3,
}

/// One resolved storage location: a backend plus an object path within it.
///
/// `gs://bucket/key` and `s3://bucket/key` go to the matching cloud store;
/// everything else is treated as a local filesystem path (made absolute
/// against the current directory). All commands speak to storage through
/// this type only.
#[derive(Clone)]
pub struct StorePath {
    backend: Backend,
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
    uri_root: String, // "gs://bucket", "s3://bucket", or "" for local
}

impl std::fmt::Debug for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePath")
            .field("backend", &self.backend)
            .field("uri", &self.uri())
            .finish()
    }
}

fn split_bucket_key(rest: &str, uri: &str) -> Result<(String, String), StorageError> {
    let (bucket, key) = match rest.split_once('/') {
        Some((b, k)) => (b, k),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        return Err(StorageError::InvalidUri(
            uri.to_string(),
            "missing bucket name".to_string(),
        ));
    }
    Ok((bucket.to_string(), key.trim_matches('/').to_string()))
}

impl StorePath {
    /// Resolves a URI string into a concrete backend. Invalid URIs are
    /// configuration errors and should terminate the run.
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let s = uri.trim();
        if let Some(rest) = s.strip_prefix("gs://") {
            let (bucket, key) = split_bucket_key(rest, s)?;
            let store = GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(&bucket)
                .build()?;
            Ok(Self {
                backend: Backend::Gcs,
                store: Arc::new(store),
                path: ObjectPath::from(key),
                uri_root: format!("gs://{bucket}"),
            })
        } else if let Some(rest) = s.strip_prefix("s3://") {
            let (bucket, key) = split_bucket_key(rest, s)?;
            let store = AmazonS3Builder::from_env()
                .with_bucket_name(&bucket)
                .build()?;
            Ok(Self {
                backend: Backend::S3,
                store: Arc::new(store),
                path: ObjectPath::from(key),
                uri_root: format!("s3://{bucket}"),
            })
        } else {
            let raw = PathBuf::from(s);
            let abs = if raw.is_absolute() {
                raw
            } else {
                std::env::current_dir()
                    .map_err(StorageError::Io)?
                    .join(raw)
            };
            let path = ObjectPath::from_absolute_path(&abs).map_err(|e| {
                StorageError::InvalidUri(s.to_string(), e.to_string())
            })?;
            Ok(Self {
                backend: Backend::Local,
                store: Arc::new(LocalFileSystem::new()),
                path,
                uri_root: String::new(),
            })
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Display form of the location (round-trips through `parse`).
    pub fn uri(&self) -> String {
        format!("{}/{}", self.uri_root, self.path)
    }

    /// Last path segment, e.g. the file name.
    pub fn name(&self) -> &str {
        self.path
            .as_ref()
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// Joins one or more `/`-separated segments under this location.
    pub fn child(&self, rel: &str) -> StorePath {
        let joined = format!("{}/{}", self.path, rel.trim_matches('/'));
        StorePath {
            backend: self.backend,
            store: Arc::clone(&self.store),
            path: ObjectPath::from(joined),
            uri_root: self.uri_root.clone(),
        }
    }

    fn with_object_path(&self, path: ObjectPath) -> StorePath {
        StorePath {
            backend: self.backend,
            store: Arc::clone(&self.store),
            path,
            uri_root: self.uri_root.clone(),
        }
    }

    pub async fn exists(&self) -> Result<bool, StorageError> {
        match self.store.head(&self.path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_bytes(&self) -> Result<Bytes, StorageError> {
        let result = self.store.get(&self.path).await?;
        Ok(result.bytes().await?)
    }

    /// Writes the object, creating missing parent directories on the
    /// local backend first.
    pub async fn put_bytes(&self, data: Bytes) -> Result<(), StorageError> {
        self.ensure_local_parent().await?;
        self.store
            .put(&self.path, PutPayload::from(data))
            .await?;
        Ok(())
    }

    /// Writes to `<path>.tmp` and then moves it over the target, so readers
    /// never observe a partial object. Not safe under concurrent writers.
    pub async fn replace_bytes(&self, data: Bytes) -> Result<(), StorageError> {
        self.ensure_local_parent().await?;
        let tmp = ObjectPath::from(format!("{}.tmp", self.path));
        self.store.put(&tmp, PutPayload::from(data)).await?;
        self.store.rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Recursively lists objects under this prefix whose names end with
    /// `suffix` (case-insensitive), sorted by path.
    pub async fn list_with_suffix(
        &self,
        suffix: &str,
    ) -> Result<Vec<StorePath>, StorageError> {
        let mut stream = self.store.list(Some(&self.path));
        let mut out = Vec::new();
        while let Some(meta) = stream.try_next().await? {
            if meta
                .location
                .as_ref()
                .to_ascii_lowercase()
                .ends_with(suffix)
            {
                out.push(self.with_object_path(meta.location));
            }
        }
        out.sort_by(|a, b| a.path.as_ref().cmp(b.path.as_ref()));
        Ok(out)
    }

    /// Immediate child prefixes ("directories") under this location,
    /// sorted by path.
    pub async fn list_dirs(&self) -> Result<Vec<StorePath>, StorageError> {
        let listing = self
            .store
            .list_with_delimiter(Some(&self.path))
            .await?;
        let mut out: Vec<StorePath> = listing
            .common_prefixes
            .into_iter()
            .map(|p| self.with_object_path(p))
            .collect();
        out.sort_by(|a, b| a.path.as_ref().cmp(b.path.as_ref()));
        Ok(out)
    }

    async fn ensure_local_parent(&self) -> Result<(), StorageError> {
        if self.backend != Backend::Local {
            return Ok(());
        }
        let full = PathBuf::from(format!("/{}", self.path));
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StorageError::Io)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_classifies_backends() {
        let g = StorePath::parse("gs://my-bucket/some/prefix").unwrap();
        assert_eq!(g.backend(), Backend::Gcs);
        assert_eq!(g.uri(), "gs://my-bucket/some/prefix");

        let l = StorePath::parse("/tmp/anywhere/out").unwrap();
        assert_eq!(l.backend(), Backend::Local);
        assert_eq!(l.uri(), "/tmp/anywhere/out");
    }

    #[test]
    fn parse_rejects_missing_bucket() {
        assert!(StorePath::parse("gs://").is_err());
    }

    #[test]
    fn child_joins_segments() {
        let p = StorePath::parse("gs://bucket/base").unwrap();
        assert_eq!(
            p.child("year=2020/q1.parquet").uri(),
            "gs://bucket/base/year=2020/q1.parquet"
        );
    }

    #[tokio::test]
    async fn put_creates_parents_and_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let target = StorePath::parse(
            dir.path().join("a/b/c.bin").to_str().unwrap(),
        )
        .unwrap();

        assert!(!target.exists().await.unwrap());
        target.put_bytes(Bytes::from_static(b"hello")).await.unwrap();
        assert!(target.exists().await.unwrap());
        assert_eq!(target.get_bytes().await.unwrap().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn replace_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let target =
            StorePath::parse(dir.path().join("m.jsonl").to_str().unwrap())
                .unwrap();

        target.replace_bytes(Bytes::from_static(b"one\n")).await.unwrap();
        target.replace_bytes(Bytes::from_static(b"two\n")).await.unwrap();
        assert_eq!(target.get_bytes().await.unwrap().as_ref(), b"two\n");
        // the temp object must not linger
        let tmp = target
            .with_object_path(ObjectPath::from(format!("{}.tmp", target.path)));
        assert!(!tmp.exists().await.unwrap());
    }

    #[tokio::test]
    async fn list_filters_by_suffix_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let base =
            StorePath::parse(dir.path().to_str().unwrap()).unwrap();
        for name in ["part-000001.parquet", "part-000000.parquet", "note.txt"] {
            base.child(name)
                .put_bytes(Bytes::from_static(b"x"))
                .await
                .unwrap();
        }
        let found = base.list_with_suffix(".parquet").await.unwrap();
        let names: Vec<&str> = found.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["part-000000.parquet", "part-000001.parquet"]);
    }
}
