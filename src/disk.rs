//! Disk-backed cache store.
//!
//! Buckets are directories under a root path; each cached response is one
//! JSON record named by the SHA-256 of its URL. Records are written
//! atomically (write tmp + rename) so a crash mid-put never leaves a
//! half-written entry behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::fetch::{Response, ResponseKind};
use crate::store::CacheStore;

/// On-disk record for a single cached response.
#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    url: String,
    status: u16,
    headers: HashMap<String, String>,
    /// Response body, base64-encoded (bodies are arbitrary bytes).
    body: String,
    kind: ResponseKind,
    stored_at: DateTime<Utc>,
}

impl EntryRecord {
    fn from_response(url: &str, response: &Response) -> Self {
        Self {
            url: url.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
            kind: response.kind,
            stored_at: Utc::now(),
        }
    }

    fn into_response(self) -> Option<Response> {
        let body = BASE64.decode(&self.body).ok()?;
        Some(Response {
            url: self.url,
            status: self.status,
            headers: self.headers,
            body: body.into(),
            kind: self.kind,
        })
    }
}

/// A persistent [`CacheStore`] rooted at a directory.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Creates a disk store rooted at `root`. The directory is created on
    /// first write, not here.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn entry_path(&self, bucket: &str, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        self.bucket_dir(bucket).join(format!("{digest:x}.json"))
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn put(&self, bucket: &str, url: &str, response: &Response) -> Result<()> {
        let dir = self.bucket_dir(bucket);
        tokio::fs::create_dir_all(&dir).await?;

        let record = EntryRecord::from_response(url, response);
        let json = serde_json::to_vec(&record)?;

        let path = self.entry_path(bucket, url);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn lookup(&self, bucket: &str, url: &str) -> Result<Option<Response>> {
        let path = self.entry_path(bucket, url);
        let json = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: EntryRecord = serde_json::from_slice(&json)?;
        Ok(record.into_response())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        match tokio::fs::remove_dir_all(self.bucket_dir(bucket)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename_bucket(&self, from: &str, to: &str) -> Result<()> {
        let from_dir = self.bucket_dir(from);
        if !tokio::fs::try_exists(&from_dir).await? {
            return Ok(());
        }
        // rename over a non-empty directory fails, so clear the target first
        self.delete_bucket(to).await?;
        tokio::fs::rename(&from_dir, self.bucket_dir(to)).await?;
        Ok(())
    }

    async fn bucket_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}
