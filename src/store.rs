//! Cache bucket storage abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::fetch::Response;

/// Abstraction over persistent, bucketed response storage.
///
/// Each cache generation writes only to its own uniquely-named bucket, so
/// generations never race on the same keys. Buckets are created implicitly
/// on the first `put`. Implementations must provide atomic per-entry
/// put/lookup semantics; cross-entry consistency is the worker's job
/// (staging bucket committed via [`rename_bucket`](CacheStore::rename_bucket)).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Stores a response under `url` in the named bucket, overwriting any
    /// previous entry for the same URL.
    async fn put(&self, bucket: &str, url: &str, response: &Response) -> Result<()>;

    /// Looks up the cached response for `url` in the named bucket.
    async fn lookup(&self, bucket: &str, url: &str) -> Result<Option<Response>>;

    /// Deletes an entire bucket. Returns true if the bucket existed.
    async fn delete_bucket(&self, bucket: &str) -> Result<bool>;

    /// Renames a bucket, replacing any bucket already at the target name.
    /// This is the commit step of an all-or-nothing install.
    async fn rename_bucket(&self, from: &str, to: &str) -> Result<()>;

    /// Lists the names of all buckets currently in storage.
    async fn bucket_names(&self) -> Result<Vec<String>>;
}

/// In-memory cache store.
///
/// Used by tests and by short-lived sessions that do not need the cache to
/// survive a restart; the durable equivalent is [`DiskStore`](crate::DiskStore).
#[derive(Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, HashMap<String, Response>>>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries in a bucket, or `None` if the bucket
    /// does not exist.
    #[must_use]
    pub fn entry_count(&self, bucket: &str) -> Option<usize> {
        self.buckets
            .read()
            .expect("store lock poisoned")
            .get(bucket)
            .map(HashMap::len)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn put(&self, bucket: &str, url: &str, response: &Response) -> Result<()> {
        let mut buckets = self.buckets.write().expect("store lock poisoned");
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(url.to_string(), response.clone());
        Ok(())
    }

    async fn lookup(&self, bucket: &str, url: &str) -> Result<Option<Response>> {
        let buckets = self.buckets.read().expect("store lock poisoned");
        Ok(buckets.get(bucket).and_then(|b| b.get(url)).cloned())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        let mut buckets = self.buckets.write().expect("store lock poisoned");
        Ok(buckets.remove(bucket).is_some())
    }

    async fn rename_bucket(&self, from: &str, to: &str) -> Result<()> {
        let mut buckets = self.buckets.write().expect("store lock poisoned");
        if let Some(entries) = buckets.remove(from) {
            buckets.insert(to.to_string(), entries);
        }
        Ok(())
    }

    async fn bucket_names(&self) -> Result<Vec<String>> {
        let buckets = self.buckets.read().expect("store lock poisoned");
        Ok(buckets.keys().cloned().collect())
    }
}
