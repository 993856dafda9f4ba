//! The offline cache worker: generation lifecycle and fetch policies.
//!
//! One worker owns one versioned cache bucket. Install pre-fetches the
//! whole asset list into a staging bucket and commits it by rename, so a
//! generation is never visible half-populated. Activation deletes every
//! bucket that is not its own and then claims all open clients.

use std::sync::{Arc, RwLock};

use futures::{StreamExt, stream};

use crate::assets::AssetList;
use crate::clients::ClientRegistry;
use crate::error::{Error, Result};
use crate::fetch::{Network, Request, RequestMode, Response};
use crate::store::CacheStore;

/// Lifecycle states of a cache worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, install not yet attempted.
    New,
    /// Install in progress (asset list being fetched).
    Installing,
    /// Install succeeded; waiting to activate.
    Installed,
    /// Activation in progress (pruning foreign buckets).
    Activating,
    /// In control; intercepting fetches.
    Active,
    /// Discarded: either install failed or a newer generation took over.
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        };
        write!(f, "{name}")
    }
}

/// One cache generation: the background worker that owns a versioned
/// bucket and answers intercepted fetches.
///
/// All per-event inputs (version, asset list) come from the [`AssetList`]
/// configuration; nothing depends on in-memory state surviving between
/// lifecycle events.
pub struct CacheWorker<N, S> {
    assets: AssetList,
    net: Arc<N>,
    store: Arc<S>,
    state: RwLock<WorkerState>,
}

impl<N, S> CacheWorker<N, S> {
    /// Creates a worker for the given manifest over shared network and
    /// store handles.
    #[must_use]
    pub fn new(assets: AssetList, net: Arc<N>, store: Arc<S>) -> Self {
        Self {
            assets,
            net,
            store,
            state: RwLock::new(WorkerState::New),
        }
    }

    /// Version string of this generation (also its bucket name).
    #[must_use]
    pub fn version(&self) -> &str {
        &self.assets.version
    }

    /// The manifest this worker was built from.
    #[must_use]
    pub const fn assets(&self) -> &AssetList {
        &self.assets
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.read().expect("state lock poisoned")
    }

    fn set_state(&self, next: WorkerState) {
        *self.state.write().expect("state lock poisoned") = next;
    }

    fn expect_state(&self, expected: WorkerState) -> Result<()> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }

    /// Marks this generation redundant (superseded or discarded).
    pub fn mark_redundant(&self) {
        self.set_state(WorkerState::Redundant);
    }

    fn staging_bucket(&self) -> String {
        // '#' cannot appear in a version committed by install, so a staging
        // bucket can never collide with a live generation
        format!("{}#staging", self.assets.version)
    }
}

impl<N, S> std::fmt::Debug for CacheWorker<N, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWorker")
            .field("version", &self.assets.version)
            .field("state", &self.state())
            .finish()
    }
}

impl<N: Network, S: CacheStore> CacheWorker<N, S> {
    /// Fetches and stores the full asset list, all-or-nothing.
    ///
    /// Assets are fetched with bounded concurrency into a staging bucket;
    /// the bucket is committed under the version name only once every asset
    /// is stored. On any failure the staging bucket is deleted and the
    /// worker becomes redundant, leaving whatever generation was previously
    /// active untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Install`] if any asset fails to fetch or comes back
    /// as anything other than a 200 same-origin response, or the underlying
    /// store error if committing fails.
    pub async fn install(&self) -> Result<()> {
        self.expect_state(WorkerState::New)?;
        self.set_state(WorkerState::Installing);

        let staging = self.staging_bucket();
        let result = self.fetch_asset_batch(&staging).await;

        if let Err(e) = result {
            let _ = self.store.delete_bucket(&staging).await;
            self.set_state(WorkerState::Redundant);
            log::warn!("install of {} aborted: {e}", self.assets.version);
            return Err(e);
        }

        self.store
            .rename_bucket(&staging, &self.assets.version)
            .await?;
        self.set_state(WorkerState::Installed);
        log::debug!(
            "installed {} ({} assets)",
            self.assets.version,
            self.assets.paths.len()
        );
        Ok(())
    }

    async fn fetch_asset_batch(&self, staging: &str) -> Result<()> {
        let results: Vec<Result<()>> = stream::iter(self.assets.resolved_urls())
            .map(|url| async move {
                let request = Request::sub_resource(url.clone());
                let response = self
                    .net
                    .fetch(&request)
                    .await
                    .map_err(|e| Error::Install {
                        url: url.clone(),
                        reason: e.to_string(),
                    })?;
                if !response.is_cacheable() {
                    return Err(Error::Install {
                        url,
                        reason: format!("status {}", response.status),
                    });
                }
                self.store.put(staging, &url, &response).await
            })
            .buffer_unordered(self.assets.concurrent_fetches.max(1))
            .collect()
            .await;

        results.into_iter().collect()
    }

    /// Deletes every bucket whose name is not this generation's version,
    /// then claims all open clients.
    ///
    /// Pruning completes before the claim so a client is never controlled
    /// by a generation that still shares storage with stale buckets.
    ///
    /// # Errors
    ///
    /// Returns an error if bucket enumeration or deletion fails, or if the
    /// worker is not in the installed state.
    pub async fn activate(&self, clients: &ClientRegistry) -> Result<()> {
        self.expect_state(WorkerState::Installed)?;
        self.set_state(WorkerState::Activating);

        for name in self.store.bucket_names().await? {
            if name != self.assets.version {
                self.store.delete_bucket(&name).await?;
                log::debug!("pruned stale bucket {name}");
            }
        }

        clients.claim(&self.assets.version);
        self.set_state(WorkerState::Active);
        Ok(())
    }

    /// Answers an intercepted fetch per the resource-type policy:
    /// network-first for navigations, cache-first for everything else.
    ///
    /// # Errors
    ///
    /// Returns an error only when every applicable source failed: for a
    /// navigation, the network failed and no cached copy exists; for a
    /// sub-resource, the cache missed and the network failed.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response> {
        match request.mode {
            RequestMode::Navigate => self.network_first(request).await,
            RequestMode::SubResource => self.cache_first(request).await,
        }
    }

    /// Documents must reflect the newest deployed content when connectivity
    /// exists; the cached copy is only a fallback.
    async fn network_first(&self, request: &Request) -> Result<Response> {
        match self.net.fetch(request).await {
            Ok(response) => {
                // a failed write only costs the offline fallback; the live
                // response is still served
                if response.is_cacheable()
                    && let Err(e) = self
                        .store
                        .put(&self.assets.version, &request.url, &response)
                        .await
                {
                    log::warn!("failed to cache navigation {}: {e}", request.url);
                }
                Ok(response)
            }
            Err(e) => {
                log::debug!("network-first falling back to cache for {}", request.url);
                match self.store.lookup(&self.assets.version, &request.url).await? {
                    Some(cached) => Ok(cached),
                    None => Err(e),
                }
            }
        }
    }

    /// Sub-resource versions are pinned by the asset list, so a cached copy
    /// is authoritative. A miss goes to the network and is returned without
    /// being written back.
    async fn cache_first(&self, request: &Request) -> Result<Response> {
        if let Some(cached) = self.store.lookup(&self.assets.version, &request.url).await? {
            return Ok(cached);
        }
        self.net.fetch(request).await
    }
}
