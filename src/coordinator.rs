//! Page-side update coordination.
//!
//! Registers the cache worker for the page's deployment scope, requests an
//! update check, and forces one reload when a new generation takes control
//! of an already-controlled page. The whole layer is an enhancement: if
//! registration fails the page keeps working without it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::assets::AssetList;
use crate::clients::ClientId;
use crate::fetch::Network;
use crate::registry::{Registration, Registry};
use crate::store::CacheStore;

/// The page the coordinator runs in.
pub trait Page: Send + Sync {
    /// Full URL of the current document.
    fn location(&self) -> String;

    /// Forces a full reload of the document.
    fn reload(&self);
}

/// Computes the registration scope for a page.
///
/// Sites are deployed either at the domain root or under a repository
/// sub-path; the scope is the manifest prefix when the page actually lives
/// under it, and the root otherwise.
#[must_use]
pub fn scope_for(location: &str, manifest_prefix: &str) -> String {
    let path = location
        .split_once("://")
        .and_then(|(_, rest)| rest.find('/').map(|i| &rest[i..]))
        .unwrap_or("/");
    if path.starts_with(manifest_prefix) {
        manifest_prefix.to_string()
    } else {
        "/".to_string()
    }
}

/// Registers the cache worker and turns controller hand-offs into a single
/// forced page reload.
pub struct UpdateCoordinator<P> {
    page: Arc<P>,
    reloaded: Arc<AtomicBool>,
    client: std::sync::Mutex<Option<ClientId>>,
}

impl<P: Page + 'static> UpdateCoordinator<P> {
    /// Creates a coordinator for `page`.
    #[must_use]
    pub fn new(page: Arc<P>) -> Self {
        Self {
            page,
            reloaded: Arc::new(AtomicBool::new(false)),
            client: std::sync::Mutex::new(None),
        }
    }

    /// Whether this page lifetime has already been reloaded by a hand-off.
    #[must_use]
    pub fn has_reloaded(&self) -> bool {
        self.reloaded.load(Ordering::SeqCst)
    }

    /// The client id this coordinator connected with, once started.
    #[must_use]
    pub fn client(&self) -> Option<ClientId> {
        self.client.lock().expect("client lock poisoned").clone()
    }

    /// Connects the page as a client, registers the manifest under the
    /// computed scope and requests an update check.
    ///
    /// A hand-off from one generation to another observed by this client
    /// reloads the page exactly once; a page becoming controlled for the
    /// first time does not count. On registration failure the error is
    /// logged and `None` is returned; the rest of the page is unaffected.
    pub async fn start<N, S>(
        &self,
        registry: &Registry<N, S>,
        mut assets: AssetList,
    ) -> Option<Arc<Registration<N, S>>>
    where
        N: Network,
        S: CacheStore,
    {
        let client = registry.clients().connect();
        *self.client.lock().expect("client lock poisoned") = Some(client.clone());

        // subscribe before registering so the very first hand-off is seen
        let page = Arc::clone(&self.page);
        let reloaded = Arc::clone(&self.reloaded);
        registry.clients().on_controller_change(move |change| {
            if change.client != client || change.previous.is_none() {
                return;
            }
            if !reloaded.swap(true, Ordering::SeqCst) {
                page.reload();
            }
        });

        assets.prefix = scope_for(&self.page.location(), &assets.prefix);
        let registration = match registry.register(assets.clone()).await {
            Ok(registration) => registration,
            Err(e) => {
                log::warn!("cache worker registration failed: {e}");
                return None;
            }
        };

        // proactive update check after registration
        if let Err(e) = registry.check_for_update(&registration, assets).await {
            log::warn!("update check failed: {e}");
        }

        Some(registration)
    }
}
