//! Registrations: one per scope, holding the installing/waiting/active
//! generation slots and driving lifecycle transitions between them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::assets::AssetList;
use crate::clients::{ClientId, ClientRegistry};
use crate::error::Result;
use crate::fetch::{Network, Request, Response};
use crate::store::CacheStore;
use crate::worker::CacheWorker;

type WorkerSlot<N, S> = RwLock<Option<Arc<CacheWorker<N, S>>>>;

/// A service-worker registration for one scope.
///
/// At most one generation occupies each slot; promotion moves a worker
/// installing → waiting → active as its lifecycle advances.
pub struct Registration<N, S> {
    scope: String,
    installing: WorkerSlot<N, S>,
    waiting: WorkerSlot<N, S>,
    active: WorkerSlot<N, S>,
}

impl<N, S> Registration<N, S> {
    fn new(scope: String) -> Self {
        Self {
            scope,
            installing: RwLock::new(None),
            waiting: RwLock::new(None),
            active: RwLock::new(None),
        }
    }

    /// Scope path this registration covers.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The generation currently installing, if any.
    #[must_use]
    pub fn installing(&self) -> Option<Arc<CacheWorker<N, S>>> {
        self.installing.read().expect("slot lock poisoned").clone()
    }

    /// The installed generation waiting to activate, if any.
    #[must_use]
    pub fn waiting(&self) -> Option<Arc<CacheWorker<N, S>>> {
        self.waiting.read().expect("slot lock poisoned").clone()
    }

    /// The generation in control, if any.
    #[must_use]
    pub fn active(&self) -> Option<Arc<CacheWorker<N, S>>> {
        self.active.read().expect("slot lock poisoned").clone()
    }

    fn version_known(&self, version: &str) -> bool {
        [&self.installing, &self.waiting, &self.active]
            .into_iter()
            .any(|slot| {
                slot.read()
                    .expect("slot lock poisoned")
                    .as_ref()
                    .is_some_and(|w| w.version() == version)
            })
    }
}

impl<N, S> std::fmt::Debug for Registration<N, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("scope", &self.scope)
            .field("installing", &self.installing())
            .field("waiting", &self.waiting())
            .field("active", &self.active())
            .finish()
    }
}

/// Process-wide registry of scopes, clients and shared storage.
///
/// The registry is what page code talks to: it registers manifests,
/// re-checks them for updates, relays skip-waiting messages and routes
/// intercepted fetches to whichever generation controls the client.
pub struct Registry<N, S> {
    net: Arc<N>,
    store: Arc<S>,
    clients: Arc<ClientRegistry>,
    registrations: RwLock<HashMap<String, Arc<Registration<N, S>>>>,
    enabled: bool,
}

impl<N: Network, S: CacheStore> Registry<N, S> {
    /// Creates a registry over shared network and store handles.
    #[must_use]
    pub fn new(net: Arc<N>, store: Arc<S>) -> Self {
        Self {
            net,
            store,
            clients: Arc::new(ClientRegistry::new()),
            registrations: RwLock::new(HashMap::new()),
            enabled: true,
        }
    }

    /// Creates a registry for an environment without service-worker
    /// support: clients connect and fetch through it, but every
    /// registration attempt fails.
    #[must_use]
    pub fn disabled(net: Arc<N>, store: Arc<S>) -> Self {
        Self {
            enabled: false,
            ..Self::new(net, store)
        }
    }

    /// Whether registrations are accepted in this environment.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The client registry pages connect through.
    #[must_use]
    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// Returns the registration for `scope`, if one exists.
    #[must_use]
    pub fn registration(&self, scope: &str) -> Option<Arc<Registration<N, S>>> {
        self.registrations
            .read()
            .expect("registry lock poisoned")
            .get(scope)
            .cloned()
    }

    /// Registers a manifest under its scope and runs an update check.
    ///
    /// Registering the same scope and version again is a no-op beyond the
    /// check itself: no second install, no duplicate buckets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`](crate::Error::Unsupported) when the
    /// environment has no service-worker support, or an install error if a
    /// new generation was needed and failed. The previously active
    /// generation, if any, stays in control.
    pub async fn register(&self, assets: AssetList) -> Result<Arc<Registration<N, S>>> {
        if !self.enabled {
            return Err(crate::error::Error::Unsupported(
                "service workers are not available in this environment".to_string(),
            ));
        }
        let scope = assets.scope().to_string();
        let registration = {
            let mut registrations = self.registrations.write().expect("registry lock poisoned");
            Arc::clone(
                registrations
                    .entry(scope.clone())
                    .or_insert_with(|| Arc::new(Registration::new(scope))),
            )
        };
        self.check_for_update(&registration, assets).await?;
        Ok(registration)
    }

    /// Installs a new generation if `assets` names a version this
    /// registration does not already have. Returns true if a new
    /// generation was installed.
    ///
    /// # Errors
    ///
    /// Returns an error if the install fails; the candidate is discarded.
    pub async fn check_for_update(
        &self,
        registration: &Arc<Registration<N, S>>,
        assets: AssetList,
    ) -> Result<bool> {
        if registration.version_known(&assets.version) {
            log::debug!("{} already present, skipping install", assets.version);
            return Ok(false);
        }

        let skip_waiting = assets.skip_waiting;
        let worker = Arc::new(CacheWorker::new(
            assets,
            Arc::clone(&self.net),
            Arc::clone(&self.store),
        ));

        *registration.installing.write().expect("slot lock poisoned") = Some(Arc::clone(&worker));
        if let Err(e) = worker.install().await {
            *registration.installing.write().expect("slot lock poisoned") = None;
            return Err(e);
        }

        // promote installing → waiting
        *registration.installing.write().expect("slot lock poisoned") = None;
        *registration.waiting.write().expect("slot lock poisoned") = Some(worker);

        if skip_waiting {
            self.activate_waiting(registration).await?;
        }
        Ok(true)
    }

    /// Page message requesting immediate activation of a waiting
    /// generation. Returns true if a generation was activated.
    ///
    /// # Errors
    ///
    /// Returns an error if activation fails.
    pub async fn skip_waiting(&self, scope: &str) -> Result<bool> {
        match self.registration(scope) {
            Some(registration) => self.activate_waiting(&registration).await,
            None => Ok(false),
        }
    }

    async fn activate_waiting(&self, registration: &Arc<Registration<N, S>>) -> Result<bool> {
        let Some(worker) = registration.waiting.write().expect("slot lock poisoned").take()
        else {
            return Ok(false);
        };

        worker.activate(&self.clients).await?;

        let previous = registration
            .active
            .write()
            .expect("slot lock poisoned")
            .replace(worker);
        if let Some(old) = previous {
            old.mark_redundant();
            log::debug!("generation {} superseded", old.version());
        }
        Ok(true)
    }

    /// Routes an intercepted fetch for `client`.
    ///
    /// Controlled clients get the controlling generation's fetch policy;
    /// uncontrolled clients pass straight through to the network.
    ///
    /// # Errors
    ///
    /// Propagates the controlling worker's fetch error, or the network
    /// error on the pass-through path.
    pub async fn handle_fetch(&self, client: &ClientId, request: &Request) -> Result<Response> {
        if let Some(version) = self.clients.controller(client) {
            let controlling = self
                .registrations
                .read()
                .expect("registry lock poisoned")
                .values()
                .find_map(|reg| reg.active().filter(|w| w.version() == version));
            if let Some(worker) = controlling {
                return worker.handle_fetch(request).await;
            }
        }
        self.net.fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::Error;
    use crate::store::MemoryStore;
    use crate::worker::WorkerState;

    #[derive(Default)]
    struct MockNetwork {
        responses: Mutex<HashMap<String, Response>>,
        failing: Mutex<HashSet<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockNetwork {
        fn respond(&self, url: &str, body: &str) {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), Response::basic(url, 200, body.as_bytes().to_vec()));
        }

        fn fail(&self, url: &str) {
            self.failing.lock().unwrap().insert(url.to_string());
        }

        fn calls_for(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    #[async_trait]
    impl Network for MockNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            self.calls.lock().unwrap().push(request.url.clone());
            if self.failing.lock().unwrap().contains(&request.url) {
                return Err(Error::Network {
                    url: request.url.clone(),
                    reason: "connection refused".to_string(),
                });
            }
            let responses = self.responses.lock().unwrap();
            Ok(responses
                .get(&request.url)
                .cloned()
                .unwrap_or_else(|| Response::basic(&request.url, 404, Vec::new())))
        }
    }

    fn manifest(version: &str, paths: &[&str]) -> AssetList {
        AssetList::new(
            version,
            "https://example.com",
            "/shop/",
            paths.iter().map(|p| (*p).to_string()).collect(),
        )
    }

    fn registry() -> (Registry<MockNetwork, MemoryStore>, Arc<MockNetwork>, Arc<MemoryStore>) {
        let net = Arc::new(MockNetwork::default());
        let store = Arc::new(MemoryStore::new());
        (
            Registry::new(Arc::clone(&net), Arc::clone(&store)),
            net,
            store,
        )
    }

    #[tokio::test]
    async fn register_installs_and_activates_the_first_generation() {
        let (registry, net, store) = registry();
        net.respond("https://example.com/shop/index.html", "<html>");
        let page = registry.clients().connect();

        let reg = registry.register(manifest("v1", &["index.html"])).await.unwrap();

        let active = reg.active().unwrap();
        assert_eq!(active.version(), "v1");
        assert_eq!(active.state(), WorkerState::Active);
        assert!(reg.waiting().is_none());
        assert_eq!(store.bucket_names().await.unwrap(), vec!["v1".to_string()]);
        assert_eq!(registry.clients().controller(&page).as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn re_registering_the_same_version_downloads_nothing() {
        let (registry, net, store) = registry();
        let url = "https://example.com/shop/index.html";
        net.respond(url, "<html>");

        let first = registry.register(manifest("v1", &["index.html"])).await.unwrap();
        let downloads = net.calls_for(url);

        // second tab registering the same deployment
        let second = registry.register(manifest("v1", &["index.html"])).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(net.calls_for(url), downloads);
        assert_eq!(store.bucket_names().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_version_supersedes_the_active_generation() {
        let (registry, net, store) = registry();
        net.respond("https://example.com/shop/index.html", "<html>");
        let page = registry.clients().connect();

        let reg = registry.register(manifest("v1", &["index.html"])).await.unwrap();
        let old = reg.active().unwrap();

        registry.register(manifest("v2", &["index.html"])).await.unwrap();

        assert_eq!(reg.active().unwrap().version(), "v2");
        assert_eq!(old.state(), WorkerState::Redundant);
        assert_eq!(store.bucket_names().await.unwrap(), vec!["v2".to_string()]);
        assert_eq!(registry.clients().controller(&page).as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn failed_update_leaves_the_old_generation_in_control() {
        let (registry, net, store) = registry();
        net.respond("https://example.com/shop/index.html", "<html>");
        let reg = registry.register(manifest("v1", &["index.html"])).await.unwrap();

        net.fail("https://example.com/shop/broken.css");
        let err = registry
            .register(manifest("v2", &["index.html", "broken.css"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Install { .. }));

        assert_eq!(reg.active().unwrap().version(), "v1");
        assert!(reg.installing().is_none());
        assert_eq!(store.bucket_names().await.unwrap(), vec!["v1".to_string()]);
    }

    #[tokio::test]
    async fn without_skip_waiting_the_generation_waits_for_the_message() {
        let (registry, net, _store) = registry();
        net.respond("https://example.com/shop/index.html", "<html>");
        let page = registry.clients().connect();

        let reg = registry
            .register(manifest("v1", &["index.html"]).with_skip_waiting(false))
            .await
            .unwrap();

        assert!(reg.active().is_none());
        assert_eq!(reg.waiting().unwrap().version(), "v1");
        assert!(registry.clients().controller(&page).is_none());

        assert!(registry.skip_waiting("/shop/").await.unwrap());
        assert_eq!(reg.active().unwrap().version(), "v1");
        assert_eq!(registry.clients().controller(&page).as_deref(), Some("v1"));

        // nothing left waiting
        assert!(!registry.skip_waiting("/shop/").await.unwrap());
    }

    #[tokio::test]
    async fn registration_debug_reports_scope_and_slots() {
        let (registry, net, _store) = registry();
        net.respond("https://example.com/shop/index.html", "<html>");

        let reg = registry.register(manifest("v1", &["index.html"])).await.unwrap();
        let rendered = format!("{reg:?}");
        assert!(rendered.contains("/shop/"));
        assert!(rendered.contains("v1"));
    }

    #[tokio::test]
    async fn disabled_registry_rejects_registration() {
        let net = Arc::new(MockNetwork::default());
        net.respond("https://example.com/shop/index.html", "<html>");
        let registry = Registry::disabled(Arc::clone(&net), Arc::new(MemoryStore::new()));
        assert!(!registry.is_enabled());

        let err = registry.register(manifest("v1", &["index.html"])).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        // nothing was fetched
        assert_eq!(net.calls_for("https://example.com/shop/index.html"), 0);
    }

    #[tokio::test]
    async fn skip_waiting_on_unknown_scope_is_a_no_op() {
        let (registry, _net, _store) = registry();
        assert!(!registry.skip_waiting("/nowhere/").await.unwrap());
    }

    #[tokio::test]
    async fn controlled_clients_are_served_by_the_active_generation() {
        let (registry, net, _store) = registry();
        let css = "https://example.com/shop/css/style.css";
        net.respond("https://example.com/shop/index.html", "<html>");
        net.respond(css, "body{}");
        let page = registry.clients().connect();

        registry
            .register(manifest("v1", &["index.html", "css/style.css"]))
            .await
            .unwrap();
        let fetched = net.calls_for(css);

        let resp = registry
            .handle_fetch(&page, &Request::sub_resource(css))
            .await
            .unwrap();
        assert_eq!(resp.body.as_ref(), b"body{}");
        // served from cache, not the network
        assert_eq!(net.calls_for(css), fetched);
    }

    #[tokio::test]
    async fn uncontrolled_clients_pass_through_to_the_network() {
        let (registry, net, _store) = registry();
        let url = "https://example.com/shop/data.json";
        net.respond(url, "{}");
        let page = registry.clients().connect();

        let resp = registry
            .handle_fetch(&page, &Request::sub_resource(url))
            .await
            .unwrap();
        assert_eq!(resp.body.as_ref(), b"{}");
        assert_eq!(net.calls_for(url), 1);
    }
}
