//! swcache - an offline cache engine for installable web-app shells.
//!
//! The crate has two cooperating halves: a [`CacheWorker`] that owns one
//! versioned bucket of pre-listed assets and answers intercepted fetches
//! (network-first for documents, cache-first for sub-resources), and an
//! [`UpdateCoordinator`] that registers the worker for a page and forces a
//! single reload when a newer generation takes control.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use swcache::{AssetList, DiskStore, Registry, ReqwestNetwork, UpdateCoordinator};
//!
//! # struct BrowserPage;
//! # impl swcache::Page for BrowserPage {
//! #     fn location(&self) -> String { String::new() }
//! #     fn reload(&self) {}
//! # }
//! # async fn example(page: Arc<BrowserPage>) -> swcache::Result<()> {
//! let assets = AssetList::load(std::path::Path::new("assets.toml"))?;
//! let net = Arc::new(ReqwestNetwork::new(reqwest::Client::new(), &assets.origin));
//! let store = Arc::new(DiskStore::new("cache"));
//! let registry = Registry::new(net, store);
//!
//! // On page load: register, check for updates, reload once on hand-off.
//! let coordinator = UpdateCoordinator::new(page);
//! coordinator.start(&registry, assets).await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod assets;
pub mod clients;
pub mod coordinator;
pub mod disk;
pub mod error;
pub mod fetch;
pub mod prompt;
pub mod registry;
pub mod store;
pub mod worker;

// Re-export main types for convenience
pub use assets::AssetList;
pub use clients::{ClientId, ClientRegistry, ControllerChange};
pub use coordinator::{Page, UpdateCoordinator, scope_for};
pub use disk::DiskStore;
pub use error::{Error, Result};
pub use fetch::{Network, ReqwestNetwork, Request, RequestMode, Response, ResponseKind};
pub use prompt::InstallPromptHolder;
pub use registry::{Registration, Registry};
pub use store::{CacheStore, MemoryStore};
pub use worker::{CacheWorker, WorkerState};
