//! Open page clients and the controller relationship.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use uuid::Uuid;

/// Identifier for an open page client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A controller hand-off observed by one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerChange {
    /// The client whose controller changed.
    pub client: ClientId,
    /// Version of the generation that controlled the client before, if any.
    pub previous: Option<String>,
    /// Version of the generation now in control.
    pub current: String,
}

type ChangeListener = Box<dyn Fn(&ControllerChange) + Send + Sync>;

/// Tracks open clients and which cache generation controls each of them.
///
/// Control transfers only through [`claim`](ClientRegistry::claim), which
/// is an instantaneous hand-off of every open client to the claiming
/// generation.
#[derive(Default)]
pub struct ClientRegistry {
    controllers: RwLock<HashMap<ClientId, Option<String>>>,
    listeners: Mutex<Vec<ChangeListener>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly opened page and returns its id. The page starts
    /// uncontrolled.
    pub fn connect(&self) -> ClientId {
        let id = ClientId::new();
        self.controllers
            .write()
            .expect("client lock poisoned")
            .insert(id.clone(), None);
        id
    }

    /// Removes a closed page.
    pub fn disconnect(&self, client: &ClientId) {
        self.controllers
            .write()
            .expect("client lock poisoned")
            .remove(client);
    }

    /// Returns the version of the generation controlling `client`, if any.
    #[must_use]
    pub fn controller(&self, client: &ClientId) -> Option<String> {
        self.controllers
            .read()
            .expect("client lock poisoned")
            .get(client)
            .cloned()
            .flatten()
    }

    /// Number of currently open clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.controllers.read().expect("client lock poisoned").len()
    }

    /// Returns true if no clients are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes to controller hand-offs. Listeners fire once per client
    /// whose controller actually changed.
    pub fn on_controller_change<F>(&self, listener: F)
    where
        F: Fn(&ControllerChange) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push(Box::new(listener));
    }

    /// Hands every open client over to the generation named `version`.
    ///
    /// Clients already controlled by `version` are untouched and produce no
    /// notification.
    pub fn claim(&self, version: &str) {
        let mut changes = Vec::new();
        {
            let mut controllers = self.controllers.write().expect("client lock poisoned");
            for (client, controller) in controllers.iter_mut() {
                if controller.as_deref() == Some(version) {
                    continue;
                }
                changes.push(ControllerChange {
                    client: client.clone(),
                    previous: controller.take(),
                    current: version.to_string(),
                });
                *controller = Some(version.to_string());
            }
        }
        // notify outside the write lock
        let listeners = self.listeners.lock().expect("listener lock poisoned");
        for change in &changes {
            for listener in listeners.iter() {
                listener(change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn connect_starts_uncontrolled() {
        let registry = ClientRegistry::new();
        let client = registry.connect();
        assert!(registry.controller(&client).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn claim_takes_over_all_clients() {
        let registry = ClientRegistry::new();
        let a = registry.connect();
        let b = registry.connect();

        registry.claim("v1");
        assert_eq!(registry.controller(&a).as_deref(), Some("v1"));
        assert_eq!(registry.controller(&b).as_deref(), Some("v1"));
    }

    #[test]
    fn claim_notifies_with_previous_controller() {
        let registry = ClientRegistry::new();
        let client = registry.connect();
        let seen: Arc<Mutex<Vec<ControllerChange>>> = Arc::default();

        let seen_clone = Arc::clone(&seen);
        registry.on_controller_change(move |change| {
            seen_clone.lock().unwrap().push(change.clone());
        });

        registry.claim("v1");
        registry.claim("v2");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].client, client);
        assert_eq!(seen[0].previous, None);
        assert_eq!(seen[0].current, "v1");
        assert_eq!(seen[1].previous.as_deref(), Some("v1"));
        assert_eq!(seen[1].current, "v2");
    }

    #[test]
    fn reclaiming_same_version_is_silent() {
        let registry = ClientRegistry::new();
        registry.connect();
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = Arc::clone(&count);
        registry.on_controller_change(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.claim("v1");
        registry.claim("v1");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disconnect_forgets_client() {
        let registry = ClientRegistry::new();
        let client = registry.connect();
        registry.disconnect(&client);
        assert!(registry.is_empty());
        assert!(registry.controller(&client).is_none());
    }
}
