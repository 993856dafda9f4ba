//! Process-wide install prompt holder.
//!
//! The platform hands the page one install-prompt token per eligibility
//! event; the token is usable once. The holder keeps that token in a single
//! shared slot so every UI surface (install button, menu item) observes the
//! same availability instead of each wiring its own event listener.

use std::sync::Mutex;

type AvailabilityListener = Box<dyn Fn(bool) + Send + Sync>;

/// Holds at most one pending install prompt.
///
/// The slot is set exactly once per eligibility event via
/// [`offer`](Self::offer) and cleared exactly once per user decision via
/// [`take`](Self::take).
pub struct InstallPromptHolder<T> {
    slot: Mutex<Option<T>>,
    listeners: Mutex<Vec<AvailabilityListener>>,
}

impl<T> Default for InstallPromptHolder<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Send> InstallPromptHolder<T> {
    /// Creates an empty holder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a prompt is currently held.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.slot.lock().expect("prompt lock poisoned").is_some()
    }

    /// Stores the prompt from an eligibility event. Returns false (and
    /// drops the new token) if a prompt is already held.
    pub fn offer(&self, prompt: T) -> bool {
        {
            let mut slot = self.slot.lock().expect("prompt lock poisoned");
            if slot.is_some() {
                return false;
            }
            *slot = Some(prompt);
        }
        self.notify(true);
        true
    }

    /// Takes the held prompt for presentation to the user. The slot is
    /// cleared; the platform will issue a fresh token if the user remains
    /// eligible later.
    pub fn take(&self) -> Option<T> {
        let taken = self.slot.lock().expect("prompt lock poisoned").take();
        if taken.is_some() {
            self.notify(false);
        }
        taken
    }

    /// Subscribes to availability changes. The listener is invoked
    /// immediately with the current state, so UI created after the
    /// eligibility event still shows the right thing.
    pub fn on_availability<F>(&self, listener: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        listener(self.is_available());
        self.listeners
            .lock()
            .expect("prompt lock poisoned")
            .push(Box::new(listener));
    }

    fn notify(&self, available: bool) {
        let listeners = self.listeners.lock().expect("prompt lock poisoned");
        for listener in listeners.iter() {
            listener(available);
        }
    }
}
