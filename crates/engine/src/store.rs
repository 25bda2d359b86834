//! Publish/subscribe snapshot store.
//!
//! Holds the current [`CartSnapshot`] and fans out replacements to
//! subscribers. Framework-free: consumers either pull the current snapshot
//! or hold a [`tokio::sync::watch`] receiver; dropping the receiver is the
//! unsubscribe. The store itself does not serialize writers - the engine's
//! write lock does.

use fresh_basket_core::CartSnapshot;
use tokio::sync::watch;

/// Single source of truth for the current cart snapshot.
#[derive(Debug)]
pub struct CartStore {
    tx: watch::Sender<CartSnapshot>,
}

impl CartStore {
    /// Create a store holding an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CartSnapshot::empty());
        Self { tx }
    }

    /// The current snapshot, by value. Callers never get a mutable
    /// reference into the store.
    #[must_use]
    pub fn current(&self) -> CartSnapshot {
        self.tx.borrow().clone()
    }

    /// Replace the snapshot wholesale and notify subscribers.
    pub fn publish(&self, snapshot: CartSnapshot) {
        // send_replace delivers even when no subscriber is attached
        self.tx.send_replace(snapshot);
    }

    /// Subscribe to snapshot replacements.
    ///
    /// The receiver immediately sees the current snapshot; dropping it
    /// unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}
