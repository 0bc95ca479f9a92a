//! Observer collections notified by the connection task.
//!
//! Each kind of notification has its own [`Observers`] set. Observers run
//! synchronously on the connection task, in registration order, as soon as
//! the event is processed, so they should hand heavy work off elsewhere.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::event::{AuthEvent, ConnectionEvent, ErrorEvent, PongEvent, StatusChange};
use crate::types::{ChatMessage, PresenceUpdate, Receipt, TypingIndicator};

pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`Observers::add`], used to remove the observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub struct Observers<T> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ObserverId, Observer<T>)>>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Observers<T> {
    pub fn add<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, Arc::new(observer)));
        id
    }

    /// Returns `false` if `id` was not registered (or already removed).
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke every observer with `value`.
    ///
    /// The list is copied before the calls, so an observer may add or remove
    /// observers (itself included) without deadlocking.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Observer<T>> = self
            .entries
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in snapshot {
            observer(value);
        }
    }
}

/// All observer sets of one client.
#[derive(Default)]
pub struct Handlers {
    pub connection: Observers<ConnectionEvent>,
    pub message: Observers<ChatMessage>,
    pub typing: Observers<TypingIndicator>,
    pub presence: Observers<PresenceUpdate>,
    pub read_receipt: Observers<Receipt>,
    pub delivery_receipt: Observers<Receipt>,
    pub status: Observers<StatusChange>,
    pub pong: Observers<PongEvent>,
    pub auth: Observers<AuthEvent>,
    pub error: Observers<ErrorEvent>,
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("connection", &self.connection.len())
            .field("message", &self.message.len())
            .field("typing", &self.typing.len())
            .field("presence", &self.presence.len())
            .field("read_receipt", &self.read_receipt.len())
            .field("delivery_receipt", &self.delivery_receipt.len())
            .field("status", &self.status.len())
            .field("pong", &self.pong.len())
            .field("auth", &self.auth.len())
            .field("error", &self.error.len())
            .finish()
    }
}
