//! Shared relay state: live sessions and room membership.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::RelayConfig;

pub type SessionId = u64;

struct SessionEntry {
    tx: mpsc::Sender<String>,
    user_id: Option<String>,
}

pub struct RelayState {
    pub config: RelayConfig,
    pub started_at: Instant,
    next_session: AtomicU64,
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    /// chat id -> member sessions
    rooms: Mutex<HashMap<String, HashSet<SessionId>>>,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            started_at: Instant::now(),
            next_session: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, tx: mpsc::Sender<String>) -> SessionId {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .lock()
            .insert(id, SessionEntry { tx, user_id: None });
        id
    }

    /// Drop a session and its room memberships. Returns the user it was
    /// authenticated as, if any.
    pub fn unregister(&self, id: SessionId) -> Option<String> {
        let entry = self.sessions.lock().remove(&id);
        let mut rooms = self.rooms.lock();
        rooms.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
        entry.and_then(|e| e.user_id)
    }

    pub fn set_user(&self, id: SessionId, user_id: &str) {
        if let Some(entry) = self.sessions.lock().get_mut(&id) {
            entry.user_id = Some(user_id.to_string());
        }
    }

    pub fn join(&self, id: SessionId, chat_id: &str) -> bool {
        self.rooms
            .lock()
            .entry(chat_id.to_string())
            .or_default()
            .insert(id)
    }

    pub fn leave(&self, id: SessionId, chat_id: &str) -> bool {
        let mut rooms = self.rooms.lock();
        let Some(members) = rooms.get_mut(chat_id) else {
            return false;
        };
        let removed = members.remove(&id);
        if members.is_empty() {
            rooms.remove(chat_id);
        }
        removed
    }

    pub fn is_member(&self, id: SessionId, chat_id: &str) -> bool {
        self.rooms
            .lock()
            .get(chat_id)
            .is_some_and(|members| members.contains(&id))
    }

    /// Queue a frame for one session.
    pub fn send_to(&self, id: SessionId, frame: &str) {
        if let Some(entry) = self.sessions.lock().get(&id) {
            deliver(id, &entry.tx, frame);
        }
    }

    /// Queue a frame for every member of `chat_id`, optionally skipping one.
    pub fn broadcast_room(&self, chat_id: &str, frame: &str, except: Option<SessionId>) -> usize {
        let members: Vec<SessionId> = match self.rooms.lock().get(chat_id) {
            Some(members) => members.iter().copied().filter(|m| Some(*m) != except).collect(),
            None => return 0,
        };
        let sessions = self.sessions.lock();
        let mut sent = 0;
        for member in members {
            if let Some(entry) = sessions.get(&member) {
                deliver(member, &entry.tx, frame);
                sent += 1;
            }
        }
        sent
    }

    /// Queue a frame for every session except `except`.
    pub fn broadcast_all(&self, frame: &str, except: Option<SessionId>) {
        let sessions = self.sessions.lock();
        for (id, entry) in sessions.iter() {
            if Some(*id) != except {
                deliver(*id, &entry.tx, frame);
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }
}

fn deliver(id: SessionId, tx: &mpsc::Sender<String>, frame: &str) {
    if let Err(e) = tx.try_send(frame.to_string()) {
        tracing::warn!(session = id, error = %e, "Dropping frame for slow or closed session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RelayState {
        RelayState::new(RelayConfig::default())
    }

    #[test]
    fn room_broadcast_skips_sender() {
        let state = state();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let a = state.register(tx_a);
        let b = state.register(tx_b);
        state.join(a, "trade-1");
        state.join(b, "trade-1");

        assert_eq!(state.broadcast_room("trade-1", "hi", Some(a)), 1);
        assert_eq!(rx_b.try_recv().unwrap(), "hi");
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn unregister_clears_rooms_and_returns_user() {
        let state = state();
        let (tx, _rx) = mpsc::channel(8);
        let id = state.register(tx);
        state.set_user(id, "seller");
        state.join(id, "trade-1");
        assert_eq!(state.room_count(), 1);

        assert_eq!(state.unregister(id).as_deref(), Some("seller"));
        assert_eq!(state.room_count(), 0);
        assert_eq!(state.connection_count(), 0);
    }

    #[test]
    fn leave_removes_empty_room() {
        let state = state();
        let (tx, _rx) = mpsc::channel(8);
        let id = state.register(tx);
        assert!(state.join(id, "lobby"));
        assert!(!state.join(id, "lobby"));
        assert!(state.is_member(id, "lobby"));
        assert!(state.leave(id, "lobby"));
        assert!(!state.leave(id, "lobby"));
        assert_eq!(state.room_count(), 0);
    }

    #[test]
    fn full_session_buffer_drops_instead_of_blocking() {
        let state = state();
        let (tx, mut rx) = mpsc::channel(1);
        let id = state.register(tx);
        state.send_to(id, "one");
        state.send_to(id, "two");
        assert_eq!(rx.try_recv().unwrap(), "one");
        assert!(rx.try_recv().is_err());
    }
}
