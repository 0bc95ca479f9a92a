//! Bounded ledger that orders read/delivery receipts per message.
//!
//! Receipts can arrive out of order (a `delivered` after a `read`). The
//! ledger remembers the furthest status seen for recent messages and only
//! reports forward moves.

use std::collections::{HashMap, VecDeque};

use crate::event::StatusChange;
use crate::types::{ChatMessage, MessageStatus};

#[derive(Debug)]
struct Tracked {
    chat_id: String,
    status: MessageStatus,
}

#[derive(Debug)]
pub struct ReceiptLedger {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, Tracked>,
}

impl ReceiptLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    /// Start tracking a message, or fold its status into an existing entry.
    pub fn track(&mut self, message: &ChatMessage) {
        if let Some(entry) = self.entries.get_mut(&message.id) {
            if let Some(next) = entry.status.advance(message.status) {
                entry.status = next;
            }
            return;
        }
        self.insert(message.id.clone(), message.chat_id.clone(), message.status);
    }

    /// Apply a receipt. Returns the change when it moves the message forward.
    /// Receipts for untracked messages start tracking them.
    pub fn apply(
        &mut self,
        chat_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> Option<StatusChange> {
        match self.entries.get_mut(message_id) {
            Some(entry) => {
                let next = entry.status.advance(status)?;
                entry.status = next;
                Some(StatusChange {
                    chat_id: entry.chat_id.clone(),
                    message_id: message_id.to_string(),
                    status: next,
                })
            }
            None => {
                self.insert(message_id.to_string(), chat_id.to_string(), status);
                Some(StatusChange {
                    chat_id: chat_id.to_string(),
                    message_id: message_id.to_string(),
                    status,
                })
            }
        }
    }

    pub fn status_of(&self, message_id: &str) -> Option<MessageStatus> {
        self.entries.get(message_id).map(|e| e.status)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, message_id: String, chat_id: String, status: MessageStatus) {
        self.order.push_back(message_id.clone());
        self.entries.insert(message_id, Tracked { chat_id, status });
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}
