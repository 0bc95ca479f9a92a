//! FIFO of messages written while the connection was down.

use std::collections::VecDeque;

use crate::types::OutboundMessage;

#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<OutboundMessage>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: OutboundMessage) {
        self.pending.push_back(message);
    }

    /// Take everything queued, oldest first, for one flush pass.
    pub fn take_all(&mut self) -> Vec<OutboundMessage> {
        self.pending.drain(..).collect()
    }

    /// Put messages a flush pass could not send back in front, keeping
    /// their order ahead of anything queued since.
    pub fn restore_front(&mut self, unsent: Vec<OutboundMessage>) {
        for message in unsent.into_iter().rev() {
            self.pending.push_front(message);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.pending.iter()
    }
}
