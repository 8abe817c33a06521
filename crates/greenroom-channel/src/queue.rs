//! The outbound delivery queue.

use std::collections::VecDeque;

use greenroom_protocol::ControlMessage;

/// FIFO of control messages awaiting delivery across the loopback link.
///
/// The queue is unbounded: it keeps absorbing messages while the peer is
/// down, which is what lets the edge process accept clients through a
/// logic-process outage. A send that fails mid-drain goes back to the
/// *front* so delivery order is preserved across reconnects.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: VecDeque<ControlMessage>,
}

impl OutboundQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message at the back.
    pub fn push_back(&mut self, msg: ControlMessage) {
        self.entries.push_back(msg);
    }

    /// Reinserts a message at the front after a failed send.
    pub fn push_front(&mut self, msg: ControlMessage) {
        self.entries.push_front(msg);
    }

    /// Takes the next message to deliver.
    pub fn pop_front(&mut self) -> Option<ControlMessage> {
        self.entries.pop_front()
    }

    /// Number of pending messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(client: &str) -> ControlMessage {
        ControlMessage::ClientConnect {
            client: client.to_string(),
        }
    }

    #[test]
    fn test_pop_front_returns_fifo_order() {
        let mut queue = OutboundQueue::new();
        queue.push_back(connect("a"));
        queue.push_back(connect("b"));
        queue.push_back(connect("c"));

        assert_eq!(queue.pop_front(), Some(connect("a")));
        assert_eq!(queue.pop_front(), Some(connect("b")));
        assert_eq!(queue.pop_front(), Some(connect("c")));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn test_push_front_reinserts_ahead_of_pending() {
        // Failed-send handling: the popped entry must come back out
        // before anything enqueued behind it.
        let mut queue = OutboundQueue::new();
        queue.push_back(connect("m1"));
        queue.push_back(connect("m2"));
        queue.push_back(connect("m3"));

        let failed = queue.pop_front().unwrap();
        queue.push_front(failed);

        assert_eq!(queue.pop_front(), Some(connect("m1")));
        assert_eq!(queue.pop_front(), Some(connect("m2")));
        assert_eq!(queue.pop_front(), Some(connect("m3")));
    }

    #[test]
    fn test_len_tracks_pending_entries() {
        let mut queue = OutboundQueue::new();
        assert!(queue.is_empty());

        queue.push_back(connect("a"));
        queue.push_back(connect("b"));
        assert_eq!(queue.len(), 2);

        queue.pop_front();
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_empty());
    }
}
