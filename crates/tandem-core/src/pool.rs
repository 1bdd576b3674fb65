//! The matchmaking pool.
//!
//! Connections waiting for a partner, in arrival order.

use std::collections::{HashMap, VecDeque};
use tandem_transport::ConnectionId;

/// Compaction never runs below this many queued entries.
const COMPACT_THRESHOLD: usize = 64;

/// FIFO queue of waiting connections.
///
/// Removal from the middle only drops the membership record; the stale
/// entry stays in the deque and is skipped when it reaches the head. Each
/// insertion carries a ticket so an ID that leaves and comes back is only
/// live at its newest position.
#[derive(Debug, Default)]
pub struct WaitingQueue {
    order: VecDeque<(ConnectionId, u64)>,
    members: HashMap<ConnectionId, u64>,
    next_ticket: u64,
}

impl WaitingQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of waiting connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if nobody is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a connection is waiting.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    /// Append a connection to the tail.
    ///
    /// Returns `false` if it was already waiting.
    pub fn push_back(&mut self, id: ConnectionId) -> bool {
        if self.members.contains_key(&id) {
            return false;
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.members.insert(id.clone(), ticket);
        self.order.push_back((id, ticket));
        true
    }

    /// Take the longest-waiting connection.
    pub fn pop_front(&mut self) -> Option<ConnectionId> {
        while let Some((id, ticket)) = self.order.pop_front() {
            if self.members.get(&id) == Some(&ticket) {
                self.members.remove(&id);
                return Some(id);
            }
        }
        None
    }

    /// Peek at the longest-waiting connection.
    #[must_use]
    pub fn front(&self) -> Option<&ConnectionId> {
        self.iter().next()
    }

    /// Remove a connection wherever it is in the queue.
    ///
    /// Returns `true` if it was waiting.
    pub fn remove(&mut self, id: &ConnectionId) -> bool {
        if self.members.remove(id).is_none() {
            return false;
        }
        self.maybe_compact();
        true
    }

    /// Iterate over waiting connections, head first.
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionId> + '_ {
        self.order
            .iter()
            .filter(|(id, ticket)| self.members.get(id) == Some(ticket))
            .map(|(id, _)| id)
    }

    fn maybe_compact(&mut self) {
        if self.order.len() > COMPACT_THRESHOLD && self.order.len() > 2 * self.members.len() {
            let members = &self.members;
            self.order
                .retain(|(id, ticket)| members.get(id) == Some(ticket));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = WaitingQueue::new();
        assert!(queue.push_back(id("a")));
        assert!(queue.push_back(id("b")));
        assert!(queue.push_back(id("c")));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.front(), Some(&id("a")));
        assert_eq!(queue.pop_front(), Some(id("a")));
        assert_eq!(queue.pop_front(), Some(id("b")));
        assert_eq!(queue.pop_front(), Some(id("c")));
        assert_eq!(queue.pop_front(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_no_duplicates() {
        let mut queue = WaitingQueue::new();
        assert!(queue.push_back(id("a")));
        assert!(!queue.push_back(id("a")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_from_middle() {
        let mut queue = WaitingQueue::new();
        queue.push_back(id("a"));
        queue.push_back(id("b"));
        queue.push_back(id("c"));

        assert!(queue.remove(&id("b")));
        assert!(!queue.remove(&id("b")));
        assert!(!queue.contains(&id("b")));

        let order: Vec<_> = queue.iter().cloned().collect();
        assert_eq!(order, vec![id("a"), id("c")]);
        assert_eq!(queue.pop_front(), Some(id("a")));
        assert_eq!(queue.pop_front(), Some(id("c")));
    }

    #[test]
    fn test_rejoin_goes_to_tail() {
        let mut queue = WaitingQueue::new();
        queue.push_back(id("a"));
        queue.push_back(id("b"));

        queue.remove(&id("a"));
        queue.push_back(id("a"));

        let order: Vec<_> = queue.iter().cloned().collect();
        assert_eq!(order, vec![id("b"), id("a")]);
        assert_eq!(queue.pop_front(), Some(id("b")));
        assert_eq!(queue.pop_front(), Some(id("a")));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn test_compaction_keeps_order() {
        let mut queue = WaitingQueue::new();
        for i in 0..200 {
            queue.push_back(id(&format!("c{}", i)));
        }
        for i in 0..200 {
            if i % 10 != 0 {
                queue.remove(&id(&format!("c{}", i)));
            }
        }

        assert_eq!(queue.len(), 20);
        assert!(queue.order.len() <= 2 * COMPACT_THRESHOLD.max(queue.len()));

        let order: Vec<_> = queue.iter().cloned().collect();
        let expected: Vec<_> = (0..200)
            .filter(|i| i % 10 == 0)
            .map(|i| id(&format!("c{}", i)))
            .collect();
        assert_eq!(order, expected);
    }
}
