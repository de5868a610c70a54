//! Bounded queues between the engine and its collaborators
//!
//! The outbound queue holds payloads waiting for the next token hold, the
//! inbound queue holds accepted payloads until the upper layer collects
//! them. Both have a fixed capacity. A full outbound queue refuses new
//! requests so the caller can back off; a full inbound queue applies the
//! configured [`OverflowPolicy`].

use std::collections::VecDeque;

use bytes::Bytes;

use crate::core::{Error, OverflowPolicy, QueueKind, Result};

/// Payload waiting to be sent during a token hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Application payload
    pub payload: Bytes,
    /// Destination station, or broadcast
    pub destination: u8,
    /// Whether the destination is expected to answer
    pub expects_reply: bool,
}

impl Outbound {
    pub fn new(payload: impl Into<Bytes>, destination: u8, expects_reply: bool) -> Self {
        Outbound {
            payload: payload.into(),
            destination,
            expects_reply,
        }
    }
}

/// Payload accepted from the line and handed upward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Application payload
    pub payload: Bytes,
    /// Station that sent it
    pub source: u8,
    /// Whether the sender is waiting for an answer from us
    pub expects_reply: bool,
}

/// Fixed-capacity FIFO
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    kind: QueueKind,
    items: VecDeque<T>,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: u64,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue; a zero capacity is raised to one
    pub fn new(kind: QueueKind, capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        BoundedQueue {
            kind,
            items: VecDeque::with_capacity(capacity),
            capacity,
            policy,
            dropped: 0,
        }
    }

    /// Appends an entry
    ///
    /// When the queue is full and the policy is `DropNewest` the entry is
    /// refused with [`Error::QueueFull`] and the queue is left untouched.
    /// With `DropOldest` the head is evicted and returned.
    pub fn push(&mut self, item: T) -> Result<Option<T>> {
        if !self.is_full() {
            self.items.push_back(item);
            return Ok(None);
        }

        self.dropped += 1;
        match self.policy {
            OverflowPolicy::DropNewest => Err(Error::queue_full(self.kind, self.capacity)),
            OverflowPolicy::DropOldest => {
                let evicted = self.items.pop_front();
                self.items.push_back(item);
                Ok(evicted)
            }
        }
    }

    /// Removes the oldest entry
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Oldest entry, left in place
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries lost to overflow since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound(n: u8) -> Outbound {
        Outbound::new(vec![n], 7, false)
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = BoundedQueue::new(QueueKind::Outbound, 4, OverflowPolicy::DropNewest);
        for n in 0..3 {
            queue.push(outbound(n)).unwrap();
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().map(|o| o.payload[0]), Some(0));
        assert_eq!(queue.peek().map(|o| o.payload[0]), Some(1));
    }

    #[test]
    fn test_full_queue_rejects_and_keeps_entries() {
        let mut queue = BoundedQueue::new(QueueKind::Outbound, 2, OverflowPolicy::DropNewest);
        queue.push(outbound(1)).unwrap();
        queue.push(outbound(2)).unwrap();
        assert!(queue.is_full());

        let err = queue.push(outbound(3)).unwrap_err();
        assert!(matches!(
            err,
            Error::QueueFull { queue: QueueKind::Outbound, capacity: 2 }
        ));

        let kept: Vec<u8> = queue.iter().map(|o| o.payload[0]).collect();
        assert_eq!(kept, vec![1, 2]);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_drop_oldest_evicts_head() {
        let mut queue = BoundedQueue::new(QueueKind::Inbound, 2, OverflowPolicy::DropOldest);
        queue.push(1u32).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.push(3).unwrap(), Some(1));
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_zero_capacity_raised() {
        let queue: BoundedQueue<u8> =
            BoundedQueue::new(QueueKind::Inbound, 0, OverflowPolicy::DropNewest);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.is_empty());
    }
}
