//! Time-ordered event queue.
//!
//! A min-heap on `(time, peering-success-first, arrival order)`. The
//! peering tie-break guarantees a `PeeringSuccess` is observed before
//! any same-time event that might re-examine the mapping it installs;
//! the arrival sequence makes same-time cohorts pop deterministically.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::event::Event;

#[derive(Debug)]
struct QueuedEvent {
    event: Event,
    seq: u64,
}

impl QueuedEvent {
    fn key(&self) -> (i64, u8, u64) {
        let rank = if self.event.tag.is_peering_success() {
            0
        } else {
            1
        };
        (self.event.time, rank, self.seq)
    }
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: BinaryHeap is a max-heap, we want the smallest key
        other.key().cmp(&self.key())
    }
}

#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    seq: u64,
}

impl EventQueue {
    pub fn new() -> EventQueue {
        EventQueue::default()
    }

    pub fn push(&mut self, event: Event) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(QueuedEvent { event, seq });
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|q| q.event)
    }

    pub fn peek_time(&self) -> Option<i64> {
        self.heap.peek().map(|q| q.event.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
