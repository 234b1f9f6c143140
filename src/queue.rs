//! Time and priority ordered event queue.
//!
//! Events leave the queue in non-decreasing time order. Among events at the
//! same time the numerically higher priority fires first, and among events
//! with equal time and priority the one scheduled first fires first.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::event::Event;
use crate::types::SimTime;

/// An event together with its scheduling sequence number.
#[derive(Clone, Debug)]
struct QueuedEvent {
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    /// "Less" fires first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.event
            .time
            .total_cmp(&other.event.time)
            .then_with(|| other.event.priority.cmp(&self.event.priority))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Priority queue of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<QueuedEvent>>,
    next_seq: u64,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an event.
    pub fn push(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(QueuedEvent { seq, event }));
    }

    /// Removes and returns the next event to fire.
    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|Reverse(queued)| queued.event)
    }

    /// Returns the firing time of the next event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|Reverse(queued)| queued.event.time)
    }

    /// Returns the next event without removing it.
    pub fn peek(&self) -> Option<&Event> {
        self.heap.peek().map(|Reverse(queued)| &queued.event)
    }

    /// Returns the number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drops all pending events and resets the sequence counter.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{State, Strength};

    fn force(time: SimTime, priority: i32, node: usize) -> Event {
        Event::force(time, priority, node, State::HIGH, Strength::GATE)
    }

    fn nodes(queue: &mut EventQueue) -> Vec<usize> {
        std::iter::from_fn(|| queue.pop())
            .filter_map(|e| e.action.target_node())
            .collect()
    }

    #[test]
    fn test_time_order() {
        let mut queue = EventQueue::new();
        queue.push(force(30.0, 1, 3));
        queue.push(force(10.0, 1, 1));
        queue.push(force(20.0, 1, 2));

        assert_eq!(queue.peek_time(), Some(10.0));
        assert_eq!(nodes(&mut queue), vec![1, 2, 3]);
    }

    #[test]
    fn test_priority_order_at_equal_time() {
        let mut queue = EventQueue::new();
        queue.push(force(5.0, 1, 1));
        queue.push(force(5.0, 3, 3));
        queue.push(force(5.0, 2, 2));
        queue.push(force(4.0, 0, 0));

        assert_eq!(nodes(&mut queue), vec![0, 3, 2, 1]);
    }

    #[test]
    fn test_fifo_among_equal_keys() {
        let mut queue = EventQueue::new();
        for node in 0..10 {
            queue.push(force(1.0, 1, node));
        }
        assert_eq!(nodes(&mut queue), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_interleaved_push_pop() {
        let mut queue = EventQueue::new();
        queue.push(force(10.0, 1, 1));
        queue.push(force(20.0, 1, 2));

        let first = queue.pop().unwrap();
        assert_eq!(first.time, 10.0);

        queue.push(force(15.0, 1, 3));
        queue.push(force(20.0, 1, 4));

        assert_eq!(nodes(&mut queue), vec![3, 2, 4]);
    }

    #[test]
    fn test_len_and_clear() {
        let mut queue = EventQueue::new();
        assert!(queue.is_empty());
        queue.push(force(1.0, 1, 1));
        queue.push(force(2.0, 1, 2));
        queue.push(force(3.0, 1, 3));
        queue.pop();
        assert_eq!(queue.len(), 2);

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.peek_time(), None);

        // FIFO order still holds after the sequence counter restarts
        queue.push(force(4.0, 1, 5));
        queue.push(force(4.0, 1, 6));
        assert_eq!(nodes(&mut queue), vec![5, 6]);
    }
}
