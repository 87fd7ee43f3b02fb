//! Device timers waiting for their virtual deadline.
//!
//! Ordered by `expire_time`; events registered for the same instant fire
//! in registration order. The callback token is stored untouched and echoed
//! back in the `TriggerEvent`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use buslink_core::protocol::messages::TimerEvent;

struct Scheduled {
    event: TimerEvent,
    seq: u64,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // BinaryHeap is a max-heap: reverse so the earliest deadline, then the
    // lowest sequence number, is on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .event
            .expire_time
            .cmp(&self.event.expire_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, event: TimerEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { event, seq });
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.heap.peek().map(|s| s.event.expire_time)
    }

    /// Removes and returns every event with `expire_time <= now`, earliest first.
    pub fn drain_due(&mut self, now: u64) -> Vec<TimerEvent> {
        let mut due = Vec::new();
        while self.next_deadline().is_some_and(|deadline| deadline <= now) {
            if let Some(scheduled) = self.heap.pop() {
                due.push(scheduled.event);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
