// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Deadline-ordered storage for pending timing events.

use crate::event::TimingEvent;
use std::collections::VecDeque;

/// Pending events sorted by ascending deadline, ties kept in insertion order.
///
/// The queue does no locking of its own; the scheduler keeps it behind its
/// mutex. The front always holds the minimum deadline.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<TimingEvent>,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `event` after every event with a deadline less than or equal to its own.
    ///
    /// Returns `true` when the event became the new earliest entry, which is
    /// the only case where a sleeping scheduler has to be woken.
    pub fn insert(&mut self, event: TimingEvent) -> bool {
        let deadline = event.deadline();
        let index = self.events.partition_point(|e| e.deadline() <= deadline);
        self.events.insert(index, event);
        index == 0
    }

    /// The earliest pending event, without removing it.
    pub fn peek_earliest(&self) -> Option<&TimingEvent> {
        self.events.front()
    }

    /// Removes and returns the earliest pending event.
    pub fn pop_earliest(&mut self) -> Option<TimingEvent> {
        self.events.pop_front()
    }

    /// Deadline of the earliest pending event.
    pub fn next_deadline(&self) -> Option<u64> {
        self.events.front().map(TimingEvent::deadline)
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// `true` when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops every pending event and returns how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.events.len();
        self.events.clear();
        count
    }

    /// Iterates pending events in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &TimingEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strobe_core::{FnJob, Job, JobContext};

    fn named(name: &str) -> Arc<dyn Job> {
        Arc::new(FnJob::new(name, |_: &JobContext| {}))
    }

    fn names(queue: &EventQueue) -> Vec<String> {
        queue.iter().map(|e| e.job().name().to_string()).collect()
    }

    #[test]
    fn empty_queue_has_nothing_to_peek() {
        let mut queue = EventQueue::new();
        assert!(queue.is_empty());
        assert!(queue.peek_earliest().is_none());
        assert!(queue.pop_earliest().is_none());
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn insert_keeps_deadline_order() {
        let mut queue = EventQueue::new();
        assert!(queue.insert(TimingEvent::wait(named("c"), 300)));
        assert!(queue.insert(TimingEvent::wait(named("a"), 100)));
        assert!(!queue.insert(TimingEvent::wait(named("b"), 200)));
        assert!(!queue.insert(TimingEvent::wait(named("d"), 400)));

        assert_eq!(names(&queue), ["a", "b", "c", "d"]);
        assert_eq!(queue.next_deadline(), Some(100));
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn equal_deadlines_keep_insertion_order() {
        let mut queue = EventQueue::new();
        queue.insert(TimingEvent::wait(named("first"), 50));
        // Same deadline as the front: not a new earliest.
        assert!(!queue.insert(TimingEvent::wait(named("second"), 50)));
        queue.insert(TimingEvent::wait(named("early"), 10));
        queue.insert(TimingEvent::wait(named("third"), 50));

        assert_eq!(names(&queue), ["early", "first", "second", "third"]);
    }

    #[test]
    fn pop_returns_minimum_each_time() {
        let mut queue = EventQueue::new();
        for (name, deadline) in [("x", 7), ("y", 3), ("z", 5), ("w", 3)] {
            queue.insert(TimingEvent::wait(named(name), deadline));
        }
        let popped: Vec<u64> = std::iter::from_fn(|| queue.pop_earliest())
            .map(|e| e.deadline())
            .collect();
        assert_eq!(popped, [3, 3, 5, 7]);
    }

    #[test]
    fn clear_reports_dropped_count() {
        let mut queue = EventQueue::new();
        queue.insert(TimingEvent::tick(named("tick"), 10, 10));
        queue.insert(TimingEvent::wait(named("wait"), 20));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
