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

//! A job bound to an absolute deadline.

use crate::config::CatchUpPolicy;
use std::fmt;
use std::sync::Arc;
use strobe_core::Job;

/// A pending timer entry.
///
/// Deadlines are absolute milliseconds on the scheduler's [`Clock`](strobe_core::Clock).
/// A repeating event keeps the same job `Arc` across every re-arm.
#[derive(Clone)]
pub struct TimingEvent {
    job: Arc<dyn Job>,
    deadline: u64,
    repeating: bool,
    interval: u32,
}

impl TimingEvent {
    /// A one-shot event firing at `deadline`.
    pub fn wait(job: Arc<dyn Job>, deadline: u64) -> Self {
        Self {
            job,
            deadline,
            repeating: false,
            interval: 0,
        }
    }

    /// A repeating event first firing at `first_deadline`, then every `interval` ms.
    pub fn tick(job: Arc<dyn Job>, first_deadline: u64, interval: u32) -> Self {
        Self {
            job,
            deadline: first_deadline,
            repeating: true,
            interval,
        }
    }

    /// The job to run.
    pub fn job(&self) -> &Arc<dyn Job> {
        &self.job
    }

    /// Absolute deadline in clock milliseconds.
    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    /// `true` for events created by `add_tick`.
    pub fn is_repeating(&self) -> bool {
        self.repeating
    }

    /// Re-arm interval in milliseconds; zero for one-shot events.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Builds the next occurrence of a repeating event.
    ///
    /// The new deadline is derived from the previous *scheduled* deadline, never
    /// from the firing time, so ticks do not drift. Returns `None` for one-shot
    /// events. The second value counts the deadlines skipped by
    /// [`CatchUpPolicy::Coalesce`] (always zero for `Burst`).
    pub fn rearm(&self, now: u64, policy: CatchUpPolicy) -> Option<(TimingEvent, u64)> {
        if !self.repeating {
            return None;
        }
        let interval = u64::from(self.interval.max(1));
        let mut next = self.deadline.saturating_add(interval);
        let mut skipped = 0;

        if policy == CatchUpPolicy::Coalesce && next <= now {
            // Jump to the first grid point strictly after `now`.
            skipped = (now - self.deadline) / interval;
            next = self.deadline.saturating_add((skipped + 1) * interval);
        }

        Some((
            TimingEvent {
                job: Arc::clone(&self.job),
                deadline: next,
                repeating: true,
                interval: self.interval,
            },
            skipped,
        ))
    }
}

impl fmt::Debug for TimingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingEvent")
            .field("job", &self.job.name())
            .field("deadline", &self.deadline)
            .field("repeating", &self.repeating)
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strobe_core::{FnJob, JobContext};

    fn noop() -> Arc<dyn Job> {
        Arc::new(FnJob::new("noop", |_: &JobContext| {}))
    }

    #[test]
    fn one_shot_never_rearms() {
        let event = TimingEvent::wait(noop(), 100);
        assert!(!event.is_repeating());
        assert_eq!(event.interval(), 0);
        assert!(event.rearm(1_000, CatchUpPolicy::Burst).is_none());
    }

    #[test]
    fn tick_rearms_from_scheduled_deadline() {
        let event = TimingEvent::tick(noop(), 30, 30);
        // Fired late at 45: the next deadline is still 60, not 75.
        let (next, skipped) = event.rearm(45, CatchUpPolicy::Burst).unwrap();
        assert_eq!(next.deadline(), 60);
        assert_eq!(skipped, 0);
        assert!(Arc::ptr_eq(next.job(), event.job()));
    }

    #[test]
    fn burst_keeps_every_missed_deadline() {
        let event = TimingEvent::tick(noop(), 10, 10);
        let (next, skipped) = event.rearm(100, CatchUpPolicy::Burst).unwrap();
        assert_eq!(next.deadline(), 20);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn coalesce_jumps_to_next_grid_point() {
        let event = TimingEvent::tick(noop(), 10, 10);
        // Deadlines 20..=100 are all due at now = 100.
        let (next, skipped) = event.rearm(100, CatchUpPolicy::Coalesce).unwrap();
        assert_eq!(next.deadline(), 110);
        assert_eq!(skipped, 9);

        let (next, skipped) = event.rearm(15, CatchUpPolicy::Coalesce).unwrap();
        assert_eq!(next.deadline(), 20);
        assert_eq!(skipped, 0);
    }
}
