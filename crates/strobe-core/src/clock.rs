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

//! Monotonic time sources shared by the scheduler and the workers.
//!
//! Every deadline in the system is a millisecond offset from one [`Clock`]
//! epoch. Components receive a copy of the same clock, so "now" reads and
//! deadline arithmetic can never disagree, and wall-clock adjustments have
//! no effect on scheduling.

use std::time::{Duration, Instant};

/// A monotonic millisecond clock anchored at a fixed epoch.
///
/// `Clock` is `Copy`: cloning it keeps the same epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    /// Creates a clock whose epoch is the current instant.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Creates a clock anchored at an existing instant.
    pub fn with_epoch(epoch: Instant) -> Self {
        Self { epoch }
    }

    /// Returns the epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Milliseconds elapsed since the epoch.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Converts a millisecond timestamp on this clock back into an `Instant`.
    #[inline]
    pub fn instant_at(&self, ms: u64) -> Instant {
        self.epoch + Duration::from_millis(ms)
    }

    /// Time left until `deadline_ms`, or `None` if it is already due.
    pub fn until(&self, deadline_ms: u64) -> Option<Duration> {
        let target = self.instant_at(deadline_ms);
        let now = Instant::now();
        if target > now {
            Some(target - now)
        } else {
            None
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Measures elapsed time from its creation.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    start_time: Instant,
}

impl Stopwatch {
    /// Creates a new Stopwatch instance, started immediately.
    #[inline]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Returns the elapsed time since the stopwatch was started.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the elapsed time in milliseconds.
    #[inline]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Returns the elapsed time in microseconds.
    #[inline]
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed().as_micros() as u64
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const SLEEP_DURATION_MS: u64 = 50;
    const SLEEP_MARGIN_MS: u64 = 200;

    #[test]
    fn clock_starts_near_zero() {
        let clock = Clock::new();
        assert!(clock.now_ms() < 15, "fresh clock should read close to zero");
    }

    #[test]
    fn clock_copies_share_epoch() {
        let clock = Clock::new();
        let copy = clock;
        thread::sleep(Duration::from_millis(10));
        assert_eq!(clock.epoch(), copy.epoch());
        assert!(copy.now_ms() >= 10);
    }

    #[test]
    fn until_reports_remaining_time() {
        let clock = Clock::new();
        let remaining = clock.until(clock.now_ms() + 500).expect("deadline is in the future");
        assert!(remaining <= Duration::from_millis(500));
        assert!(remaining > Duration::from_millis(400));
        assert!(clock.until(0).is_none(), "epoch is already due");
    }

    #[test]
    fn instant_at_round_trips_through_now() {
        let clock = Clock::new();
        thread::sleep(Duration::from_millis(20));
        let now = clock.now_ms();
        let at = clock.instant_at(now);
        assert!(at <= Instant::now());
        assert!(Instant::now() - at < Duration::from_millis(SLEEP_MARGIN_MS));
    }

    #[test]
    fn stopwatch_elapsed_time_after_delay() {
        let watch = Stopwatch::new();
        thread::sleep(Duration::from_millis(SLEEP_DURATION_MS));

        let elapsed_ms = watch.elapsed_ms();
        assert!(
            elapsed_ms >= SLEEP_DURATION_MS,
            "Elapsed ms ({elapsed_ms}) should be >= sleep duration ms ({SLEEP_DURATION_MS})"
        );
        assert!(
            elapsed_ms < SLEEP_DURATION_MS + SLEEP_MARGIN_MS,
            "Elapsed ms ({elapsed_ms}) should be < sleep duration + margin"
        );
        assert!(watch.elapsed_us() >= SLEEP_DURATION_MS * 1000);
    }
}
