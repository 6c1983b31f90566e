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

//! Execution context handed to every job.

use crate::cancel::CancelToken;
use crate::clock::Clock;

/// Which part of the system is running a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobOrigin {
    /// Dispatched by the timer scheduler when its deadline expired.
    Timer,
    /// Submitted directly to the thread pool.
    Pool,
    /// Run by a dedicated worker thread.
    Worker,
}

/// Everything a job may need from the running system.
///
/// The context is built by whoever dispatches the job and passed by reference
/// into [`Job::execute`](crate::Job::execute). Jobs never look up the system
/// through global state.
#[derive(Debug, Clone)]
pub struct JobContext {
    origin: JobOrigin,
    deadline: Option<u64>,
    fired_at: u64,
    missed_ticks: u64,
    clock: Clock,
    cancel: CancelToken,
}

impl JobContext {
    /// Context for a job that is not bound to a deadline.
    pub fn new(origin: JobOrigin, clock: Clock, cancel: CancelToken) -> Self {
        Self {
            origin,
            deadline: None,
            fired_at: clock.now_ms(),
            missed_ticks: 0,
            clock,
            cancel,
        }
    }

    /// Context for a job fired by the timer for `deadline`.
    pub fn for_deadline(deadline: u64, clock: Clock, cancel: CancelToken) -> Self {
        Self {
            origin: JobOrigin::Timer,
            deadline: Some(deadline),
            fired_at: clock.now_ms(),
            missed_ticks: 0,
            clock,
            cancel,
        }
    }

    /// Records how many tick deadlines were folded into this firing.
    pub fn with_missed_ticks(mut self, missed: u64) -> Self {
        self.missed_ticks = missed;
        self
    }

    /// Re-labels the origin, keeping the deadline information.
    pub fn with_origin(mut self, origin: JobOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Who dispatched the job.
    pub fn origin(&self) -> JobOrigin {
        self.origin
    }

    /// The scheduled deadline, for timer jobs.
    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    /// When the job was handed over for execution, in clock milliseconds.
    pub fn fired_at(&self) -> u64 {
        self.fired_at
    }

    /// How late the dispatch was relative to the deadline.
    pub fn lateness_ms(&self) -> u64 {
        self.deadline
            .map(|d| self.fired_at.saturating_sub(d))
            .unwrap_or(0)
    }

    /// Tick deadlines skipped by catch-up coalescing before this firing.
    pub fn missed_ticks(&self) -> u64 {
        self.missed_ticks
    }

    /// The shared clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The shutdown token; long jobs should poll it.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Shorthand for `cancel_token().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
