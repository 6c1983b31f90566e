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

//! The timer thread.
//!
//! One thread sleeps until the earliest pending deadline or until a new,
//! earlier event is inserted, whichever comes first. Due jobs are handed to a
//! [`Dispatcher`] after the queue lock is released, so a slow job never blocks
//! `add_tick`/`add_wait` callers.

use crate::config::{CatchUpPolicy, TimerConfig};
use crate::event::TimingEvent;
use crate::queue::EventQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use strobe_core::{CancelToken, Clock, Dispatcher, Job, JobContext, Result, StrobeError};

/// Queue plus the "new event" signal count, guarded by one mutex.
#[derive(Debug, Default)]
struct TimerState {
    queue: EventQueue,
    /// Posted when an insertion changes the earliest deadline. Survives until
    /// the timer thread consumes it, so a signal sent while the thread is busy
    /// dispatching is not lost.
    signals: u64,
    stopped: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    new_event: Condvar,
    clock: Clock,
    cancel: CancelToken,
    catch_up: CatchUpPolicy,
    faulted: AtomicBool,
    fired: AtomicU64,
}

impl TimerShared {
    fn lock(&self) -> Result<MutexGuard<'_, TimerState>> {
        self.state.lock().map_err(|_| poisoned())
    }

    fn should_stop(&self, state: &TimerState) -> bool {
        state.stopped || self.cancel.is_cancelled()
    }

    fn insert(&self, event: TimingEvent) {
        if self.faulted.load(Ordering::SeqCst) {
            log::error!(
                "Timer is faulted; dropping job '{}'.",
                event.job().name()
            );
            return;
        }
        let mut state = match self.lock() {
            Ok(state) => state,
            Err(e) => {
                log::error!("{e}; dropping job '{}'.", event.job().name());
                return;
            }
        };
        if self.should_stop(&state) {
            log::warn!(
                "Timer is shut down; dropping job '{}'.",
                event.job().name()
            );
            return;
        }
        log::trace!(
            "Scheduling '{}' at {} ms (repeating: {}).",
            event.job().name(),
            event.deadline(),
            event.is_repeating()
        );
        if state.queue.insert(event) {
            state.signals += 1;
            self.new_event.notify_one();
        }
    }
}

fn poisoned() -> StrobeError {
    StrobeError::SchedulerFault("timer queue lock poisoned".to_string())
}

/// A cloneable handle for scheduling jobs from any thread.
#[derive(Clone)]
pub struct TimerHandle {
    shared: Arc<TimerShared>,
}

impl TimerHandle {
    /// Runs `job` every `interval_ms`, first at `now + interval_ms`.
    ///
    /// A zero interval is clamped to 1 ms. Never blocks beyond the queue lock.
    pub fn add_tick(&self, interval_ms: u32, job: Arc<dyn Job>) {
        let interval = if interval_ms == 0 {
            log::warn!(
                "Tick interval of 0 ms for '{}' clamped to 1 ms.",
                job.name()
            );
            1
        } else {
            interval_ms
        };
        let deadline = self.shared.clock.now_ms() + u64::from(interval);
        self.shared
            .insert(TimingEvent::tick(job, deadline, interval));
    }

    /// Runs `job` once at `now + delay_ms`.
    pub fn add_wait(&self, delay_ms: u32, job: Arc<dyn Job>) {
        let deadline = self.shared.clock.now_ms() + u64::from(delay_ms);
        self.shared.insert(TimingEvent::wait(job, deadline));
    }

    /// Number of events waiting for their deadline.
    pub fn pending(&self) -> usize {
        self.shared.lock().map(|s| s.queue.len()).unwrap_or(0)
    }

    /// Deadline of the earliest pending event.
    pub fn next_deadline(&self) -> Option<u64> {
        self.shared.lock().ok()?.queue.next_deadline()
    }

    /// Total number of events dispatched so far.
    pub fn fired_count(&self) -> u64 {
        self.shared.fired.load(Ordering::Relaxed)
    }

    /// `true` once the timer thread died on an internal invariant violation.
    pub fn is_faulted(&self) -> bool {
        self.shared.faulted.load(Ordering::SeqCst)
    }

    /// The clock deadlines are measured on.
    pub fn clock(&self) -> Clock {
        self.shared.clock
    }
}

/// Owns the timer thread.
///
/// The thread starts in [`TimerScheduler::start`] and stops in
/// [`TimerScheduler::shutdown`] or on drop. Pending events are discarded at
/// shutdown.
pub struct TimerScheduler {
    shared: Arc<TimerShared>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TimerScheduler {
    /// Spawns the timer thread.
    ///
    /// ## Arguments
    /// * `clock` - Clock all deadlines are computed on.
    /// * `cancel` - Process-wide shutdown token. Cancelling it wakes and stops the thread.
    /// * `dispatcher` - Receives each due job, outside the queue lock.
    /// * `config` - Thread name and catch-up policy.
    ///
    /// ## Returns
    /// The running scheduler, or [`StrobeError::Spawn`] if the OS refused the thread.
    pub fn start(
        clock: Clock,
        cancel: CancelToken,
        dispatcher: Arc<dyn Dispatcher>,
        config: TimerConfig,
    ) -> Result<Self> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState::default()),
            new_event: Condvar::new(),
            clock,
            cancel,
            catch_up: config.catch_up,
            faulted: AtomicBool::new(false),
            fired: AtomicU64::new(0),
        });

        // Holding the lock while notifying closes the gap between the loop's
        // cancellation check and its wait.
        let waker = Arc::downgrade(&shared);
        shared.cancel.on_cancel(move || {
            if let Some(shared) = waker.upgrade() {
                let _state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
                shared.new_event.notify_all();
            }
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                log::info!("Timer thread started.");
                if let Err(e) = run(&worker, dispatcher.as_ref()) {
                    worker.faulted.store(true, Ordering::SeqCst);
                    log::error!("Timer thread aborted: {e}");
                }
                log::info!("Timer thread stopped.");
            })
            .map_err(|source| StrobeError::Spawn {
                name: config.thread_name,
                source,
            })?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Returns a cloneable submission handle.
    pub fn handle(&self) -> TimerHandle {
        TimerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// See [`TimerHandle::add_tick`].
    pub fn add_tick(&self, interval_ms: u32, job: Arc<dyn Job>) {
        self.handle().add_tick(interval_ms, job);
    }

    /// See [`TimerHandle::add_wait`].
    pub fn add_wait(&self, delay_ms: u32, job: Arc<dyn Job>) {
        self.handle().add_wait(delay_ms, job);
    }

    /// Number of events waiting for their deadline.
    pub fn pending(&self) -> usize {
        self.handle().pending()
    }

    /// `true` while the thread is alive and healthy.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
            && !self.shared.faulted.load(Ordering::SeqCst)
    }

    /// Stops the thread, waits for it, and drops all pending events.
    ///
    /// A job being dispatched when this is called completes first. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        let dropped = {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.stopped = true;
            state.queue.clear()
        };
        self.shared.new_event.notify_all();

        if handle.join().is_err() {
            log::error!("Timer thread panicked during shutdown.");
        }
        if dropped > 0 {
            log::debug!("Timer shutdown discarded {dropped} pending event(s).");
        }
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The scheduler loop. Returns only on shutdown or on a poisoned lock.
fn run(shared: &TimerShared, dispatcher: &dyn Dispatcher) -> Result<()> {
    let idle = |s: &mut TimerState| s.signals == 0 && !s.stopped && !shared.cancel.is_cancelled();
    let mut state = shared.lock()?;

    loop {
        if shared.should_stop(&state) {
            return Ok(());
        }

        let Some(deadline) = state.queue.next_deadline() else {
            state = shared.new_event.wait_while(state, idle).map_err(|_| poisoned())?;
            state.signals = 0;
            continue;
        };

        if let Some(timeout) = shared.clock.until(deadline) {
            let (guard, result) = shared
                .new_event
                .wait_timeout_while(state, timeout, idle)
                .map_err(|_| poisoned())?;
            state = guard;
            if !result.timed_out() {
                // A new earliest event (or shutdown) arrived; the old front may
                // no longer be first.
                state.signals = 0;
            }
            continue;
        }

        // The front is due. Anything inserted ahead of it since the last look
        // is due as well, so taking the current front is still correct.
        let Some(event) = state.queue.pop_earliest() else {
            continue;
        };
        let now = shared.clock.now_ms();
        let missed = match event.rearm(now, shared.catch_up) {
            Some((next, missed)) => {
                state.queue.insert(next);
                missed
            }
            None => 0,
        };
        drop(state);

        let ctx = JobContext::for_deadline(event.deadline(), shared.clock, shared.cancel.clone())
            .with_missed_ticks(missed);
        if missed > 0 {
            log::debug!(
                "Tick '{}' coalesced {missed} missed deadline(s).",
                event.job().name()
            );
        }
        log::trace!(
            "Dispatching '{}' (deadline {} ms, late by {} ms).",
            event.job().name(),
            event.deadline(),
            ctx.lateness_ms()
        );
        shared.fired.fetch_add(1, Ordering::Relaxed);
        dispatcher.dispatch(Arc::clone(event.job()), ctx);
        // One-shot events end here; `event` is dropped with its job clone.
        drop(event);

        state = shared.lock()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};
    use strobe_core::{FnJob, InlineDispatcher};

    fn wait_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < limit {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn start() -> TimerScheduler {
        TimerScheduler::start(
            Clock::new(),
            CancelToken::new(),
            Arc::new(InlineDispatcher),
            TimerConfig::default(),
        )
        .expect("timer thread should start")
    }

    fn recorder(log: &Arc<StdMutex<Vec<&'static str>>>, name: &'static str) -> Arc<dyn Job> {
        let log = Arc::clone(log);
        Arc::new(FnJob::new(name, move |_: &JobContext| {
            log.lock().unwrap().push(name);
        }))
    }

    #[test]
    fn lifecycle_start_and_shutdown() {
        let mut timer = start();
        assert!(timer.is_running());
        timer.shutdown();
        assert!(!timer.is_running());
        // Second shutdown is a no-op.
        timer.shutdown();
    }

    #[test]
    fn wait_fires_once() {
        let timer = start();
        let log = Arc::new(StdMutex::new(Vec::new()));
        timer.add_wait(10, recorder(&log, "once"));

        thread::sleep(Duration::from_millis(120));

        assert_eq!(*log.lock().unwrap(), ["once"]);
        assert_eq!(timer.pending(), 0);
        assert_eq!(timer.handle().fired_count(), 1);
    }

    #[test]
    fn zero_interval_tick_is_clamped() {
        let timer = start();
        let log = Arc::new(StdMutex::new(Vec::new()));
        timer.add_tick(0, recorder(&log, "spin"));
        thread::sleep(Duration::from_millis(30));
        assert!(!log.lock().unwrap().is_empty());
        assert_eq!(timer.pending(), 1, "tick stays armed");
    }

    #[test]
    fn submissions_after_shutdown_are_dropped() {
        let mut timer = start();
        let handle = timer.handle();
        timer.shutdown();

        let log = Arc::new(StdMutex::new(Vec::new()));
        handle.add_wait(0, recorder(&log, "late"));
        thread::sleep(Duration::from_millis(20));

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn shutdown_discards_pending_events() {
        let mut timer = start();
        let log = Arc::new(StdMutex::new(Vec::new()));
        timer.add_wait(5_000, recorder(&log, "far"));
        timer.add_tick(5_000, recorder(&log, "far-tick"));
        assert_eq!(timer.pending(), 2);

        timer.shutdown();

        assert_eq!(timer.pending(), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn cancel_token_stops_thread() {
        let cancel = CancelToken::new();
        let timer = TimerScheduler::start(
            Clock::new(),
            cancel.clone(),
            Arc::new(InlineDispatcher),
            TimerConfig::default(),
        )
        .unwrap();
        let log = Arc::new(StdMutex::new(Vec::new()));
        timer.add_wait(5_000, recorder(&log, "far"));
        assert!(timer.is_running());

        cancel.cancel();

        assert!(
            wait_until(Duration::from_millis(500), || !timer.is_running()),
            "timer thread still asleep after cancel"
        );
        timer.add_wait(0, recorder(&log, "cancelled"));
        thread::sleep(Duration::from_millis(30));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn cancel_wakes_thread_waiting_on_empty_queue() {
        let cancel = CancelToken::new();
        let timer = TimerScheduler::start(
            Clock::new(),
            cancel.clone(),
            Arc::new(InlineDispatcher),
            TimerConfig::default(),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));

        cancel.cancel();

        assert!(wait_until(Duration::from_millis(500), || !timer.is_running()));
    }

    #[test]
    fn panicking_job_does_not_stop_the_timer() {
        let timer = start();
        let log = Arc::new(StdMutex::new(Vec::new()));
        timer.add_wait(
            5,
            Arc::new(FnJob::new("bad", |_: &JobContext| panic!("job failure"))),
        );
        timer.add_wait(20, recorder(&log, "after"));

        thread::sleep(Duration::from_millis(150));

        assert_eq!(*log.lock().unwrap(), ["after"]);
        assert!(timer.is_running());
    }
}
