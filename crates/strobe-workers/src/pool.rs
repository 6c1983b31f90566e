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

//! Fixed-size thread pool.

use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use strobe_core::dispatch::run_guarded;
use strobe_core::{
    CancelToken, Clock, Dispatcher, Job, JobContext, JobOrigin, Result, StrobeError,
};

enum Message {
    Run(Arc<dyn Job>, JobContext),
}

/// Which job each worker is executing, plus the pool's stopping flag.
///
/// Both live under one lock so a worker cannot start a job after
/// [`ThreadPool::shutdown`] has aborted the running ones.
struct Slots {
    running: Vec<Option<Arc<dyn Job>>>,
    stopping: bool,
}

struct PoolShared {
    slots: Mutex<Slots>,
    completed: AtomicU64,
    discarded: AtomicU64,
}

impl PoolShared {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        // Slots are plain data updated in single statements; poisoning is harmless.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A fixed number of named worker threads fed through one queue.
///
/// Jobs run in submission order as workers become free. The pool is also a
/// [`Dispatcher`], so the timer can hand due jobs to it instead of running
/// them on its own thread.
pub struct ThreadPool {
    sender: Mutex<Option<Sender<Message>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<PoolShared>,
    clock: Clock,
    cancel: CancelToken,
    size: usize,
}

impl ThreadPool {
    /// Spawns `size` workers named `{name_prefix}-{index}`.
    ///
    /// If one of the threads cannot be spawned, the workers already started
    /// are stopped and joined before the error is returned.
    pub fn new(size: usize, name_prefix: &str, clock: Clock, cancel: CancelToken) -> Result<Self> {
        if size == 0 {
            return Err(StrobeError::Config(
                "thread pool needs at least one worker".to_string(),
            ));
        }
        let (sender, receiver) = crossbeam_channel::unbounded();
        let pool = Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(Vec::with_capacity(size)),
            shared: Arc::new(PoolShared {
                slots: Mutex::new(Slots {
                    running: vec![None; size],
                    stopping: false,
                }),
                completed: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
            clock,
            cancel,
            size,
        };

        for index in 0..size {
            let name = format!("{name_prefix}-{index}");
            let receiver = receiver.clone();
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(index, &receiver, &shared));
            match spawned {
                Ok(handle) => pool.lock_workers().push(handle),
                Err(source) => {
                    log::error!("Failed to spawn pool worker '{name}': {source}");
                    pool.shutdown();
                    return Err(StrobeError::Spawn { name, source });
                }
            }
        }
        log::info!("Thread pool started with {size} workers.");
        Ok(pool)
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, job: Arc<dyn Job>, ctx: JobContext) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => {
                if let Err(e) = sender.send(Message::Run(job, ctx)) {
                    let Message::Run(job, _) = e.into_inner();
                    log::warn!("Pool workers are gone; dropping job '{}'.", job.name());
                }
            }
            None => log::warn!("Thread pool is shut down; dropping job '{}'.", job.name()),
        }
    }

    /// Queues `job` for execution on the next free worker.
    ///
    /// Never blocks. After shutdown the job is dropped with a warning.
    pub fn add_job(&self, job: Arc<dyn Job>) {
        let ctx = JobContext::new(JobOrigin::Pool, self.clock, self.cancel.clone());
        self.send(job, ctx);
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Sender::len)
    }

    /// Jobs currently executing.
    pub fn active(&self) -> usize {
        self.shared.slots().running.iter().flatten().count()
    }

    /// Jobs that ran to completion (or panicked) on a worker.
    pub fn completed_count(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Queued jobs thrown away because the pool was shutting down.
    pub fn discarded_count(&self) -> u64 {
        self.shared.discarded.load(Ordering::Relaxed)
    }

    /// `true` until [`ThreadPool::shutdown`] is called.
    pub fn is_running(&self) -> bool {
        !self.shared.slots().stopping
    }

    /// Stops the pool.
    ///
    /// New submissions are refused, running jobs get [`Job::abort`], queued
    /// jobs that have not started are discarded, and every worker is joined.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        let running: Vec<Arc<dyn Job>> = {
            let mut slots = self.shared.slots();
            if slots.stopping && self.lock_workers().is_empty() {
                return;
            }
            slots.stopping = true;
            slots.running.iter().flatten().cloned().collect()
        };
        for job in &running {
            log::debug!("Aborting running job '{}'.", job.name());
            job.abort();
        }

        // Workers leave their loop once the queue is drained and disconnected.
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let handles: Vec<_> = self.lock_workers().drain(..).collect();
        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                log::error!("A pool worker panicked outside of a job.");
            }
        }
        if count > 0 {
            log::info!(
                "Thread pool stopped ({} completed, {} discarded).",
                self.completed_count(),
                self.discarded_count()
            );
        }
    }
}

impl Dispatcher for ThreadPool {
    fn dispatch(&self, job: Arc<dyn Job>, ctx: JobContext) {
        self.send(job, ctx);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, receiver: &Receiver<Message>, shared: &PoolShared) {
    log::debug!("Pool worker {index} started.");
    while let Ok(Message::Run(job, ctx)) = receiver.recv() {
        {
            let mut slots = shared.slots();
            if slots.stopping {
                shared.discarded.fetch_add(1, Ordering::Relaxed);
                log::debug!("Discarding queued job '{}' at shutdown.", job.name());
                continue;
            }
            slots.running[index] = Some(Arc::clone(&job));
        }

        run_guarded(job.as_ref(), &ctx);

        shared.slots().running[index] = None;
        shared.completed.fetch_add(1, Ordering::Relaxed);
    }
    log::debug!("Pool worker {index} stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Barrier;
    use std::time::{Duration, Instant};
    use strobe_core::FnJob;

    fn pool(size: usize) -> ThreadPool {
        ThreadPool::new(size, "test-pool", Clock::new(), CancelToken::new()).unwrap()
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(2) {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let result = ThreadPool::new(0, "empty", Clock::new(), CancelToken::new());
        assert!(matches!(result, Err(StrobeError::Config(_))));
    }

    #[test]
    fn runs_every_submitted_job() {
        let pool = pool(3);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.add_job(Arc::new(FnJob::new("count", move |ctx: &JobContext| {
                assert_eq!(ctx.origin(), JobOrigin::Pool);
                counter.fetch_add(1, Ordering::SeqCst);
            })));
        }
        assert!(wait_until(|| pool.completed_count() == 100));
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn jobs_run_in_parallel() {
        let pool = pool(4);
        let barrier = Arc::new(Barrier::new(4));
        let passed = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let barrier = Arc::clone(&barrier);
            let passed = Arc::clone(&passed);
            pool.add_job(Arc::new(FnJob::new("meet", move |_: &JobContext| {
                barrier.wait();
                passed.fetch_add(1, Ordering::SeqCst);
            })));
        }
        assert!(wait_until(|| passed.load(Ordering::SeqCst) == 4));
    }

    #[test]
    fn panicking_job_keeps_worker_alive() {
        let pool = pool(1);
        let ran = Arc::new(AtomicBool::new(false));
        pool.add_job(Arc::new(FnJob::new("boom", |_: &JobContext| {
            panic!("job failure")
        })));
        let flag = Arc::clone(&ran);
        pool.add_job(Arc::new(FnJob::new("after", move |_: &JobContext| {
            flag.store(true, Ordering::SeqCst);
        })));
        assert!(wait_until(|| ran.load(Ordering::SeqCst)));
    }

    struct Spinner {
        aborted: AtomicBool,
        started: AtomicBool,
    }

    impl Job for Spinner {
        fn execute(&self, _ctx: &JobContext) {
            self.started.store(true, Ordering::SeqCst);
            while !self.aborted.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        }

        fn name(&self) -> &str {
            "spinner"
        }

        fn abort(&self) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn shutdown_aborts_running_and_discards_queued() {
        let pool = pool(1);
        let spinner = Arc::new(Spinner {
            aborted: AtomicBool::new(false),
            started: AtomicBool::new(false),
        });
        pool.add_job(spinner.clone());
        assert!(wait_until(|| spinner.started.load(Ordering::SeqCst)));

        let queued_ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&queued_ran);
        pool.add_job(Arc::new(FnJob::new("queued", move |_: &JobContext| {
            flag.store(true, Ordering::SeqCst);
        })));

        pool.shutdown();

        assert!(spinner.aborted.load(Ordering::SeqCst));
        assert!(!queued_ran.load(Ordering::SeqCst));
        assert_eq!(pool.discarded_count(), 1);
        assert!(!pool.is_running());
        assert_eq!(pool.active(), 0);
    }

    #[test]
    fn submissions_after_shutdown_are_dropped() {
        let pool = pool(2);
        pool.shutdown();
        pool.shutdown();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        pool.add_job(Arc::new(FnJob::new("late", move |_: &JobContext| {
            flag.store(true, Ordering::SeqCst);
        })));
        thread::sleep(Duration::from_millis(20));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(pool.queued(), 0);
    }
}
