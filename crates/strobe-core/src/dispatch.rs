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

//! The seam between "a job is due" and "a thread runs it".

use crate::context::JobContext;
use crate::job::Job;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Hands a due job to some thread for execution.
///
/// The timer scheduler owns no workers; it calls a `Dispatcher` for every
/// expired event. Implementations must not hold locks shared with the caller
/// while the job runs.
pub trait Dispatcher: Send + Sync {
    /// Runs or enqueues `job` with `ctx`.
    fn dispatch(&self, job: Arc<dyn Job>, ctx: JobContext);
}

/// Runs jobs on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Arc<dyn Job>, ctx: JobContext) {
        run_guarded(job.as_ref(), &ctx);
    }
}

/// Executes `job`, containing a panic to the job itself.
///
/// Returns `false` if the job panicked. The panic is logged with the job name.
pub fn run_guarded(job: &dyn Job, ctx: &JobContext) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| job.execute(ctx))) {
        Ok(()) => true,
        Err(payload) => {
            log::error!("Job '{}' panicked: {}", job.name(), panic_message(payload.as_ref()));
            false
        }
    }
}

/// Extracts the message of a caught panic.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CancelToken, Clock, FnJob, JobOrigin};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn ctx() -> JobContext {
        JobContext::new(JobOrigin::Timer, Clock::new(), CancelToken::new())
    }

    #[test]
    fn inline_dispatcher_runs_on_caller_thread() {
        let caller = std::thread::current().id();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let job: Arc<dyn Job> = Arc::new(FnJob::new("inline", move |_: &JobContext| {
            assert_eq!(std::thread::current().id(), caller);
            flag.store(true, Ordering::SeqCst);
        }));

        InlineDispatcher.dispatch(job, ctx());

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn run_guarded_contains_panics() {
        let job = FnJob::new("explodes", |_: &JobContext| panic!("boom"));
        assert!(!run_guarded(&job, &ctx()));

        let fine = FnJob::new("fine", |_: &JobContext| {});
        assert!(run_guarded(&fine, &ctx()));
    }
}
