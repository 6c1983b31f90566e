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

//! The unit of deferred work.

use crate::context::JobContext;
use std::fmt;

/// A schedulable unit of work with a single entry point.
///
/// Jobs are shared as `Arc<dyn Job>`: the scheduler keeps one clone per pending
/// event, a repeating event reuses the same clone on every re-arm, and the
/// caller may keep its own clone to observe results. `execute` takes `&self`,
/// so jobs that mutate state use interior mutability.
pub trait Job: Send + Sync {
    /// Performs the job's action.
    ///
    /// Failures are the job's own business: report them through the job's own
    /// channel. A panic is caught and logged by the dispatcher, never
    /// propagated into the scheduler.
    fn execute(&self, ctx: &JobContext);

    /// A short label used in logs.
    fn name(&self) -> &str {
        "job"
    }

    /// Asks an in-flight `execute` to return as soon as possible.
    ///
    /// Called from another thread during shutdown. The default does nothing,
    /// which is correct for jobs that never block for long.
    fn abort(&self) {}
}

/// A job wrapping a closure; the generic-callback variant.
pub struct FnJob<F>
where
    F: Fn(&JobContext) + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnJob<F>
where
    F: Fn(&JobContext) + Send + Sync,
{
    /// Wraps `func` under the given log label.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Job for FnJob<F>
where
    F: Fn(&JobContext) + Send + Sync,
{
    fn execute(&self, ctx: &JobContext) {
        (self.func)(ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnJob<F>
where
    F: Fn(&JobContext) + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CancelToken, Clock, JobOrigin};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fn_job_runs_closure_with_context() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let job = FnJob::new("counter", move |ctx: &JobContext| {
            assert_eq!(ctx.origin(), JobOrigin::Pool);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let ctx = JobContext::new(JobOrigin::Pool, Clock::new(), CancelToken::new());

        job.execute(&ctx);
        job.execute(&ctx);

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(job.name(), "counter");
    }

    #[test]
    fn fn_job_is_usable_as_trait_object() {
        let job: Arc<dyn Job> = Arc::new(FnJob::new("noop", |_: &JobContext| {}));
        job.abort();
        assert_eq!(job.name(), "noop");
    }
}
