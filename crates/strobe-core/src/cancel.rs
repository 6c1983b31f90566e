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

//! Process-wide shutdown signal.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type Waker = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

/// A cloneable, one-way cancellation flag.
///
/// All clones observe the same flag. Once cancelled it stays cancelled.
/// Threads that sleep on their own condition variables register a waker with
/// [`CancelToken::on_cancel`] so `cancel()` can interrupt the sleep.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Creates a token in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags cancellation. Returns `true` if this call performed the transition.
    ///
    /// The first transition runs every registered waker on the calling thread.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let wakers = std::mem::take(
            &mut *self
                .inner
                .wakers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for wake in &wakers {
            wake();
        }
        true
    }

    /// Returns `true` once any clone has been cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Registers `wake` to run once when the token is cancelled.
    ///
    /// Runs `wake` immediately if the token is already cancelled. Wakers must
    /// not block: they run on whichever thread calls `cancel()`.
    pub fn on_cancel(&self, wake: impl Fn() + Send + Sync + 'static) {
        {
            let mut wakers = self
                .inner
                .wakers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            // Checked under the lock: `cancel` sets the flag before taking it.
            if !self.is_cancelled() {
                wakers.push(Box::new(wake));
                return;
            }
        }
        wake();
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
