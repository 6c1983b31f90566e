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

//! One-shot completion signal.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A value published once and awaited by any number of threads.
///
/// The first call to [`Completion::complete`] wins; later values are ignored.
#[derive(Debug)]
pub struct Completion<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }
}

impl<T> Completion<T> {
    /// Creates an empty completion.
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking waiter cannot leave the slot half-written, so a poisoned
    // lock is still safe to read.
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `value` and wakes every waiter.
    ///
    /// Returns `false` if a value was already published.
    pub fn complete(&self, value: T) -> bool {
        let mut slot = self.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        self.ready.notify_all();
        true
    }

    /// `true` once a value has been published.
    pub fn is_complete(&self) -> bool {
        self.lock().is_some()
    }
}

impl<T: Clone> Completion<T> {
    /// Blocks until a value is published and returns a copy of it.
    pub fn wait(&self) -> T {
        let guard = self
            .ready
            .wait_while(self.lock(), |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(value) => value.clone(),
            None => unreachable!("wait_while returned with an empty slot"),
        }
    }

    /// Like [`Completion::wait`], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let (guard, _) = self
            .ready
            .wait_timeout_while(self.lock(), timeout, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }

    /// The published value, without blocking.
    pub fn get(&self) -> Option<T> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn first_value_wins() {
        let done = Completion::new();
        assert!(!done.is_complete());
        assert!(done.complete(1));
        assert!(!done.complete(2));
        assert_eq!(done.get(), Some(1));
    }

    #[test]
    fn waiters_wake_on_complete() {
        let done = Arc::new(Completion::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let done = Arc::clone(&done);
                thread::spawn(move || done.wait())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        done.complete("finished".to_string());
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), "finished");
        }
    }

    #[test]
    fn wait_timeout_gives_up() {
        let done: Completion<u8> = Completion::new();
        assert_eq!(done.wait_timeout(Duration::from_millis(10)), None);
    }
}
