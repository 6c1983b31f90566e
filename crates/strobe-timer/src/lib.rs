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

//! # Strobe Timer
//!
//! A dedicated thread that keeps future deadlines in order and dispatches the
//! attached jobs when they expire.
//!
//! - [`TimerHandle::add_wait`] schedules a one-shot job.
//! - [`TimerHandle::add_tick`] schedules a repeating job whose deadlines are
//!   computed from the previous scheduled deadline, so they never drift.
//!
//! Jobs run through a [`Dispatcher`](strobe_core::Dispatcher): either inline on
//! the timer thread or on a worker pool.

pub mod config;
pub mod event;
pub mod queue;
pub mod scheduler;

pub use config::{CatchUpPolicy, TimerConfig};
pub use event::TimingEvent;
pub use queue::EventQueue;
pub use scheduler::{TimerHandle, TimerScheduler};
