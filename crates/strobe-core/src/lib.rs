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

//! # Strobe Core
//!
//! Foundational crate containing the job contract, the shared clock, the
//! cancellation token and the error taxonomy used by every other strobe crate.
//!
//! Nothing in here owns a thread. Threads live in `strobe-timer` and
//! `strobe-workers`; this crate only defines what they exchange.

#![warn(missing_docs)]

pub mod cancel;
pub mod clock;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod job;

pub use cancel::CancelToken;
pub use clock::{Clock, Stopwatch};
pub use context::{JobContext, JobOrigin};
pub use dispatch::{Dispatcher, InlineDispatcher};
pub use error::{Result, StrobeError};
pub use job::{FnJob, Job};
