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

//! The player runtime.
//!
//! [`Player`] owns every thread: the timer, the thread pool, the render thread
//! and the input thread, all sharing one [`Document`](strobe_workers::Document).
//! Build it with [`PlayerBuilder`], feed it a stream with [`Player::load`] and
//! stop it with [`Player::shutdown`].

pub mod config;
pub mod logging;
pub mod player;

pub use config::{DispatchMode, InputSection, PlayerConfig, RenderSection};
pub use player::{frame_interval_ms, Player, PlayerBuilder, PlayerControl};

pub use strobe_core::{FnJob, Job, JobContext, Result, StrobeError};
