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

use serde::{Deserialize, Serialize};

/// What a repeating event does when it falls behind by more than one interval,
/// e.g. after the process was suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchUpPolicy {
    /// Fire once for every missed deadline, back to back.
    #[default]
    Burst,
    /// Fire once, then resume at the first grid point after now.
    Coalesce,
}

/// Configuration for the timer thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// OS name given to the scheduler thread.
    pub thread_name: String,
    /// Catch-up behaviour of repeating events.
    pub catch_up: CatchUpPolicy,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            thread_name: "strobe-timer".to_string(),
            catch_up: CatchUpPolicy::Burst,
        }
    }
}
