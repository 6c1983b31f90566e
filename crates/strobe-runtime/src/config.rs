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

//! Player configuration, read from a TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration:
//!
//! ```toml
//! pool_workers = 4
//! dispatch = "inline"        # or "pool"
//! catch_up = "burst"         # or "coalesce"
//! thread_name_prefix = "strobe"
//!
//! [render]
//! enabled = true
//! frame_wait_timeout_ms = 100
//!
//! [input]
//! enabled = true
//! poll_interval_ms = 50
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use strobe_core::{Result, StrobeError};
use strobe_timer::{CatchUpPolicy, TimerConfig};
use strobe_workers::{InputConfig, RenderConfig};

/// Upper bound on `pool_workers`.
pub const MAX_POOL_WORKERS: usize = 256;

/// Where the timer runs due jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// On the timer thread itself. A slow job delays every later deadline.
    #[default]
    Inline,
    /// On the thread pool.
    Pool,
}

/// `[render]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSection {
    /// Start a render thread.
    pub enabled: bool,
    /// How long a draw request waits for the first frame.
    pub frame_wait_timeout_ms: u64,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_wait_timeout_ms: 100,
        }
    }
}

/// `[input]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSection {
    /// Start an input thread.
    pub enabled: bool,
    /// Longest blocking poll on the input source.
    pub poll_interval_ms: u64,
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 50,
        }
    }
}

/// Top-level player configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Threads in the pool.
    pub pool_workers: usize,
    /// Where timer jobs run.
    pub dispatch: DispatchMode,
    /// Catch-up behaviour of repeating timer jobs.
    pub catch_up: CatchUpPolicy,
    /// Prefix for every thread name.
    pub thread_name_prefix: String,
    /// Render thread settings.
    pub render: RenderSection,
    /// Input thread settings.
    pub input: InputSection,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            pool_workers: 4,
            dispatch: DispatchMode::Inline,
            catch_up: CatchUpPolicy::Burst,
            thread_name_prefix: "strobe".to_string(),
            render: RenderSection::default(),
            input: InputSection::default(),
        }
    }
}

impl PlayerConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| StrobeError::Config(format!("invalid player config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration at `path`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No '{}' found. Using default configuration.", path.display());
            return Ok(Self::default());
        }
        log::info!("Loading configuration from '{}'.", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Rejects values no player can run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_workers == 0 || self.pool_workers > MAX_POOL_WORKERS {
            return Err(StrobeError::Config(format!(
                "pool_workers must be between 1 and {MAX_POOL_WORKERS}, got {}",
                self.pool_workers
            )));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(StrobeError::Config(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        if self.input.enabled && self.input.poll_interval_ms == 0 {
            return Err(StrobeError::Config(
                "input.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialises back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| StrobeError::Config(e.to_string()))
    }

    pub(crate) fn thread_name(&self, role: &str) -> String {
        format!("{}-{role}", self.thread_name_prefix)
    }

    /// Timer settings derived from this configuration.
    pub fn timer_config(&self) -> TimerConfig {
        TimerConfig {
            thread_name: self.thread_name("timer"),
            catch_up: self.catch_up,
        }
    }

    /// Render thread settings derived from this configuration.
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            thread_name: self.thread_name("render"),
            frame_wait_timeout: Duration::from_millis(self.render.frame_wait_timeout_ms),
        }
    }

    /// Input thread settings derived from this configuration.
    pub fn input_config(&self) -> InputConfig {
        InputConfig {
            thread_name: self.thread_name("input"),
            poll_interval: Duration::from_millis(self.input.poll_interval_ms),
        }
    }
}
