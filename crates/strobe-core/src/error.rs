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

//! Defines the error taxonomy shared by the strobe crates.

use thiserror::Error;

/// Errors raised by the scheduler, the workers and the player.
#[derive(Debug, Error)]
pub enum StrobeError {
    /// A thread could not be created. Fatal for the component being built.
    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        /// Name of the thread that failed to start.
        name: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The scheduler's internal state became inconsistent; timing can no longer be trusted.
    #[error("Scheduler fault: {0}")]
    SchedulerFault(String),

    /// The byte stream did not match the container format.
    #[error("Parse error at byte {offset}: {reason}")]
    Parse {
        /// Offset in the stream where the problem was detected.
        offset: u64,
        /// What was wrong.
        reason: String,
    },

    /// The stream ended in the middle of a header or tag.
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The rendering collaborator failed.
    #[error("Render error: {0}")]
    Render(String),

    /// Configuration could not be read or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operation was interrupted by an abort request.
    #[error("Operation aborted")]
    Aborted,

    /// The component has already been shut down.
    #[error("Component is shut down")]
    ShutDown,

    /// The player stopped because of an unrecoverable error.
    #[error("Player failed: {0}")]
    PlayerFailed(String),
}

impl StrobeError {
    /// Builds a [`StrobeError::Parse`].
    pub fn parse(offset: u64, reason: impl Into<String>) -> Self {
        StrobeError::Parse {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors caused by shutdown rather than by a failure.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, StrobeError::Aborted | StrobeError::ShutDown)
    }
}

/// Result alias using [`StrobeError`].
pub type Result<T> = std::result::Result<T, StrobeError>;
