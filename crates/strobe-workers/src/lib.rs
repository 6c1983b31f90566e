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

//! Worker threads fed by the timer and by the orchestrator.
//!
//! - [`ThreadPool`]: fixed set of threads running submitted jobs.
//! - [`Document`]: the shared root object the parser fills and the renderer reads.
//! - [`ParseJob`]: turns a tag stream into committed frames.
//! - [`RenderThread`]: draws the current frame on request.
//! - [`InputThread`]: routes input events to named listeners.

#![warn(missing_docs)]

pub mod codec;
pub mod document;
pub mod input;
pub mod parse;
pub mod pool;
pub mod render;
pub mod signal;

pub use codec::{encode_stream, Tag, TagReader, TagWriter};
pub use document::{Definition, Document, DocumentHeader, Frame, FrameItem, FrameSize, Rgb};
pub use input::{
    ChannelInputSource, EventListener, InputConfig, InputEvent, InputInjector, InputSource,
    InputThread,
};
pub use parse::{ParseJob, ParseSummary};
pub use pool::ThreadPool;
pub use render::{
    HeadlessBackend, RenderBackend, RenderConfig, RenderRequester, RenderStats, RenderThread,
    RenderTickJob,
};
pub use signal::Completion;
