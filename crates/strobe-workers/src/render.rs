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

//! The render thread and its backend seam.

use crate::document::{Document, Frame, FrameSize, Rgb};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use strobe_core::{CancelToken, Job, JobContext, Result, Stopwatch, StrobeError};

/// Draws frames somewhere.
///
/// The backend lives on the render thread; it is initialised lazily, once the
/// stage size is known.
pub trait RenderBackend: Send {
    /// Prepares the output surface.
    fn init(&mut self, size: FrameSize) -> Result<()>;

    /// Draws one committed frame over `background`.
    fn draw(&mut self, frame: &Frame, background: Rgb) -> Result<()>;

    /// Releases the output surface. Called once when the thread stops.
    fn shutdown(&mut self) {}
}

/// A backend that draws nothing and remembers what it was asked to draw.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    size: Option<FrameSize>,
    drawn: Arc<Mutex<Vec<usize>>>,
}

impl HeadlessBackend {
    /// Creates the backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared log of drawn frame indices, readable from other threads.
    pub fn drawn_frames(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.drawn)
    }
}

impl RenderBackend for HeadlessBackend {
    fn init(&mut self, size: FrameSize) -> Result<()> {
        if size.width == 0 || size.height == 0 {
            return Err(StrobeError::Render(format!(
                "empty stage {}x{}",
                size.width, size.height
            )));
        }
        self.size = Some(size);
        Ok(())
    }

    fn draw(&mut self, frame: &Frame, _background: Rgb) -> Result<()> {
        if self.size.is_none() {
            return Err(StrobeError::Render("draw before init".to_string()));
        }
        self.drawn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.index());
        Ok(())
    }
}

/// Render thread settings.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// OS thread name.
    pub thread_name: String,
    /// How long a draw request waits for the first committed frame.
    pub frame_wait_timeout: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            thread_name: "strobe-render".to_string(),
            frame_wait_timeout: Duration::from_millis(100),
        }
    }
}

/// Counters published by the render thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Successful draws.
    pub frames_drawn: u64,
    /// Index of the last frame drawn.
    pub last_frame: Option<usize>,
    /// Total time spent in [`RenderBackend::draw`], in microseconds.
    pub render_time_us: u64,
    /// Draws or initialisations the backend rejected.
    pub failed_draws: u64,
    /// Requests that found no committed frame in time.
    pub skipped_requests: u64,
}

enum Request {
    Draw,
    Stop,
}

/// A cheap handle that posts draw requests to a [`RenderThread`].
///
/// Requests coalesce: while one is pending, further ones are dropped.
#[derive(Clone)]
pub struct RenderRequester {
    sender: Sender<Request>,
    pending: Arc<AtomicBool>,
}

impl RenderRequester {
    /// Asks for the current frame to be drawn. Never blocks.
    ///
    /// Returns `false` if a request was already pending or the thread is gone.
    pub fn request_draw(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.sender.send(Request::Draw).is_err() {
            log::trace!("Render thread gone; draw request dropped.");
            return false;
        }
        true
    }
}

/// Owns the render thread.
pub struct RenderThread {
    requester: RenderRequester,
    stats: Arc<Mutex<RenderStats>>,
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    /// Spawns the render thread around `backend`.
    pub fn start(
        document: Arc<Document>,
        backend: Box<dyn RenderBackend>,
        config: RenderConfig,
        cancel: CancelToken,
    ) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let pending = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(RenderStats::default()));

        let worker = RenderWorker {
            document,
            backend,
            initialized: false,
            pending: Arc::clone(&pending),
            stats: Arc::clone(&stats),
            frame_wait_timeout: config.frame_wait_timeout,
            cancel,
        };
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker.run(&receiver))
            .map_err(|source| StrobeError::Spawn {
                name: config.thread_name,
                source,
            })?;

        Ok(Self {
            requester: RenderRequester { sender, pending },
            stats,
            handle: Some(handle),
        })
    }

    /// Posts a draw request. See [`RenderRequester::request_draw`].
    pub fn request_draw(&self) -> bool {
        self.requester.request_draw()
    }

    /// A handle other threads can post draw requests through.
    pub fn requester(&self) -> RenderRequester {
        self.requester.clone()
    }

    /// A snapshot of the render counters.
    pub fn stats(&self) -> RenderStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `true` until [`RenderThread::stop`].
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops and joins the thread. A draw in progress completes first.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.requester.sender.send(Request::Stop);
            if handle.join().is_err() {
                log::error!("Render thread panicked.");
            }
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RenderWorker {
    document: Arc<Document>,
    backend: Box<dyn RenderBackend>,
    initialized: bool,
    pending: Arc<AtomicBool>,
    stats: Arc<Mutex<RenderStats>>,
    frame_wait_timeout: Duration,
    cancel: CancelToken,
}

impl RenderWorker {
    fn run(mut self, receiver: &Receiver<Request>) {
        log::info!("Render thread started.");
        while let Ok(Request::Draw) = receiver.recv() {
            self.pending.store(false, Ordering::Release);
            if self.cancel.is_cancelled() {
                break;
            }
            self.render();
        }
        self.backend.shutdown();
        log::info!("Render thread stopped.");
    }

    fn update(&self, f: impl FnOnce(&mut RenderStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn render(&mut self) {
        if !self.document.wait_for_frame(1, self.frame_wait_timeout) {
            log::trace!("No committed frame yet; skipping draw.");
            self.update(|s| s.skipped_requests += 1);
            return;
        }
        if !self.initialized {
            let size = self.document.frame_size().unwrap_or_default();
            if let Err(e) = self.backend.init(size) {
                log::error!("Render backend failed to initialise: {e}");
                self.update(|s| s.failed_draws += 1);
                return;
            }
            self.initialized = true;
        }
        let Some(frame) = self.document.frame_at_playhead() else {
            self.update(|s| s.skipped_requests += 1);
            return;
        };

        let stopwatch = Stopwatch::new();
        let result = self.backend.draw(&frame, self.document.background());
        let elapsed = stopwatch.elapsed_us();
        match result {
            Ok(()) => self.update(|s| {
                s.frames_drawn += 1;
                s.last_frame = Some(frame.index());
                s.render_time_us += elapsed;
            }),
            Err(e) => {
                log::warn!("Drawing frame {} failed: {e}", frame.index());
                self.update(|s| s.failed_draws += 1);
            }
        }
    }
}

/// Timer job advancing playback by one frame and requesting a draw.
pub struct RenderTickJob {
    document: Arc<Document>,
    requester: RenderRequester,
}

impl RenderTickJob {
    /// Creates the job.
    pub fn new(document: Arc<Document>, requester: RenderRequester) -> Self {
        Self {
            document,
            requester,
        }
    }
}

impl Job for RenderTickJob {
    fn execute(&self, ctx: &JobContext) {
        if ctx.missed_ticks() > 0 {
            log::debug!("Render tick late by {} frames.", ctx.missed_ticks());
        }
        if self.document.committed_frames() > 0 {
            self.document.advance_playhead();
        }
        self.requester.request_draw();
    }

    fn name(&self) -> &str {
        "render-tick"
    }
}
