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

//! The orchestrator.

use crate::config::{DispatchMode, PlayerConfig};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use strobe_core::{CancelToken, Clock, Dispatcher, InlineDispatcher, Job, Result, StrobeError};
use strobe_timer::{TimerHandle, TimerScheduler};
use strobe_workers::{
    ChannelInputSource, Document, DocumentHeader, EventListener, HeadlessBackend, InputInjector,
    InputSource, InputThread, ParseJob, RenderBackend, RenderStats, RenderThread, RenderTickJob,
    ThreadPool,
};

/// Milliseconds between frames at `frame_rate` fps, clamped to 1..=1000.
///
/// A rate that is zero, negative or not a number plays at one frame per second.
pub fn frame_interval_ms(frame_rate: f32) -> u32 {
    if frame_rate.is_nan() || frame_rate <= 0.0 {
        log::warn!("Frame rate {frame_rate} is not playable; using 1 fps.");
        return 1000;
    }
    (1000.0 / frame_rate).round().clamp(1.0, 1000.0) as u32
}

#[derive(Debug, Default)]
struct Status {
    shutdown: bool,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct ControlShared {
    status: Mutex<Status>,
    changed: Condvar,
}

/// Cloneable handle to the player's shutdown and error flags.
///
/// Jobs capture it to stop the player from any thread.
#[derive(Debug, Clone, Default)]
pub struct PlayerControl {
    shared: Arc<ControlShared>,
}

impl PlayerControl {
    fn status(&self) -> MutexGuard<'_, Status> {
        self.shared
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Asks the player to stop. Wakes everyone blocked in [`PlayerControl::wait`].
    pub fn set_shutdown_flag(&self) {
        let mut status = self.status();
        if !status.shutdown {
            log::info!("Shutdown requested.");
            status.shutdown = true;
        }
        self.shared.changed.notify_all();
    }

    /// Records a fatal error and requests shutdown. The first reason is kept.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        log::error!("Player failed: {reason}");
        {
            let mut status = self.status();
            if status.error.is_none() {
                status.error = Some(reason);
            }
        }
        self.set_shutdown_flag();
    }

    /// `true` once shutdown was requested.
    pub fn is_shutting_down(&self) -> bool {
        self.status().shutdown
    }

    /// The recorded failure, if any.
    pub fn error(&self) -> Option<String> {
        self.status().error.clone()
    }

    fn outcome(status: &Status) -> Result<()> {
        match &status.error {
            Some(reason) => Err(StrobeError::PlayerFailed(reason.clone())),
            None => Ok(()),
        }
    }

    /// Blocks until shutdown is requested.
    ///
    /// Returns [`StrobeError::PlayerFailed`] if it was requested through
    /// [`PlayerControl::fail`].
    pub fn wait(&self) -> Result<()> {
        let status = self
            .shared
            .changed
            .wait_while(self.status(), |s| !s.shutdown)
            .unwrap_or_else(PoisonError::into_inner);
        Self::outcome(&status)
    }

    /// Like [`PlayerControl::wait`], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<()>> {
        let (status, _) = self
            .shared
            .changed
            .wait_timeout_while(self.status(), timeout, |s| !s.shutdown)
            .unwrap_or_else(PoisonError::into_inner);
        status.shutdown.then(|| Self::outcome(&status))
    }
}

/// Configures and starts a [`Player`].
#[derive(Default)]
pub struct PlayerBuilder {
    config: PlayerConfig,
    clock: Option<Clock>,
    render_backend: Option<Box<dyn RenderBackend>>,
    input_source: Option<Box<dyn InputSource>>,
}

impl PlayerBuilder {
    /// A builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration.
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `clock` instead of one started at [`PlayerBuilder::start`].
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Draws through `backend` instead of the headless one.
    pub fn render_backend(mut self, backend: Box<dyn RenderBackend>) -> Self {
        self.render_backend = Some(backend);
        self
    }

    /// Reads input from `source` instead of an in-process channel.
    pub fn input_source(mut self, source: Box<dyn InputSource>) -> Self {
        self.input_source = Some(source);
        self
    }

    /// Starts every thread.
    ///
    /// If one of them fails to start, the ones already running are stopped
    /// before the error is returned.
    pub fn start(self) -> Result<Player> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_default();
        let cancel = CancelToken::new();

        let pool = Arc::new(ThreadPool::new(
            config.pool_workers,
            &config.thread_name("pool"),
            clock,
            cancel.clone(),
        )?);
        let dispatcher: Arc<dyn Dispatcher> = match config.dispatch {
            DispatchMode::Inline => Arc::new(InlineDispatcher),
            DispatchMode::Pool => Arc::clone(&pool) as Arc<dyn Dispatcher>,
        };
        let timer = TimerScheduler::start(clock, cancel.clone(), dispatcher, config.timer_config())?;
        let document = Arc::new(Document::new());

        let render = if config.render.enabled {
            let backend = self
                .render_backend
                .unwrap_or_else(|| Box::new(HeadlessBackend::new()));
            Some(RenderThread::start(
                Arc::clone(&document),
                backend,
                config.render_config(),
                cancel.clone(),
            )?)
        } else {
            None
        };

        let mut injector = None;
        let input = if config.input.enabled {
            let source = match self.input_source {
                Some(source) => source,
                None => {
                    let source = ChannelInputSource::new();
                    injector = Some(source.injector());
                    Box::new(source) as Box<dyn InputSource>
                }
            };
            Some(InputThread::start(source, config.input_config(), cancel.clone())?)
        } else {
            None
        };

        log::info!(
            "Player started ({} pool workers, {:?} dispatch, render: {}, input: {}).",
            config.pool_workers,
            config.dispatch,
            render.is_some(),
            input.is_some()
        );
        Ok(Player {
            config,
            clock,
            cancel,
            control: PlayerControl::default(),
            document,
            pool,
            timer,
            render,
            input,
            injector,
            loaded: AtomicBool::new(false),
            stopped: false,
        })
    }
}

/// Owns the timer, the pool, the workers and the document they share.
///
/// Dropping the player shuts it down.
pub struct Player {
    config: PlayerConfig,
    clock: Clock,
    cancel: CancelToken,
    control: PlayerControl,
    document: Arc<Document>,
    pool: Arc<ThreadPool>,
    timer: TimerScheduler,
    render: Option<RenderThread>,
    input: Option<InputThread>,
    injector: Option<InputInjector>,
    loaded: AtomicBool,
    stopped: bool,
}

impl Player {
    /// Starts a player with `config` and the built-in backends.
    pub fn start(config: PlayerConfig) -> Result<Self> {
        PlayerBuilder::new().config(config).start()
    }

    // --- Scheduling ---

    /// Runs `job` once on the pool.
    pub fn add_job(&self, job: Arc<dyn Job>) {
        self.pool.add_job(job);
    }

    /// Runs `job` every `interval_ms`, first at `now + interval_ms`.
    pub fn add_tick(&self, interval_ms: u32, job: Arc<dyn Job>) {
        self.timer.add_tick(interval_ms, job);
    }

    /// Runs `job` once at `now + delay_ms`.
    pub fn add_wait(&self, delay_ms: u32, job: Arc<dyn Job>) {
        self.timer.add_wait(delay_ms, job);
    }

    /// A submit handle for the timer, usable from any thread.
    pub fn timer(&self) -> TimerHandle {
        self.timer.handle()
    }

    // --- Loading ---

    /// Starts parsing `source` into the document on the pool.
    ///
    /// When a render thread exists, playback starts as soon as the frame rate
    /// is known: a render tick is registered at the document's frame interval.
    /// Only one stream can be loaded per player.
    pub fn load(&self, source: impl Read + Send + 'static) -> Result<Arc<ParseJob>> {
        if self.stopped || self.control.is_shutting_down() {
            return Err(StrobeError::ShutDown);
        }
        if self.loaded.swap(true, Ordering::SeqCst) {
            return Err(StrobeError::Config(
                "a stream was already loaded into this player".to_string(),
            ));
        }

        let mut parse = ParseJob::new(Arc::clone(&self.document), source);
        if let Some(render) = &self.render {
            // Playback is armed from the parsing thread as soon as the frame
            // rate is known, so no pool worker waits on the header.
            let document = Arc::clone(&self.document);
            let requester = render.requester();
            let timer = self.timer.handle();
            parse = parse.on_header(move |header: &DocumentHeader| {
                let interval = frame_interval_ms(header.frame_rate);
                log::info!(
                    "Playback at {} fps ({interval} ms per frame).",
                    header.frame_rate
                );
                timer.add_tick(
                    interval,
                    Arc::new(RenderTickJob::new(Arc::clone(&document), requester.clone())),
                );
            });
        }

        let parse = Arc::new(parse);
        self.pool.add_job(parse.clone());
        Ok(parse)
    }

    // --- Accessors ---

    /// The shared document.
    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    /// The clock every deadline is measured on.
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// The configuration the player was started with.
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// The thread pool.
    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    /// Render counters, when a render thread exists.
    pub fn render_stats(&self) -> Option<RenderStats> {
        self.render.as_ref().map(RenderThread::stats)
    }

    /// Sender for the built-in input channel.
    ///
    /// `None` when input is disabled or a custom source was supplied.
    pub fn input_injector(&self) -> Option<InputInjector> {
        self.injector.clone()
    }

    /// Subscribes `listener` to input events named `name`.
    pub fn add_listener(&self, name: &str, listener: Arc<dyn EventListener>) {
        match &self.input {
            Some(input) => input.add_listener(name, listener),
            None => log::warn!("Input is disabled; listener for '{name}' ignored."),
        }
    }

    /// Dispatches a synthetic event named `name` on the calling thread.
    pub fn broadcast_event(&self, name: &str) -> usize {
        self.input
            .as_ref()
            .map_or(0, |input| input.broadcast_event(name))
    }

    // --- Lifecycle ---

    /// A cloneable handle to the shutdown and error flags.
    pub fn control(&self) -> PlayerControl {
        self.control.clone()
    }

    /// Requests shutdown. See [`PlayerControl::set_shutdown_flag`].
    pub fn set_shutdown_flag(&self) {
        self.control.set_shutdown_flag();
    }

    /// Records a fatal error and requests shutdown.
    pub fn fail(&self, reason: impl Into<String>) {
        self.control.fail(reason);
    }

    /// `true` once shutdown was requested.
    pub fn is_shutting_down(&self) -> bool {
        self.control.is_shutting_down()
    }

    /// Blocks until shutdown is requested. See [`PlayerControl::wait`].
    pub fn wait(&self) -> Result<()> {
        self.control.wait()
    }

    /// Stops every thread, in dependency order.
    ///
    /// The cancel token fires first, then the timer stops so nothing new is
    /// dispatched, then the pool aborts and joins its jobs, then input and
    /// render stop. Blocked document readers are released last. Idempotent.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let started = Instant::now();
        log::info!("Player shutting down.");

        self.control.set_shutdown_flag();
        self.cancel.cancel();
        self.timer.shutdown();
        self.pool.shutdown();
        if let Some(input) = self.input.as_mut() {
            input.stop();
        }
        if let Some(render) = self.render.as_mut() {
            render.stop();
        }
        self.document.mark_finished();

        log::info!("Player stopped in {} ms.", started.elapsed().as_millis());
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
    }
}
