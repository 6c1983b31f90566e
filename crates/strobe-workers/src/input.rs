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

//! Input thread and named event listeners.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use strobe_core::event::{EventBus, Received};
use strobe_core::dispatch::panic_message;
use strobe_core::{CancelToken, Result, StrobeError};

/// A user input event.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// A mouse button went down at stage coordinates.
    MouseDown {
        /// X coordinate.
        x: f32,
        /// Y coordinate.
        y: f32,
    },
    /// A mouse button was released.
    MouseUp {
        /// X coordinate.
        x: f32,
        /// Y coordinate.
        y: f32,
    },
    /// The pointer moved.
    MouseMove {
        /// X coordinate.
        x: f32,
        /// Y coordinate.
        y: f32,
    },
    /// A key went down.
    KeyDown(String),
    /// A key was released.
    KeyUp(String),
    /// An application-defined event, dispatched under its own name.
    Custom(String),
}

impl InputEvent {
    /// The name listeners subscribe to.
    pub fn name(&self) -> &str {
        match self {
            InputEvent::MouseDown { .. } => "mouseDown",
            InputEvent::MouseUp { .. } => "mouseUp",
            InputEvent::MouseMove { .. } => "mouseMove",
            InputEvent::KeyDown(_) => "keyDown",
            InputEvent::KeyUp(_) => "keyUp",
            InputEvent::Custom(name) => name,
        }
    }
}

/// Receives input events it subscribed to.
pub trait EventListener: Send + Sync {
    /// Handles one event. Runs on the input thread, or on the caller of
    /// [`InputThread::broadcast_event`].
    fn handle_event(&self, event: &InputEvent);
}

impl<F> EventListener for F
where
    F: Fn(&InputEvent) + Send + Sync,
{
    fn handle_event(&self, event: &InputEvent) {
        self(event)
    }
}

/// Where input events come from.
pub trait InputSource: Send {
    /// Waits up to `timeout` for the next event.
    fn poll(&mut self, timeout: Duration) -> Option<InputEvent>;
}

/// An [`InputSource`] fed through an in-process channel.
#[derive(Debug, Default)]
pub struct ChannelInputSource {
    bus: EventBus<InputEvent>,
}

impl ChannelInputSource {
    /// Creates the source.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender that pushes events into this source from any thread.
    pub fn injector(&self) -> InputInjector {
        InputInjector {
            sender: self.bus.sender(),
        }
    }
}

impl InputSource for ChannelInputSource {
    fn poll(&mut self, timeout: Duration) -> Option<InputEvent> {
        match self.bus.recv_timeout(timeout) {
            Received::Event(event) => Some(event),
            Received::Timeout => None,
        }
    }
}

/// Cloneable sending side of a [`ChannelInputSource`].
#[derive(Debug, Clone)]
pub struct InputInjector {
    sender: flume::Sender<InputEvent>,
}

impl InputInjector {
    /// Queues `event`. Returns `false` if the source was dropped.
    pub fn send(&self, event: InputEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Listeners keyed by event name.
#[derive(Default)]
struct ListenerMap {
    by_name: RwLock<HashMap<String, Vec<Arc<dyn EventListener>>>>,
}

impl ListenerMap {
    fn add(&self, name: &str, listener: Arc<dyn EventListener>) {
        self.by_name
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .push(listener);
    }

    fn remove(&self, name: &str) -> usize {
        self.by_name
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map_or(0, |listeners| listeners.len())
    }

    fn count(&self, name: &str) -> usize {
        self.by_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Calls every listener for the event's name, outside the lock.
    fn dispatch(&self, event: &InputEvent) -> usize {
        let listeners: Vec<Arc<dyn EventListener>> = self
            .by_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event.name())
            .cloned()
            .unwrap_or_default();
        for listener in &listeners {
            // A panicking listener loses this event only.
            if let Err(payload) =
                panic::catch_unwind(AssertUnwindSafe(|| listener.handle_event(event)))
            {
                log::error!(
                    "Listener for '{}' panicked: {}",
                    event.name(),
                    panic_message(payload.as_ref())
                );
            }
        }
        listeners.len()
    }
}

/// Input thread settings.
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// OS thread name.
    pub thread_name: String,
    /// Longest time the thread blocks in [`InputSource::poll`] before
    /// re-checking whether it should stop.
    pub poll_interval: Duration,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            thread_name: "strobe-input".to_string(),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Owns the input thread and the listener registry.
pub struct InputThread {
    listeners: Arc<ListenerMap>,
    running: Arc<AtomicBool>,
    dispatched: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl InputThread {
    /// Spawns the thread pulling events from `source`.
    pub fn start(
        mut source: Box<dyn InputSource>,
        config: InputConfig,
        cancel: CancelToken,
    ) -> Result<Self> {
        let listeners = Arc::new(ListenerMap::default());
        let running = Arc::new(AtomicBool::new(true));
        let dispatched = Arc::new(AtomicU64::new(0));

        let handle = {
            let listeners = Arc::clone(&listeners);
            let running = Arc::clone(&running);
            let dispatched = Arc::clone(&dispatched);
            let poll_interval = config.poll_interval;
            thread::Builder::new()
                .name(config.thread_name.clone())
                .spawn(move || {
                    log::info!("Input thread started.");
                    while running.load(Ordering::SeqCst) && !cancel.is_cancelled() {
                        let Some(event) = source.poll(poll_interval) else {
                            continue;
                        };
                        let handled = listeners.dispatch(&event);
                        dispatched.fetch_add(1, Ordering::Relaxed);
                        log::trace!("Input '{}' handled by {handled} listeners.", event.name());
                    }
                    log::info!("Input thread stopped.");
                })
                .map_err(|source| StrobeError::Spawn {
                    name: config.thread_name,
                    source,
                })?
        };

        Ok(Self {
            listeners,
            running,
            dispatched,
            handle: Some(handle),
        })
    }

    /// Subscribes `listener` to events named `name`.
    pub fn add_listener(&self, name: &str, listener: Arc<dyn EventListener>) {
        self.listeners.add(name, listener);
    }

    /// Unsubscribes every listener of `name`; returns how many were removed.
    pub fn remove_listeners(&self, name: &str) -> usize {
        self.listeners.remove(name)
    }

    /// Number of listeners subscribed to `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.count(name)
    }

    /// Dispatches a [`InputEvent::Custom`] named `name` on the calling thread.
    ///
    /// Returns the number of listeners called.
    pub fn broadcast_event(&self, name: &str) -> usize {
        self.listeners.dispatch(&InputEvent::Custom(name.to_string()))
    }

    /// Events pulled from the source and dispatched so far.
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// `true` while the thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops and joins the thread; takes at most one poll interval.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Input thread panicked.");
            }
        }
    }
}

impl Drop for InputThread {
    fn drop(&mut self) {
        self.stop();
    }
}
