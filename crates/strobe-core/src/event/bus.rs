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

use std::time::Duration;

/// Outcome of a bounded wait on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received<T> {
    /// An event arrived.
    Event(T),
    /// Nothing arrived before the timeout.
    Timeout,
}

/// A thread-safe, unbounded event channel generic over the event type.
#[derive(Debug)]
pub struct EventBus<T: Send + 'static> {
    sender: flume::Sender<T>,
    receiver: flume::Receiver<T>,
}

impl<T: Send + 'static> EventBus<T> {
    /// Creates a new bus with an unbounded channel.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        log::trace!("EventBus initialized.");
        Self { sender, receiver }
    }

    /// Sends an event. Returns `false` if the receiving side is gone.
    pub fn publish(&self, event: T) -> bool {
        match self.sender.send(event) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to send event: {e}. Receiver likely disconnected.");
                false
            }
        }
    }

    /// Returns a clone of the sending half, for producers on other threads.
    pub fn sender(&self) -> flume::Sender<T> {
        self.sender.clone()
    }

    /// Returns the receiving half. Only the owner of the bus should drain it.
    pub fn receiver(&self) -> &flume::Receiver<T> {
        &self.receiver
    }

    /// Waits up to `timeout` for the next event.
    ///
    /// The bus owns a sender, so the channel cannot disconnect while the bus
    /// is alive and the only outcomes are an event or a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Received<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Received::Event(event),
            Err(_) => Received::Timeout,
        }
    }

    /// Removes and returns everything currently queued.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.drain().collect()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T: Send + 'static> EventBus<T> {
    /// Wraps an existing channel pair.
    pub fn from_parts(sender: flume::Sender<T>, receiver: flume::Receiver<T>) -> Self {
        Self { sender, receiver }
    }
}

impl<T: Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
