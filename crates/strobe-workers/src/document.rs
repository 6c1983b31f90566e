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

//! The shared root object.
//!
//! The parse job writes into a [`Document`] while the render thread reads it.
//! Header fields start out unknown and become valid once parsed; readers that
//! need them block until then. Frames are built in a private pending slot and
//! only published, as immutable [`Frame`] snapshots, by [`Document::commit_frame`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use strobe_core::CancelToken;

/// How often header waiters re-check their cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Stage size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSize {
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
}

/// An opaque RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
}

impl Rgb {
    /// Builds a colour from its components.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Fixed fields read from the start of a stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentHeader {
    /// Container format version.
    pub version: u8,
    /// Declared total stream length in bytes.
    pub file_length: u32,
    /// Stage size.
    pub frame_size: FrameSize,
    /// Frames per second.
    pub frame_rate: f32,
    /// Declared number of frames.
    pub frame_count: u16,
}

/// One display-list entry; the payload is carried unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameItem {
    /// Tag code the entry came from.
    pub code: u16,
    /// Raw tag body.
    pub payload: Arc<[u8]>,
}

/// A committed frame. Never mutated once published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    index: usize,
    items: Vec<FrameItem>,
}

impl Frame {
    /// Zero-based position in the document.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Display-list entries in stream order.
    pub fn items(&self) -> &[FrameItem] {
        &self.items
    }
}

/// A dictionary entry keyed by character id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// Character id.
    pub id: u16,
    /// Tag code that defined it.
    pub code: u16,
    /// Raw tag body, id included.
    pub payload: Arc<[u8]>,
}

#[derive(Debug, Default)]
struct HeaderState {
    header: Option<DocumentHeader>,
    finished: bool,
}

#[derive(Debug, Default)]
struct FrameState {
    committed: Vec<Arc<Frame>>,
    pending: Vec<FrameItem>,
    /// No more frames will be committed.
    complete: bool,
    finished: bool,
}

/// The document being played.
#[derive(Debug, Default)]
pub struct Document {
    header: Mutex<HeaderState>,
    header_ready: Condvar,
    frames: Mutex<FrameState>,
    new_frame: Condvar,
    dictionary: RwLock<HashMap<u16, Definition>>,
    background: Mutex<Rgb>,
    playhead: AtomicUsize,
}

// Document state is only replaced wholesale under its locks, so a writer that
// panicked mid-update cannot leave it torn. Readers recover the guard.
fn recover<T>(result: Result<T, PoisonError<T>>) -> T {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl Document {
    /// An empty document with no header yet.
    pub fn new() -> Self {
        Self::default()
    }

    fn header_state(&self) -> MutexGuard<'_, HeaderState> {
        recover(self.header.lock())
    }

    fn frame_state(&self) -> MutexGuard<'_, FrameState> {
        recover(self.frames.lock())
    }

    // --- Header ---

    /// Publishes the parsed header and wakes every header waiter.
    pub fn set_header(&self, header: DocumentHeader) {
        log::debug!(
            "Document header: version {}, {}x{} @ {} fps, {} frames.",
            header.version,
            header.frame_size.width,
            header.frame_size.height,
            header.frame_rate,
            header.frame_count
        );
        self.header_state().header = Some(header);
        self.header_ready.notify_all();
    }

    /// The header, once parsed.
    pub fn header(&self) -> Option<DocumentHeader> {
        self.header_state().header
    }

    /// Stage size, once parsed.
    pub fn frame_size(&self) -> Option<FrameSize> {
        self.header().map(|h| h.frame_size)
    }

    /// Frames per second, once parsed.
    pub fn frame_rate(&self) -> Option<f32> {
        self.header().map(|h| h.frame_rate)
    }

    /// Blocks until the header is known.
    ///
    /// Returns `None` if `cancel` fires or the document is finished without
    /// ever receiving a header.
    pub fn wait_header(&self, cancel: &CancelToken) -> Option<DocumentHeader> {
        let mut state = self.header_state();
        loop {
            if let Some(header) = state.header {
                return Some(header);
            }
            if state.finished || cancel.is_cancelled() {
                return None;
            }
            state = recover(self.header_ready.wait_timeout(state, CANCEL_POLL)).0;
        }
    }

    /// Blocks until the frame rate is known. See [`Document::wait_header`].
    pub fn wait_frame_rate(&self, cancel: &CancelToken) -> Option<f32> {
        self.wait_header(cancel).map(|h| h.frame_rate)
    }

    /// Blocks until the stage size is known. See [`Document::wait_header`].
    pub fn wait_frame_size(&self, cancel: &CancelToken) -> Option<FrameSize> {
        self.wait_header(cancel).map(|h| h.frame_size)
    }

    // --- Dictionary & background ---

    /// Registers a definition, replacing any earlier one with the same id.
    pub fn add_definition(&self, definition: Definition) {
        let id = definition.id;
        if recover(self.dictionary.write())
            .insert(id, definition)
            .is_some()
        {
            log::warn!("Character id {id} defined twice; keeping the later definition.");
        }
    }

    /// Looks up a definition by character id.
    pub fn definition(&self, id: u16) -> Option<Definition> {
        recover(self.dictionary.read()).get(&id).cloned()
    }

    /// Number of registered definitions.
    pub fn definition_count(&self) -> usize {
        recover(self.dictionary.read()).len()
    }

    /// Sets the stage background colour.
    pub fn set_background(&self, color: Rgb) {
        *recover(self.background.lock()) = color;
    }

    /// The stage background colour.
    pub fn background(&self) -> Rgb {
        *recover(self.background.lock())
    }

    // --- Frames ---

    /// Appends an entry to the frame being built.
    ///
    /// Ignored once the document was committed with `another == false`.
    pub fn add_to_frame(&self, item: FrameItem) {
        let mut state = self.frame_state();
        if state.complete {
            log::warn!("Tag {} after the last frame ignored.", item.code);
            return;
        }
        state.pending.push(item);
    }

    /// Publishes the pending frame and wakes frame waiters.
    ///
    /// With `another == true` an empty pending frame is started; otherwise
    /// the document is complete and no further frames are accepted.
    /// Returns the number of committed frames.
    pub fn commit_frame(&self, another: bool) -> usize {
        let mut state = self.frame_state();
        if state.complete {
            log::warn!("Commit after the last frame ignored.");
            return state.committed.len();
        }
        let index = state.committed.len();
        let items = std::mem::take(&mut state.pending);
        state.committed.push(Arc::new(Frame { index, items }));
        state.complete = !another;
        let count = state.committed.len();
        drop(state);

        log::trace!("Committed frame {index}.");
        self.new_frame.notify_all();
        count
    }

    /// Declares that no further frames follow, without committing one.
    pub fn seal(&self) {
        self.frame_state().complete = true;
    }

    /// Discards the frame being built. Returns how many entries were dropped.
    pub fn revert_frame(&self) -> usize {
        let dropped = std::mem::take(&mut self.frame_state().pending).len();
        if dropped > 0 {
            log::debug!("Reverted pending frame with {dropped} entries.");
        }
        dropped
    }

    /// Entries in the frame being built.
    pub fn pending_items(&self) -> usize {
        self.frame_state().pending.len()
    }

    /// Number of committed frames.
    pub fn committed_frames(&self) -> usize {
        self.frame_state().committed.len()
    }

    /// A committed frame by index.
    pub fn frame(&self, index: usize) -> Option<Arc<Frame>> {
        self.frame_state().committed.get(index).cloned()
    }

    /// The most recently committed frame.
    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.frame_state().committed.last().cloned()
    }

    /// Blocks until at least `min` frames are committed.
    ///
    /// Returns `false` on timeout, or early if the document is finished with
    /// fewer frames.
    pub fn wait_for_frame(&self, min: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.frame_state();
        while state.committed.len() < min && !state.finished {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = recover(self.new_frame.wait_timeout(state, remaining)).0;
        }
        state.committed.len() >= min
    }

    // --- Playback ---

    /// Frame index the player is on.
    pub fn playhead(&self) -> usize {
        self.playhead.load(Ordering::Acquire)
    }

    /// The committed frame under the playhead.
    pub fn frame_at_playhead(&self) -> Option<Arc<Frame>> {
        self.frame(self.playhead())
    }

    /// Moves the playhead one frame forward and returns its new position.
    ///
    /// Holds on the last committed frame while more are still coming, and
    /// loops back to the first frame once the document is complete.
    pub fn advance_playhead(&self) -> usize {
        let state = self.frame_state();
        let committed = state.committed.len();
        let current = self.playhead.load(Ordering::Acquire);
        let next = if current + 1 < committed {
            current + 1
        } else if state.complete && committed > 0 {
            0
        } else {
            current
        };
        self.playhead.store(next, Ordering::Release);
        next
    }

    // --- Lifecycle ---

    /// Marks the stream as fully consumed, successfully or not.
    ///
    /// Releases everyone blocked in a header or frame wait.
    pub fn mark_finished(&self) {
        self.header_state().finished = true;
        self.header_ready.notify_all();
        self.frame_state().finished = true;
        self.new_frame.notify_all();
    }

    /// `true` once [`Document::mark_finished`] was called.
    pub fn is_finished(&self) -> bool {
        self.frame_state().finished
    }

    /// `true` once the last frame was committed.
    pub fn is_complete(&self) -> bool {
        self.frame_state().complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn header(rate: f32) -> DocumentHeader {
        DocumentHeader {
            version: 10,
            file_length: 0,
            frame_size: FrameSize {
                width: 550,
                height: 400,
            },
            frame_rate: rate,
            frame_count: 3,
        }
    }

    fn item(code: u16) -> FrameItem {
        FrameItem {
            code,
            payload: Arc::from(vec![code as u8]),
        }
    }

    #[test]
    fn header_fields_unknown_until_parsed() {
        let doc = Document::new();
        assert_eq!(doc.frame_rate(), None);
        doc.set_header(header(24.0));
        assert_eq!(doc.frame_rate(), Some(24.0));
        assert_eq!(doc.frame_size().map(|s| s.width), Some(550));
    }

    #[test]
    fn frame_rate_waiter_wakes_on_header() {
        let doc = Arc::new(Document::new());
        let reader = {
            let doc = Arc::clone(&doc);
            thread::spawn(move || doc.wait_frame_rate(&CancelToken::new()))
        };
        thread::sleep(Duration::from_millis(20));
        doc.set_header(header(12.5));
        assert_eq!(reader.join().unwrap(), Some(12.5));
    }

    #[test]
    fn header_wait_gives_up_on_cancel_and_finish() {
        let doc = Document::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(doc.wait_frame_size(&cancel), None);

        let doc = Document::new();
        doc.mark_finished();
        assert_eq!(doc.wait_header(&CancelToken::new()), None);
    }

    #[test]
    fn committed_frames_are_immutable_snapshots() {
        let doc = Document::new();
        doc.add_to_frame(item(26));
        doc.add_to_frame(item(4));
        assert_eq!(doc.commit_frame(true), 1);

        let first = doc.current_frame().unwrap();
        doc.add_to_frame(item(28));
        assert_eq!(first.items().len(), 2, "pending items never leak into a committed frame");
        assert_eq!(doc.pending_items(), 1);

        doc.commit_frame(true);
        assert_eq!(doc.current_frame().unwrap().index(), 1);
        assert_eq!(doc.frame(0).unwrap(), first);
    }

    #[test]
    fn revert_discards_only_pending_entries() {
        let doc = Document::new();
        doc.add_to_frame(item(1));
        doc.commit_frame(true);
        doc.add_to_frame(item(2));
        doc.add_to_frame(item(3));
        assert_eq!(doc.revert_frame(), 2);
        assert_eq!(doc.committed_frames(), 1);
        assert_eq!(doc.pending_items(), 0);
    }

    #[test]
    fn final_commit_closes_the_document() {
        let doc = Document::new();
        doc.commit_frame(false);
        assert!(doc.is_complete());
        doc.add_to_frame(item(5));
        assert_eq!(doc.pending_items(), 0);
        assert_eq!(doc.commit_frame(true), 1);
    }

    #[test]
    fn frame_waiter_wakes_on_commit() {
        let doc = Arc::new(Document::new());
        let reader = {
            let doc = Arc::clone(&doc);
            thread::spawn(move || doc.wait_for_frame(2, Duration::from_secs(2)))
        };
        doc.commit_frame(true);
        thread::sleep(Duration::from_millis(10));
        doc.commit_frame(true);
        assert!(reader.join().unwrap());
        assert!(!doc.wait_for_frame(3, Duration::from_millis(10)));
    }

    #[test]
    fn dictionary_keeps_latest_definition() {
        let doc = Document::new();
        for code in [2, 39] {
            doc.add_definition(Definition {
                id: 7,
                code,
                payload: Arc::from(vec![7, 0]),
            });
        }
        assert_eq!(doc.definition_count(), 1);
        assert_eq!(doc.definition(7).map(|d| d.code), Some(39));
        assert!(doc.definition(8).is_none());
    }

    #[test]
    fn playhead_holds_while_loading_and_loops_when_complete() {
        let doc = Document::new();
        assert_eq!(doc.advance_playhead(), 0);
        doc.commit_frame(true);
        doc.commit_frame(true);
        assert_eq!(doc.advance_playhead(), 1);
        assert_eq!(doc.advance_playhead(), 1, "waits for the next frame");
        doc.commit_frame(false);
        assert_eq!(doc.advance_playhead(), 2);
        assert_eq!(doc.advance_playhead(), 0);
        assert_eq!(doc.frame_at_playhead().unwrap().index(), 0);
    }

    #[test]
    fn sealed_document_loops_without_an_extra_frame() {
        let doc = Document::new();
        doc.commit_frame(true);
        doc.commit_frame(true);
        doc.seal();
        assert_eq!(doc.committed_frames(), 2);
        assert_eq!(doc.advance_playhead(), 1);
        assert_eq!(doc.advance_playhead(), 0);
    }
}
