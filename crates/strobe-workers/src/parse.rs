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

//! The job that fills a [`Document`] from a tag stream.

use crate::codec::{Tag, TagReader};
use crate::document::{Document, DocumentHeader};
use crate::signal::Completion;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use strobe_core::{Job, JobContext, Result, Stopwatch, StrobeError};

/// What a finished parse produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseSummary {
    /// Container version from the header.
    pub version: u8,
    /// Tag records read, end tag included.
    pub tags: usize,
    /// Frames committed to the document.
    pub frames: usize,
    /// Dictionary entries added.
    pub definitions: usize,
    /// Bytes consumed from the stream.
    pub bytes_read: u64,
    /// `true` if the stream ended with an end tag rather than plain EOF.
    pub saw_end_tag: bool,
}

type Outcome = std::result::Result<ParseSummary, Arc<StrobeError>>;
type HeaderHook = Box<dyn Fn(&DocumentHeader) + Send + Sync>;

/// Parses one stream into a shared document.
///
/// Run it once, on the pool or any other thread. Progress is visible through
/// the document as frames are committed; [`ParseJob::wait`] reports the end
/// result. [`Job::abort`] and the context's cancel token are checked between
/// tags; a read that blocks is not interrupted.
pub struct ParseJob {
    document: Arc<Document>,
    source: Mutex<Option<Box<dyn Read + Send>>>,
    aborted: AtomicBool,
    done: Completion<Outcome>,
    on_header: Option<HeaderHook>,
}

impl ParseJob {
    /// Creates a job reading from `source` into `document`.
    pub fn new(document: Arc<Document>, source: impl Read + Send + 'static) -> Self {
        Self {
            document,
            source: Mutex::new(Some(Box::new(source))),
            aborted: AtomicBool::new(false),
            done: Completion::new(),
            on_header: None,
        }
    }

    /// Calls `hook` on the parsing thread once the header has been read and
    /// stored in the document, before any tag is parsed.
    ///
    /// Not called if the header itself is unreadable.
    pub fn on_header(mut self, hook: impl Fn(&DocumentHeader) + Send + Sync + 'static) -> Self {
        self.on_header = Some(Box::new(hook));
        self
    }

    /// The document being filled.
    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    /// Blocks until the parse has finished.
    pub fn wait(&self) -> std::result::Result<ParseSummary, Arc<StrobeError>> {
        self.done.wait()
    }

    /// Like [`ParseJob::wait`], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        self.done.wait_timeout(timeout)
    }

    /// `true` once the job has run to completion, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.done.is_complete()
    }

    fn should_stop(&self, ctx: &JobContext) -> bool {
        self.aborted.load(Ordering::SeqCst) || ctx.is_cancelled()
    }

    fn parse<R: Read>(&self, reader: &mut TagReader<R>, ctx: &JobContext) -> Result<ParseSummary> {
        let header = reader.read_header()?;
        self.document.set_header(header);
        if let Some(hook) = &self.on_header {
            hook(&header);
        }

        let mut summary = ParseSummary {
            version: header.version,
            ..ParseSummary::default()
        };
        loop {
            if self.should_stop(ctx) {
                return Err(StrobeError::Aborted);
            }
            let Some(tag) = reader.next_tag()? else {
                log::warn!(
                    "Stream ended at byte {} without an end tag.",
                    reader.offset()
                );
                break;
            };
            summary.tags += 1;
            match tag {
                Tag::End => {
                    self.document.seal();
                    summary.saw_end_tag = true;
                    break;
                }
                Tag::ShowFrame => {
                    summary.frames = self.document.commit_frame(true);
                }
                Tag::SetBackgroundColor(color) => self.document.set_background(color),
                Tag::Definition(definition) => {
                    self.document.add_definition(definition);
                    summary.definitions += 1;
                }
                Tag::Control(item) => self.document.add_to_frame(item),
            }
        }
        summary.bytes_read = reader.offset();
        Ok(summary)
    }
}

impl Job for ParseJob {
    fn execute(&self, ctx: &JobContext) {
        let source = self
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(source) = source else {
            log::warn!("Parse job executed twice; ignoring.");
            return;
        };

        let stopwatch = Stopwatch::new();
        let mut reader = TagReader::new(source);
        let result = self.parse(&mut reader, ctx);

        // An unterminated frame is never shown.
        self.document.revert_frame();
        match &result {
            Ok(summary) => log::info!(
                "Parsed {} tags into {} frames in {} ms.",
                summary.tags,
                summary.frames,
                stopwatch.elapsed_ms()
            ),
            Err(StrobeError::Aborted) => {
                log::info!("Parse aborted at byte {}.", reader.offset())
            }
            Err(e) => log::error!("Parse failed at byte {}: {e}", reader.offset()),
        }
        self.document.mark_finished();
        self.done.complete(result.map_err(Arc::new));
    }

    fn name(&self) -> &str {
        "parse"
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_stream;
    use crate::document::{Definition, DocumentHeader, FrameItem, FrameSize, Rgb};
    use std::io;
    use strobe_core::{CancelToken, Clock, JobOrigin};

    fn header() -> DocumentHeader {
        DocumentHeader {
            version: 8,
            file_length: 0,
            frame_size: FrameSize {
                width: 100,
                height: 100,
            },
            frame_rate: 30.0,
            frame_count: 2,
        }
    }

    fn place(depth: u8) -> Tag {
        Tag::Control(FrameItem {
            code: 26,
            payload: Arc::from(vec![depth]),
        })
    }

    fn ctx() -> JobContext {
        JobContext::new(JobOrigin::Worker, Clock::new(), CancelToken::new())
    }

    fn sample_stream() -> Vec<u8> {
        encode_stream(
            &header(),
            &[
                Tag::SetBackgroundColor(Rgb::new(0xff, 0, 0)),
                Tag::Definition(Definition {
                    id: 1,
                    code: 2,
                    payload: Arc::from(vec![1, 0, 0xaa]),
                }),
                place(1),
                Tag::ShowFrame,
                place(2),
                place(3),
                Tag::ShowFrame,
                Tag::End,
            ],
        )
        .unwrap()
    }

    #[test]
    fn fills_the_document() {
        let doc = Arc::new(Document::new());
        let job = ParseJob::new(Arc::clone(&doc), io::Cursor::new(sample_stream()));
        job.execute(&ctx());

        let summary = job.wait().unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.definitions, 1);
        assert_eq!(summary.tags, 8);
        assert!(summary.saw_end_tag);
        assert_eq!(summary.bytes_read, sample_stream().len() as u64);

        assert_eq!(doc.frame_rate(), Some(30.0));
        assert_eq!(doc.background(), Rgb::new(0xff, 0, 0));
        assert_eq!(doc.frame(0).unwrap().items().len(), 1);
        assert_eq!(doc.frame(1).unwrap().items().len(), 2);
        assert!(doc.definition(1).is_some());
        assert!(doc.is_finished());
        assert!(doc.is_complete());
    }

    #[test]
    fn trailing_partial_frame_is_reverted() {
        let bytes = encode_stream(&header(), &[place(1), Tag::ShowFrame, place(2)]).unwrap();
        let doc = Arc::new(Document::new());
        let job = ParseJob::new(Arc::clone(&doc), io::Cursor::new(bytes));
        job.execute(&ctx());

        let summary = job.wait().unwrap();
        assert!(!summary.saw_end_tag);
        assert_eq!(doc.committed_frames(), 1);
        assert_eq!(doc.pending_items(), 0);
    }

    #[test]
    fn corrupt_stream_reports_error_and_keeps_committed_frames() {
        let mut bytes = encode_stream(&header(), &[place(1), Tag::ShowFrame, place(2)]).unwrap();
        bytes.truncate(bytes.len() - 1);
        let doc = Arc::new(Document::new());
        let job = ParseJob::new(Arc::clone(&doc), io::Cursor::new(bytes));
        job.execute(&ctx());

        let err = job.wait().unwrap_err();
        assert!(matches!(*err, StrobeError::UnexpectedEof));
        assert_eq!(doc.committed_frames(), 1);
        assert!(doc.is_finished());
    }

    #[test]
    fn aborted_job_stops_between_tags() {
        let doc = Arc::new(Document::new());
        let job = ParseJob::new(Arc::clone(&doc), io::Cursor::new(sample_stream()));
        job.abort();
        job.execute(&ctx());
        assert!(matches!(*job.wait().unwrap_err(), StrobeError::Aborted));
        assert_eq!(doc.committed_frames(), 0);
    }

    #[test]
    fn second_execution_is_ignored() {
        let doc = Arc::new(Document::new());
        let job = ParseJob::new(Arc::clone(&doc), io::Cursor::new(sample_stream()));
        job.execute(&ctx());
        job.execute(&ctx());
        assert_eq!(doc.committed_frames(), 2);
        assert!(job.is_finished());
    }

    #[test]
    fn header_hook_sees_header_before_first_frame() {
        let doc = Arc::new(Document::new());
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let observed = Arc::clone(&doc);
        let job = ParseJob::new(Arc::clone(&doc), io::Cursor::new(sample_stream())).on_header(
            move |header: &DocumentHeader| {
                *sink.lock().unwrap() = Some((header.frame_rate, observed.committed_frames()));
            },
        );
        job.execute(&ctx());

        assert_eq!(*seen.lock().unwrap(), Some((30.0, 0)));
        assert_eq!(doc.committed_frames(), 2);
    }

    #[test]
    fn header_hook_skipped_when_header_is_unreadable() {
        let doc = Arc::new(Document::new());
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let job = ParseJob::new(Arc::clone(&doc), io::Cursor::new(b"FWS".to_vec()))
            .on_header(move |_: &DocumentHeader| flag.store(true, Ordering::SeqCst));
        job.execute(&ctx());

        assert!(job.wait().is_err());
        assert!(!called.load(Ordering::SeqCst));
    }
}
