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

//! Reader and writer for the uncompressed tag container.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! "FWS" | version: u8 | file_length: u32
//! frame_width: u16 | frame_height: u16 | frame_rate: u16 (8.8 fixed) | frame_count: u16
//! tag*  where tag = (code << 6 | len): u16 [len == 0x3f => length: u32] body
//! ```
//!
//! Tag bodies are not interpreted beyond what is needed to route them: the
//! end and show-frame markers, the background colour, and the character id
//! at the start of definition tags.

use crate::document::{Definition, DocumentHeader, FrameItem, FrameSize, Rgb};
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use strobe_core::{Result, StrobeError};

/// Signature of an uncompressed stream.
pub const SIGNATURE: [u8; 3] = *b"FWS";
/// Size of the fixed header in bytes.
pub const HEADER_LEN: u64 = 16;
/// Tag bodies larger than this are rejected as corrupt.
pub const MAX_TAG_LEN: u32 = 64 * 1024 * 1024;

const SHORT_LEN_MASK: u16 = 0x3f;

/// Tag codes the reader routes on.
pub mod codes {
    /// End of the stream.
    pub const END: u16 = 0;
    /// Commits the current frame.
    pub const SHOW_FRAME: u16 = 1;
    /// Stage background colour.
    pub const SET_BACKGROUND_COLOR: u16 = 9;
    /// Tags whose body starts with a character id.
    pub const DEFINITIONS: &[u16] = &[
        2, 6, 7, 10, 11, 14, 20, 21, 22, 32, 33, 34, 35, 36, 37, 39, 46, 48, 60, 75, 83, 84, 87,
        91,
    ];

    /// `true` for tags that add to the dictionary.
    pub fn is_definition(code: u16) -> bool {
        DEFINITIONS.contains(&code)
    }
}

/// A tag record, classified by its code.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    /// End of the stream.
    End,
    /// Publish the frame built so far.
    ShowFrame,
    /// Stage background colour.
    SetBackgroundColor(Rgb),
    /// A dictionary entry.
    Definition(Definition),
    /// Anything else; goes into the current frame.
    Control(FrameItem),
}

impl Tag {
    /// Numeric tag code.
    pub fn code(&self) -> u16 {
        match self {
            Tag::End => codes::END,
            Tag::ShowFrame => codes::SHOW_FRAME,
            Tag::SetBackgroundColor(_) => codes::SET_BACKGROUND_COLOR,
            Tag::Definition(def) => def.code,
            Tag::Control(item) => item.code,
        }
    }
}

/// Pulls the header and tag records off a byte stream.
pub struct TagReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> TagReader<R> {
    /// Wraps `inner`, positioned at the start of the stream.
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(StrobeError::UnexpectedEof),
            Err(e) => Err(e.into()),
        }
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0; 2];
        self.fill(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0; 4];
        self.fill(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads the fixed header. Must be called once, before any tag.
    pub fn read_header(&mut self) -> Result<DocumentHeader> {
        let mut signature = [0; 3];
        self.fill(&mut signature)?;
        if signature != SIGNATURE {
            return Err(StrobeError::parse(
                0,
                format!("bad signature {:?}", String::from_utf8_lossy(&signature)),
            ));
        }
        let mut version = [0; 1];
        self.fill(&mut version)?;
        let file_length = self.read_u32()?;
        let width = self.read_u16()?;
        let height = self.read_u16()?;
        let rate = self.read_u16()?;
        let frame_count = self.read_u16()?;

        Ok(DocumentHeader {
            version: version[0],
            file_length,
            frame_size: FrameSize { width, height },
            frame_rate: f32::from(rate) / 256.0,
            frame_count,
        })
    }

    /// Reads the next tag.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a tag boundary
    /// without an end tag. A stream cut inside a tag is
    /// [`StrobeError::UnexpectedEof`].
    pub fn next_tag(&mut self) -> Result<Option<Tag>> {
        let start = self.offset;
        let mut first = [0; 1];
        match self.inner.read(&mut first) {
            Ok(0) => return Ok(None),
            Ok(_) => self.offset += 1,
            Err(e) if e.kind() == ErrorKind::Interrupted => return self.next_tag(),
            Err(e) => return Err(e.into()),
        }
        let mut second = [0; 1];
        self.fill(&mut second)?;
        let record = u16::from_le_bytes([first[0], second[0]]);

        let code = record >> 6;
        let short_len = record & SHORT_LEN_MASK;
        let len = if short_len == SHORT_LEN_MASK {
            self.read_u32()?
        } else {
            u32::from(short_len)
        };
        if len > MAX_TAG_LEN {
            return Err(StrobeError::parse(
                start,
                format!("tag {code} claims {len} bytes"),
            ));
        }

        let mut body = vec![0; len as usize];
        self.fill(&mut body)?;
        classify(code, body, start).map(Some)
    }
}

fn classify(code: u16, body: Vec<u8>, offset: u64) -> Result<Tag> {
    match code {
        codes::END => Ok(Tag::End),
        codes::SHOW_FRAME => Ok(Tag::ShowFrame),
        codes::SET_BACKGROUND_COLOR => match body.get(..3) {
            Some(&[r, g, b]) => Ok(Tag::SetBackgroundColor(Rgb::new(r, g, b))),
            _ => Err(StrobeError::parse(
                offset,
                "background colour needs 3 bytes",
            )),
        },
        code if codes::is_definition(code) => {
            let id = match body.get(..2) {
                Some(&[lo, hi]) => u16::from_le_bytes([lo, hi]),
                _ => {
                    return Err(StrobeError::parse(
                        offset,
                        format!("definition tag {code} has no character id"),
                    ))
                }
            };
            Ok(Tag::Definition(Definition {
                id,
                code,
                payload: Arc::from(body),
            }))
        }
        code => Ok(Tag::Control(FrameItem {
            code,
            payload: Arc::from(body),
        })),
    }
}

/// Writes streams [`TagReader`] understands.
pub struct TagWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> TagWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Writes the fixed header. The frame rate is rounded to 8.8 fixed point.
    pub fn write_header(&mut self, header: &DocumentHeader) -> io::Result<()> {
        let rate = (header.frame_rate * 256.0).round().clamp(0.0, f32::from(u16::MAX)) as u16;
        self.put(&SIGNATURE)?;
        self.put(&[header.version])?;
        self.put(&header.file_length.to_le_bytes())?;
        self.put(&header.frame_size.width.to_le_bytes())?;
        self.put(&header.frame_size.height.to_le_bytes())?;
        self.put(&rate.to_le_bytes())?;
        self.put(&header.frame_count.to_le_bytes())
    }

    /// Writes one tag record, choosing the short form when the body fits.
    pub fn write_tag(&mut self, code: u16, body: &[u8]) -> io::Result<()> {
        if code > 0x3ff {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("tag code {code} does not fit in 10 bits"),
            ));
        }
        let len = u32::try_from(body.len())
            .ok()
            .filter(|len| *len <= MAX_TAG_LEN)
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "tag body too large"))?;
        if len < u32::from(SHORT_LEN_MASK) {
            self.put(&((code << 6) | len as u16).to_le_bytes())?;
        } else {
            self.put(&((code << 6) | SHORT_LEN_MASK).to_le_bytes())?;
            self.put(&len.to_le_bytes())?;
        }
        self.put(body)
    }

    /// Writes a tag from its classified form.
    pub fn write(&mut self, tag: &Tag) -> io::Result<()> {
        match tag {
            Tag::End | Tag::ShowFrame => self.write_tag(tag.code(), &[]),
            Tag::SetBackgroundColor(c) => self.write_tag(tag.code(), &[c.r, c.g, c.b]),
            Tag::Definition(def) => self.write_tag(def.code, &def.payload),
            Tag::Control(item) => self.write_tag(item.code, &item.payload),
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Encodes a complete in-memory stream, patching the declared file length.
pub fn encode_stream(header: &DocumentHeader, tags: &[Tag]) -> io::Result<Vec<u8>> {
    let mut writer = TagWriter::new(Vec::new());
    writer.write_header(header)?;
    for tag in tags {
        writer.write(tag)?;
    }
    let mut bytes = writer.finish()?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "stream too large"))?;
    bytes[4..8].copy_from_slice(&len.to_le_bytes());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> DocumentHeader {
        DocumentHeader {
            version: 9,
            file_length: 0,
            frame_size: FrameSize {
                width: 320,
                height: 240,
            },
            frame_rate: 29.97,
            frame_count: 2,
        }
    }

    fn reader(bytes: &[u8]) -> TagReader<&[u8]> {
        TagReader::new(bytes)
    }

    #[test]
    fn header_layout_is_fixed() {
        let bytes = encode_stream(&header(), &[Tag::End]).unwrap();
        assert_eq!(&bytes[..3], b"FWS");
        assert_eq!(bytes[3], 9);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 18);
        // 29.97 in 8.8 fixed point.
        assert_eq!(u16::from_le_bytes([bytes[12], bytes[13]]), 7672);

        let mut reader = reader(&bytes);
        let parsed = reader.read_header().unwrap();
        assert_eq!(reader.offset(), HEADER_LEN);
        assert_eq!(parsed.frame_size, header().frame_size);
        assert_eq!(parsed.file_length, 18);
        assert!((parsed.frame_rate - 29.97).abs() < 0.01);
    }

    #[test]
    fn bad_signature_is_a_parse_error() {
        let mut bytes = encode_stream(&header(), &[]).unwrap();
        bytes[0] = b'C';
        let err = reader(&bytes).read_header().unwrap_err();
        assert!(matches!(err, StrobeError::Parse { offset: 0, .. }));
    }

    #[test]
    fn short_and_long_records() {
        let long_body = vec![0xab; 100];
        let bytes = encode_stream(
            &header(),
            &[
                Tag::Control(FrameItem {
                    code: 26,
                    payload: Arc::from(vec![1, 2, 3]),
                }),
                Tag::Control(FrameItem {
                    code: 26,
                    payload: Arc::from(long_body.clone()),
                }),
            ],
        )
        .unwrap();
        // Short record: 2-byte header; long record: 2 + 4.
        assert_eq!(bytes.len() as u64, HEADER_LEN + 2 + 3 + 6 + 100);

        let mut reader = reader(&bytes);
        reader.read_header().unwrap();
        match reader.next_tag().unwrap() {
            Some(Tag::Control(item)) => assert_eq!(&item.payload[..], &[1, 2, 3]),
            other => panic!("unexpected {other:?}"),
        }
        match reader.next_tag().unwrap() {
            Some(Tag::Control(item)) => assert_eq!(&item.payload[..], &long_body[..]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(reader.next_tag().unwrap(), None);
    }

    #[test]
    fn body_of_exactly_63_bytes_uses_long_form() {
        let mut writer = TagWriter::new(Vec::new());
        writer.write_tag(26, &[0; 63]).unwrap();
        assert_eq!(writer.written(), 2 + 4 + 63);
    }

    #[test]
    fn routes_structural_tags() {
        let bytes = encode_stream(
            &header(),
            &[
                Tag::SetBackgroundColor(Rgb::new(1, 2, 3)),
                Tag::Definition(Definition {
                    id: 0x0102,
                    code: 2,
                    payload: Arc::from(vec![0x02, 0x01, 9, 9]),
                }),
                Tag::ShowFrame,
                Tag::End,
            ],
        )
        .unwrap();
        let mut reader = reader(&bytes);
        reader.read_header().unwrap();
        let tags: Vec<Tag> = std::iter::from_fn(|| reader.next_tag().unwrap()).collect();

        assert_eq!(tags.len(), 4);
        assert_eq!(tags[0], Tag::SetBackgroundColor(Rgb::new(1, 2, 3)));
        assert!(matches!(&tags[1], Tag::Definition(d) if d.id == 0x0102));
        assert_eq!(tags[2], Tag::ShowFrame);
        assert_eq!(tags[3], Tag::End);
    }

    #[test]
    fn truncated_tag_is_unexpected_eof() {
        let bytes = encode_stream(
            &header(),
            &[Tag::Control(FrameItem {
                code: 26,
                payload: Arc::from(vec![0; 10]),
            })],
        )
        .unwrap();
        let mut reader = reader(&bytes[..bytes.len() - 4]);
        reader.read_header().unwrap();
        assert!(matches!(reader.next_tag(), Err(StrobeError::UnexpectedEof)));
    }

    #[test]
    fn definition_without_id_is_rejected() {
        let mut writer = TagWriter::new(Vec::new());
        writer.write_tag(39, &[7]).unwrap();
        let bytes = writer.finish().unwrap();
        let err = reader(&bytes).next_tag().unwrap_err();
        assert!(matches!(err, StrobeError::Parse { offset: 0, .. }));
    }

    #[test]
    fn oversized_code_is_refused() {
        let mut writer = TagWriter::new(Vec::new());
        assert!(writer.write_tag(0x400, &[]).is_err());
    }
}
