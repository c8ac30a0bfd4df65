//! The shared parsing/formatting surface for the two streaming wire
//! formats. The request router and the stream mediator both need to split
//! a raw byte stream into logical frames, pull the content delta out of a
//! frame, and format a terminal blocked-response frame; this module is the
//! one place that knows both formats, so neither caller reimplements it.

pub mod ollama;
pub mod openai;

use bytes::{Bytes, BytesMut};
use promptgate_error::ErrorKind;

/// Which wire format a request arrived in, and therefore which format its
/// response (streaming or not) must be rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Ollama,
    OpenAi,
}

/// The result of parsing one frame: the text fragment it contributes to
/// the scannable stream (empty for keep-alives/role markers) and whether
/// it signals the natural end of the stream.
#[derive(Debug, Clone, Default)]
pub struct ContentDelta {
    pub content: String,
    pub is_end: bool,
}

impl ContentDelta {
    fn empty() -> Self {
        Self {
            content: String::new(),
            is_end: false,
        }
    }
}

/// Extracts the content delta from one already-split frame of backend
/// output, in the given wire format.
pub fn parse_content_delta(format: WireFormat, frame: &[u8]) -> ContentDelta {
    match format {
        WireFormat::Ollama => ollama::parse_content_delta(frame),
        WireFormat::OpenAi => openai::parse_content_delta(frame),
    }
}

/// Extracts the complete response text from a non-streaming response
/// body. Ollama's non-streaming shape is identical to one streaming
/// chunk with `done: true`, so it reuses `parse_content_delta`; OpenAI's
/// non-streaming shape nests content under `message` instead of `delta`.
pub fn extract_full_text(format: WireFormat, body: &[u8]) -> String {
    match format {
        WireFormat::Ollama => ollama::parse_content_delta(body).content,
        WireFormat::OpenAi => openai::parse_full_content(body),
    }
}

/// Builds the single terminal frame sent to the client when a stream is
/// blocked or fails, already including the format's end-of-stream marker.
pub fn format_blocked_frame(
    format: WireFormat,
    kind: ErrorKind,
    message: &str,
    language: &str,
    failed_scanners: &[String],
) -> Bytes {
    match format {
        WireFormat::Ollama => ollama::format_blocked_frame(kind, message, language, failed_scanners),
        WireFormat::OpenAi => openai::format_blocked_frame(kind, message, language, failed_scanners),
    }
}

/// Splits a growing byte buffer into complete, format-delimited frames,
/// leaving any trailing partial frame in place for the next call. Ollama
/// frames are newline-delimited JSON objects; OpenAI frames are
/// `data: ...\n\n` SSE blocks.
pub struct FrameSplitter {
    format: WireFormat,
    buffer: BytesMut,
}

impl FrameSplitter {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            buffer: BytesMut::new(),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pops one complete frame if the buffer holds one, delimiter stripped.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let delimiter: &[u8] = match self.format {
            WireFormat::Ollama => b"\n",
            WireFormat::OpenAi => b"\n\n",
        };
        let pos = find_subslice(&self.buffer, delimiter)?;
        let frame = self.buffer.split_to(pos);
        let _ = self.buffer.split_to(delimiter.len());
        Some(frame.freeze())
    }

    /// Drains and returns any bytes left over once the backend closes the
    /// connection without a trailing delimiter.
    pub fn take_remainder(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer).freeze())
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
