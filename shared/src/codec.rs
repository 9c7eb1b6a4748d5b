//! JSON message codec and framing
//!
//! Two framings are supported:
//! ```text
//! PerRead:           [ one transport read ] == [ one JSON message ]
//! NewlineDelimited:  [ JSON message ]\n[ JSON message ]\n ...
//! ```
//! `PerRead` matches what existing companions expect but breaks when a
//! stream coalesces or splits writes. `NewlineDelimited` survives both.
//! Companions terminate every message with `\n`, which is plain JSON
//! whitespace under `PerRead`, so they work against either mode.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;
use thiserror::Error;

use crate::defaults::MAX_CHUNK_LEN;
use crate::CompanionMessage;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Message has no string `type` field")]
    MissingType,

    #[error("Invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Frame too large: {len} bytes (max: {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("JSON encode error: {0}")]
    EncodeError(#[source] serde_json::Error),
}

/// How message boundaries are recovered from the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Every non-empty read is exactly one message
    #[default]
    PerRead,
    /// Messages are separated by `\n`
    NewlineDelimited,
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "per-read" | "perread" | "chunk" => Ok(Framing::PerRead),
            "newline" | "ndjson" | "newline-delimited" => Ok(Framing::NewlineDelimited),
            other => Err(format!("Invalid framing: {}", other)),
        }
    }
}

/// Decode one complete message
pub fn decode(frame: &[u8]) -> Result<CompanionMessage, CodecError> {
    let value: Value = serde_json::from_slice(frame).map_err(CodecError::InvalidJson)?;

    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => return Err(CodecError::MissingType),
    };

    serde_json::from_value(value).map_err(|source| CodecError::InvalidPayload { kind, source })
}

/// Encode a message as a newline-terminated JSON frame
pub fn encode(message: &CompanionMessage) -> Result<Bytes, CodecError> {
    let json = serde_json::to_vec(message).map_err(CodecError::EncodeError)?;

    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_slice(&json);
    buf.put_u8(b'\n');

    Ok(buf.freeze())
}

/// Per-connection decoder for streaming input
#[derive(Debug)]
pub struct MessageDecoder {
    framing: Framing,
    max_frame_len: usize,
    /// Whole reads waiting to be decoded (`PerRead`)
    pending: VecDeque<Bytes>,
    /// Partial line data being accumulated (`NewlineDelimited`)
    buffer: BytesMut,
    /// Dropping the tail of an oversized line
    discarding: bool,
}

impl MessageDecoder {
    /// Create a new decoder
    pub fn new(framing: Framing, max_frame_len: usize) -> Self {
        Self {
            framing,
            max_frame_len,
            pending: VecDeque::new(),
            buffer: BytesMut::new(),
            discarding: false,
        }
    }

    /// Add one transport read to the decoder
    pub fn extend(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        match self.framing {
            Framing::PerRead => self.pending.push_back(Bytes::copy_from_slice(data)),
            Framing::NewlineDelimited => self.buffer.extend_from_slice(data),
        }
    }

    /// Decode the next available message
    ///
    /// Call this repeatedly until it returns `None`. An `Err` only concerns
    /// the offending frame; later frames still decode.
    pub fn decode_next(&mut self) -> Option<Result<CompanionMessage, CodecError>> {
        match self.framing {
            Framing::PerRead => self.pending.pop_front().map(|frame| decode(&frame)),
            Framing::NewlineDelimited => self.next_line(),
        }
    }

    fn next_line(&mut self) -> Option<Result<CompanionMessage, CodecError>> {
        loop {
            match self.buffer.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    let line = self.buffer.split_to(pos + 1);
                    let frame = &line[..pos];

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    if frame.len() > self.max_frame_len {
                        return Some(Err(CodecError::FrameTooLarge {
                            len: frame.len(),
                            max: self.max_frame_len,
                        }));
                    }
                    if frame.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Some(decode(frame));
                }
                None if self.discarding => {
                    self.buffer.clear();
                    return None;
                }
                None if self.buffer.len() > self.max_frame_len => {
                    let len = self.buffer.len();
                    self.buffer.clear();
                    self.discarding = true;
                    return Some(Err(CodecError::FrameTooLarge {
                        len,
                        max: self.max_frame_len,
                    }));
                }
                None => return None,
            }
        }
    }

    /// Bytes buffered but not yet decoded (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len() + self.pending.iter().map(Bytes::len).sum::<usize>()
    }
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new(Framing::default(), MAX_CHUNK_LEN)
    }
}
