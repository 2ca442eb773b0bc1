//! Record framing for the upstream conversation socket
//!
//! The upstream speaks JSON records terminated by the ASCII record separator
//! (`0x1E`). A single socket message may carry zero, one, or several
//! records, and a record may in principle be split across messages, so
//! decoding goes through a per-socket [`FrameDecoder`] that carries partial
//! fragments between calls.
//!
//! Fragments that are not valid JSON decode to an empty object instead of
//! failing: the stream is not under our control and one bad record must not
//! break a turn.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// The byte that terminates every record on the wire.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Serialize `record` and append the record separator.
///
/// # Errors
///
/// Returns an error if `record` cannot be serialized to JSON.
///
/// # Examples
///
/// ```
/// use hubrelay::codec::encode_frame;
///
/// let frame = encode_frame(&serde_json::json!({"type": 6})).unwrap();
/// assert_eq!(frame, "{\"type\":6}\u{1e}");
/// ```
pub fn encode_frame<T: Serialize + ?Sized>(record: &T) -> Result<String> {
    let mut text = serde_json::to_string(record)?;
    text.push(RECORD_SEPARATOR);
    Ok(text)
}

/// Split a frame-aligned buffer into records.
///
/// Empty fragments are dropped. A fragment that fails to parse yields an
/// empty JSON object in its place.
///
/// # Examples
///
/// ```
/// use hubrelay::codec::decode_frames;
///
/// let frames = decode_frames("{\"type\":1}\u{1e}oops\u{1e}{\"type\":3}\u{1e}");
/// assert_eq!(frames.len(), 3);
/// assert_eq!(frames[1], serde_json::json!({}));
/// ```
pub fn decode_frames(buffer: &str) -> Vec<Value> {
    buffer
        .split(RECORD_SEPARATOR)
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| parse_fragment(fragment).unwrap_or_else(neutral_frame))
        .collect()
}

/// The placeholder returned for a fragment that failed to parse.
pub fn neutral_frame() -> Value {
    Value::Object(Map::new())
}

fn parse_fragment(fragment: &str) -> Option<Value> {
    match serde_json::from_str(fragment) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("Skipping malformed frame ({} bytes): {}", fragment.len(), e);
            None
        }
    }
}

/// One record produced by [`FrameDecoder::push`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// A record that parsed as JSON
    Record(Value),
    /// A fragment that did not parse, or an oversized partial record
    Malformed,
}

impl DecodedFrame {
    /// The record, with malformed input replaced by [`neutral_frame`].
    pub fn into_value(self) -> Value {
        match self {
            Self::Record(value) => value,
            Self::Malformed => neutral_frame(),
        }
    }
}

/// Largest partial record held back while waiting for a separator.
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

/// Stateful decoder that accumulates partial records across socket messages.
///
/// One decoder belongs to one socket; it is never shared between turns.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: String,
    malformed: u32,
    max_pending: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            pending: String::new(),
            malformed: 0,
            max_pending: MAX_PENDING_BYTES,
        }
    }
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the partial record limit.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Feed one socket message and return every record it completes.
    ///
    /// Text after the last separator is held back until a later call
    /// supplies the rest of the record. A held-back record that grows past
    /// the pending limit is discarded and reported as malformed.
    ///
    /// # Arguments
    ///
    /// * `chunk` - Raw text received from the socket
    ///
    /// # Returns
    ///
    /// Complete records in arrival order. Malformed records are counted in
    /// [`FrameDecoder::malformed_count`].
    pub fn push(&mut self, chunk: &str) -> Vec<DecodedFrame> {
        self.pending.push_str(chunk);

        let Some(last_separator) = self.pending.rfind(RECORD_SEPARATOR) else {
            return self.check_overflow().into_iter().collect();
        };

        let rest = self.pending.split_off(last_separator + RECORD_SEPARATOR.len_utf8());
        let complete = std::mem::replace(&mut self.pending, rest);

        let mut frames: Vec<DecodedFrame> = complete
            .split(RECORD_SEPARATOR)
            .filter(|fragment| !fragment.is_empty())
            .map(|fragment| match parse_fragment(fragment) {
                Some(value) => DecodedFrame::Record(value),
                None => {
                    self.malformed += 1;
                    DecodedFrame::Malformed
                }
            })
            .collect();
        frames.extend(self.check_overflow());
        frames
    }

    fn check_overflow(&mut self) -> Option<DecodedFrame> {
        if self.pending.len() <= self.max_pending {
            return None;
        }
        tracing::debug!(
            "Discarding {} bytes of unterminated record",
            self.pending.len()
        );
        self.pending.clear();
        self.malformed += 1;
        Some(DecodedFrame::Malformed)
    }

    /// Number of malformed records seen so far.
    pub fn malformed_count(&self) -> u32 {
        self.malformed
    }

    /// Whether an incomplete record is waiting for more input.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
