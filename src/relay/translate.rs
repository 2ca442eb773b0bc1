//! Turn event translation
//!
//! The engine reports the *whole* answer so far on every update. Callers
//! expect OpenAI-style deltas, so the translator keeps a cursor over what
//! has already been emitted and only forwards the new suffix. Errors are
//! appended to the answer as `"\n\n" + message` and the turn keeps going.

use bytes::Bytes;

use super::types::{ApiMessage, ApiResponse, Choice};
use crate::conversation::ChatEvent;
use crate::error::Result;

const CHUNK_OBJECT: &str = "chat.completion.chunk";
const COMPLETION_OBJECT: &str = "chat.completion";

/// Tracks how much of the answer has already been emitted.
///
/// Positions are counted in characters so that a delta never splits a
/// multi-byte character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaCursor {
    emitted: usize,
}

impl DeltaCursor {
    /// Create a cursor at the start of the answer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Characters emitted so far.
    pub fn position(&self) -> usize {
        self.emitted
    }

    /// Advance over `text` and return the part not yet emitted.
    ///
    /// Returns `None` when `text` is not longer than what was emitted.
    ///
    /// # Examples
    ///
    /// ```
    /// use hubrelay::relay::DeltaCursor;
    ///
    /// let mut cursor = DeltaCursor::new();
    /// assert_eq!(cursor.advance("Hel").as_deref(), Some("Hel"));
    /// assert_eq!(cursor.advance("Hello").as_deref(), Some("lo"));
    /// assert_eq!(cursor.advance("Hello"), None);
    /// ```
    pub fn advance(&mut self, text: &str) -> Option<String> {
        let total = text.chars().count();
        if total <= self.emitted {
            return None;
        }
        let delta: String = text.chars().skip(self.emitted).collect();
        self.emitted = total;
        Some(delta)
    }
}

/// One unit of relay output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayChunk {
    /// Streaming fragment
    Delta(ApiResponse),
    /// Whole non-streaming response
    Complete(ApiResponse),
    /// End of a streaming response
    Done,
}

impl RelayChunk {
    /// Whether nothing follows this chunk.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayChunk::Complete(_) | RelayChunk::Done)
    }

    /// Render as one server-sent event.
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be serialized.
    pub fn sse_frame(&self) -> Result<Bytes> {
        let frame = match self {
            RelayChunk::Delta(response) | RelayChunk::Complete(response) => {
                format!("data: {}\n\n", serde_json::to_string(response)?)
            }
            RelayChunk::Done => "data: [DONE]\n\n".to_string(),
        };
        Ok(Bytes::from(frame))
    }
}

/// Turns one turn's [`ChatEvent`]s into [`RelayChunk`]s.
#[derive(Debug, Clone)]
pub struct TurnTranslator {
    id: String,
    model: String,
    created: i64,
    stream: bool,
    cursor: DeltaCursor,
    output: String,
    finished: bool,
}

impl TurnTranslator {
    /// Create a translator
    ///
    /// # Arguments
    ///
    /// * `id` - Correlation id echoed in every chunk
    /// * `model` - Model name echoed in every chunk
    /// * `stream` - Emit deltas as they arrive instead of one final response
    pub fn new(id: impl Into<String>, model: impl Into<String>, stream: bool) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            stream,
            cursor: DeltaCursor::new(),
            output: String::new(),
            finished: false,
        }
    }

    /// Everything emitted (or to be emitted) so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Whether a terminal chunk has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Translate one event.
    ///
    /// Returns `None` when the event produces no output: an update that
    /// adds no text, any event in non-streaming mode before `Done`, or any
    /// event after the turn finished.
    pub fn translate(&mut self, event: ChatEvent) -> Option<RelayChunk> {
        if self.finished {
            return None;
        }

        match event {
            ChatEvent::UpdateAnswer { text } => {
                let delta = self.cursor.advance(&text)?;
                self.output.push_str(&delta);
                self.stream.then(|| self.delta_chunk(delta))
            }
            ChatEvent::Error { message } => {
                tracing::debug!("Relaying upstream error: {}", message);
                let appendix = format!("\n\n{}", message);
                self.output.push_str(&appendix);
                self.stream.then(|| self.delta_chunk(appendix))
            }
            ChatEvent::Done => self.finish(),
        }
    }

    /// Produce the terminal chunk if it has not been produced yet.
    ///
    /// Used when the event stream ends without [`ChatEvent::Done`].
    pub fn finish(&mut self) -> Option<RelayChunk> {
        if self.finished {
            return None;
        }
        self.finished = true;

        if self.stream {
            Some(RelayChunk::Done)
        } else {
            Some(RelayChunk::Complete(self.response(
                COMPLETION_OBJECT,
                None,
                Some("stop".to_string()),
            )))
        }
    }

    fn delta_chunk(&self, delta: String) -> RelayChunk {
        RelayChunk::Delta(self.response(CHUNK_OBJECT, Some(delta), None))
    }

    fn response(
        &self,
        object: &str,
        delta: Option<String>,
        finish_reason: Option<String>,
    ) -> ApiResponse {
        let delta = delta.unwrap_or_else(|| self.output.clone());
        ApiResponse {
            id: self.id.clone(),
            object: object.to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: ApiMessage::assistant(self.output.clone()),
                delta: Some(ApiMessage::assistant(delta)),
                finish_reason,
            }],
        }
    }
}
