//! ChatHub record schema
//!
//! Builds the records the engine expects before and during a turn, and
//! classifies the records it sends back. Only the parts of the schema the
//! relay acts on are modelled; everything else is ignored.
//!
//! Record types:
//!
//! - `{}` -- handshake acknowledgement
//! - `type: 1` -- partial update carrying the answer so far
//! - `type: 2` -- final result for the invocation
//! - `type: 3` -- invocation completed
//! - `type: 6` -- keep-alive

use serde_json::{json, Value};

use super::types::{ConversationInfo, ConversationStyle};

/// Message types the engine is allowed to send back.
const ALLOWED_MESSAGE_TYPES: &[&str] = &[
    "Chat",
    "InternalSearchQuery",
    "Disengaged",
    "InternalLoaderMessage",
    "SemanticSerp",
    "GenerateContentQuery",
    "SearchQuery",
];

/// Error text used when the engine stops the conversation for turn limits.
pub const TURN_LIMIT_MESSAGE: &str =
    "Sorry, you have reached chat turns limit in this conversation.";

/// First record sent on a fresh socket.
pub fn handshake_record() -> Value {
    json!({"protocol": "json", "version": 1})
}

/// Keep-alive record, also sent right after the handshake is acknowledged.
pub fn keep_alive_record() -> Value {
    json!({"type": 6})
}

/// Everything needed to build one chat invocation.
#[derive(Debug, Clone)]
pub struct TurnRecord<'a> {
    /// Conversation being continued
    pub info: &'a ConversationInfo,
    /// User prompt
    pub prompt: &'a str,
    /// Requested answer style
    pub style: ConversationStyle,
    /// First turn of a freshly created conversation
    pub start_of_session: bool,
    /// Trace id attached to the invocation
    pub trace_id: &'a str,
}

impl TurnRecord<'_> {
    /// Build the type-4 `chat` invocation record.
    pub fn to_record(&self) -> Value {
        json!({
            "arguments": [{
                "source": "cib",
                "optionsSets": self.style.option_sets(),
                "allowedMessageTypes": ALLOWED_MESSAGE_TYPES,
                "sliceIds": [],
                "traceId": self.trace_id,
                "isStartOfSession": self.start_of_session,
                "message": {
                    "author": "user",
                    "inputMethod": "Keyboard",
                    "text": self.prompt,
                    "messageType": "Chat",
                },
                "conversationSignature": self.info.conversation_signature,
                "participant": { "id": self.info.client_id },
                "conversationId": self.info.conversation_id,
            }],
            "invocationId": "0",
            "target": "chat",
            "type": 4,
        })
    }
}

/// What a received record means for the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Handshake accepted; the invocation may now be sent
    HandshakeAck,
    /// Engine keep-alive
    KeepAlive,
    /// Partial answer (full text so far)
    Update(String),
    /// Final result for the invocation
    Final(FinalResult),
    /// Invocation completed
    Completed,
    /// Anything else
    Ignored,
}

/// Interpreted contents of a type-2 record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinalResult {
    /// Error reported by the engine, if the invocation failed
    pub error: Option<String>,
    /// Final answer text, if any
    pub text: Option<String>,
    /// Prompt of a requested image generation, if any
    pub image_prompt: Option<String>,
}

/// Classify one decoded record.
///
/// The empty object is only a handshake acknowledgement when `awaiting_ack`
/// is set; afterwards it is ignored. Callers pass only records that parsed,
/// never the placeholder for a malformed fragment.
pub fn classify(frame: &Value, awaiting_ack: bool) -> FrameKind {
    let Some(object) = frame.as_object() else {
        return FrameKind::Ignored;
    };

    if object.is_empty() {
        return if awaiting_ack {
            FrameKind::HandshakeAck
        } else {
            FrameKind::Ignored
        };
    }

    match object.get("type").and_then(Value::as_u64) {
        Some(1) => frame
            .pointer("/arguments/0/messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.iter().find(|m| is_answer_message(m)))
            .map(|message| FrameKind::Update(message_to_markdown(message)))
            .unwrap_or(FrameKind::Ignored),
        Some(2) => FrameKind::Final(final_result(frame)),
        Some(3) => FrameKind::Completed,
        Some(6) => FrameKind::KeepAlive,
        _ => FrameKind::Ignored,
    }
}

fn final_result(frame: &Value) -> FinalResult {
    let item = frame.get("item").unwrap_or(&Value::Null);
    let result_value = item.pointer("/result/value").and_then(Value::as_str);

    let Some(messages) = item.get("messages").and_then(Value::as_array) else {
        let error = item
            .pointer("/result/error")
            .or_else(|| item.pointer("/result/message"))
            .and_then(Value::as_str)
            .or(result_value)
            .unwrap_or("Unknown error");
        return FinalResult {
            error: Some(error.to_string()),
            ..Default::default()
        };
    };

    if messages
        .iter()
        .any(|m| m.get("contentOrigin").and_then(Value::as_str) == Some("TurnLimiter"))
    {
        return FinalResult {
            error: Some(TURN_LIMIT_MESSAGE.to_string()),
            ..Default::default()
        };
    }

    let error = match result_value {
        Some("Success") | None => None,
        Some(other) => Some(
            item.pointer("/result/message")
                .and_then(Value::as_str)
                .unwrap_or(other)
                .to_string(),
        ),
    };

    let image_prompt = messages
        .iter()
        .find(|m| {
            m.get("author").and_then(Value::as_str) == Some("bot")
                && m.get("contentType").and_then(Value::as_str) == Some("IMAGE")
        })
        .and_then(|m| m.get("text").and_then(Value::as_str))
        .map(str::to_string);

    let text = messages
        .iter()
        .rev()
        .find(|m| is_answer_message(m))
        .map(message_to_markdown);

    FinalResult {
        error,
        text,
        image_prompt,
    }
}

/// Bot messages without a `messageType` are answer text; the others are
/// internal search/loader chatter.
fn is_answer_message(message: &Value) -> bool {
    message.get("author").and_then(Value::as_str) == Some("bot")
        && message.get("messageType").is_none()
}

/// Text of the first adaptive-card text block, falling back to `text`.
pub fn message_to_markdown(message: &Value) -> String {
    let card_text = message
        .get("adaptiveCards")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|card| card.get("body").and_then(Value::as_array))
        .flatten()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("TextBlock"))
        .and_then(|block| block.get("text").and_then(Value::as_str));

    card_text
        .or_else(|| message.get("text").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}
