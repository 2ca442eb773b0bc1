//! OpenAI-style request and response shapes
//!
//! Only the fields the relay reads or writes are modelled. Unknown request
//! fields are ignored so that stock OpenAI clients can talk to the relay.

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationStyle;
use crate::error::{Result, RelayError};

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Any role the relay does not act on (`tool`, `function`, ...)
    #[serde(other)]
    Other,
}

/// Message content: plain text or a list of typed parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MessageContent {
    /// Text of the message; text parts are joined with newlines.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|p| p.kind == "text")
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// One message of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

impl ApiMessage {
    /// Assistant message with plain text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(MessageContent::Text(content.into())),
        }
    }
}

/// What the caller wants done with the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Next,
    Variant,
    #[serde(other)]
    Other,
}

/// Inbound chat completion request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Correlation id from a previous response
    #[serde(default)]
    pub id: Option<String>,
    /// Requested model; a style name selects that style
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
    /// Absent or null means a single non-streaming response
    #[serde(default)]
    pub stream: Option<bool>,
}

/// One choice of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ApiMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<ApiMessage>,
    pub finish_reason: Option<String>,
}

/// Outbound chat completion response or streaming chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Correlation id to send back on the next request
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
}

impl ApiResponse {
    /// Text of the first choice's message.
    pub fn message_text(&self) -> String {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(MessageContent::text)
            .unwrap_or_default()
    }

    /// Text of the first choice's delta.
    pub fn delta_text(&self) -> String {
        self.choices
            .first()
            .and_then(|c| c.delta.as_ref())
            .and_then(|d| d.content.as_ref())
            .map(MessageContent::text)
            .unwrap_or_default()
    }
}

/// A validated request, ready to run as one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub prompt: String,
    pub style: ConversationStyle,
    pub stream: bool,
    /// Conversation to resume; `None` creates a new one
    pub correlation_id: Option<String>,
}

/// Validate an inbound request
///
/// The prompt is the most recent `user` message. An unknown `model` falls
/// back to `default_style`.
///
/// # Errors
///
/// Returns [`RelayError::InvalidRequest`] if there is no non-empty user
/// message.
pub fn parse_request(request: ApiRequest, default_style: ConversationStyle) -> Result<TurnRequest> {
    let prompt = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .and_then(|m| m.content.as_ref())
        .map(MessageContent::text)
        .unwrap_or_default();

    if prompt.trim().is_empty() {
        return Err(RelayError::InvalidRequest("messages can't be empty!".to_string()).into());
    }

    match request.action {
        Some(Action::Variant) => tracing::debug!("Variant requested; sending as a new turn"),
        Some(Action::Other) => tracing::debug!("Unrecognized action; sending as a new turn"),
        _ => {}
    }

    Ok(TurnRequest {
        prompt,
        style: ConversationStyle::from_model(request.model.as_deref(), default_style),
        stream: request.stream.unwrap_or(false),
        correlation_id: request.id.filter(|id| !id.is_empty()),
    })
}
