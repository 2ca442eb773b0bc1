//! Core conversation types: identifiers, styles, and turn events

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RelayError};

/// Identifiers needed to resume a remote conversation.
///
/// Created once by [`ConversationClient::create`](super::ConversationClient::create)
/// and never modified afterwards. Its JSON form is handed to callers as the
/// correlation id and parsed back on later requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationInfo {
    /// Engine-side conversation id
    pub conversation_id: String,
    /// Engine-side participant id
    pub client_id: String,
    /// Signature authorising socket access to this conversation
    #[serde(default)]
    pub conversation_signature: String,
    /// Signature delivered through a response header by newer engines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_signature: Option<String>,
    /// Origin the conversation was created against
    pub endpoint: String,
}

impl ConversationInfo {
    /// Serialize into the opaque correlation id returned to callers.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_correlation_id(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a correlation id produced by [`ConversationInfo::to_correlation_id`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidCorrelationId`] if the id does not decode.
    ///
    /// # Examples
    ///
    /// ```
    /// use hubrelay::conversation::ConversationInfo;
    ///
    /// let id = r#"{"conversationId":"c","clientId":"u","conversationSignature":"s","endpoint":"https://www.bing.com"}"#;
    /// let info = ConversationInfo::from_correlation_id(id).unwrap();
    /// assert_eq!(info.conversation_id, "c");
    /// ```
    pub fn from_correlation_id(id: &str) -> Result<Self> {
        serde_json::from_str(id)
            .map_err(|e| RelayError::InvalidCorrelationId(e.to_string()).into())
    }
}

/// Response style the engine is asked to answer in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStyle {
    /// Imaginative answers
    #[default]
    Creative,
    /// Middle ground
    Balanced,
    /// Short, factual answers
    Precise,
}

impl ConversationStyle {
    /// Every supported style.
    pub const ALL: [ConversationStyle; 3] = [
        ConversationStyle::Creative,
        ConversationStyle::Balanced,
        ConversationStyle::Precise,
    ];

    /// Resolve a request's `model` field, falling back to `default` for
    /// anything unrecognised.
    ///
    /// # Examples
    ///
    /// ```
    /// use hubrelay::conversation::ConversationStyle;
    ///
    /// let style = ConversationStyle::from_model(Some("gpt-4"), ConversationStyle::Balanced);
    /// assert_eq!(style, ConversationStyle::Balanced);
    /// ```
    pub fn from_model(model: Option<&str>, default: ConversationStyle) -> Self {
        match model.map(str::parse::<ConversationStyle>) {
            Some(Ok(style)) => style,
            Some(Err(_)) => {
                tracing::debug!(
                    "Unknown model {:?}, using default style {}",
                    model.unwrap_or_default(),
                    default
                );
                default
            }
            None => default,
        }
    }

    /// Lowercase name used in configuration and requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStyle::Creative => "creative",
            ConversationStyle::Balanced => "balanced",
            ConversationStyle::Precise => "precise",
        }
    }

    /// Engine option sets selecting this style.
    pub fn option_sets(&self) -> &'static [&'static str] {
        match self {
            ConversationStyle::Creative => &[
                "nlu_direct_response_filter",
                "deepleo",
                "disable_emoji_spoken_text",
                "responsible_ai_policy_235",
                "enablemm",
                "dv3sugg",
                "iyxapbing",
                "iycapbing",
                "h3imaginative",
                "clgalileo",
                "gencontentv3",
            ],
            ConversationStyle::Balanced => &[
                "nlu_direct_response_filter",
                "deepleo",
                "disable_emoji_spoken_text",
                "responsible_ai_policy_235",
                "enablemm",
                "dv3sugg",
                "iyxapbing",
                "iycapbing",
                "galileo",
                "saharagenconv5",
            ],
            ConversationStyle::Precise => &[
                "nlu_direct_response_filter",
                "deepleo",
                "disable_emoji_spoken_text",
                "responsible_ai_policy_235",
                "enablemm",
                "dv3sugg",
                "iyxapbing",
                "iycapbing",
                "h3precise",
                "clgalileo",
                "gencontentv3",
            ],
        }
    }
}

impl fmt::Display for ConversationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStyle {
    type Err = RelayError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "creative" => Ok(ConversationStyle::Creative),
            "balanced" => Ok(ConversationStyle::Balanced),
            "precise" => Ok(ConversationStyle::Precise),
            other => Err(RelayError::Config(format!(
                "Unknown conversation style: {}",
                other
            ))),
        }
    }
}

/// One interpreted step of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The full answer so far (not a delta)
    UpdateAnswer {
        /// Accumulated answer text
        text: String,
    },
    /// A protocol-level failure surfaced to the caller
    Error {
        /// Human readable description
        message: String,
    },
    /// The turn completed
    Done,
}

impl ChatEvent {
    /// Convenience constructor for [`ChatEvent::UpdateAnswer`].
    pub fn update(text: impl Into<String>) -> Self {
        ChatEvent::UpdateAnswer { text: text.into() }
    }

    /// Convenience constructor for [`ChatEvent::Error`].
    pub fn error(message: impl Into<String>) -> Self {
        ChatEvent::Error {
            message: message.into(),
        }
    }

    /// Whether this event ends the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Done)
    }
}
