//! Conversation creation over HTTP
//!
//! A conversation is created with one `GET /turing/conversation/create`
//! carrying the configured cookie. A denied handshake is reported as
//! [`RelayError::SessionCreation`] so callers can tell it apart from a
//! network hiccup ([`RelayError::Upstream`]).

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::types::ConversationInfo;
use crate::config::UpstreamConfig;
use crate::error::{Result, RelayError};

/// Path of the conversation creation endpoint.
const CREATE_PATH: &str = "/turing/conversation/create";

/// Response headers newer engines use for the conversation signature.
const ENCRYPTED_SIGNATURE_HEADER: &str = "x-sydney-encryptedconversationsignature";
const SIGNATURE_HEADER: &str = "x-sydney-conversationsignature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateConversationResponse {
    conversation_id: Option<String>,
    client_id: Option<String>,
    conversation_signature: Option<String>,
    result: Option<CreateResult>,
}

#[derive(Debug, Deserialize)]
struct CreateResult {
    value: Option<String>,
    message: Option<String>,
}

/// Creates remote conversations.
#[derive(Debug, Clone)]
pub struct ConversationClient {
    client: Client,
    headers: Vec<(String, String)>,
}

impl ConversationClient {
    /// Create a client from the upstream configuration
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            headers: config.header_pairs(),
        })
    }

    /// Create a new conversation against `endpoint`
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Origin to create the conversation on, e.g.
    ///   `https://www.bing.com`
    ///
    /// # Returns
    ///
    /// The identifiers needed to open sockets for the new conversation
    ///
    /// # Errors
    ///
    /// - [`RelayError::SessionCreation`] if access is denied or the
    ///   response carries no identifiers
    /// - [`RelayError::Upstream`] for network failures and unexpected
    ///   responses
    pub async fn create(&self, endpoint: &str) -> Result<ConversationInfo> {
        let endpoint = endpoint.trim_end_matches('/');
        let url = format!("{}{}", endpoint, CREATE_PATH);

        let mut request = self.client.get(&url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        tracing::debug!("Creating conversation via {}", url);
        let response = request
            .send()
            .await
            .map_err(|e| RelayError::Upstream(format!("Conversation create failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RelayError::SessionCreation(format!(
                "Conversation create returned {}; cookie missing or expired",
                status
            ))
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Upstream(format!(
                "Conversation create returned {}: {}",
                status, body
            ))
            .into());
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let encrypted_signature = header(ENCRYPTED_SIGNATURE_HEADER);
        let header_signature = header(SIGNATURE_HEADER);

        let body: CreateConversationResponse = response.json().await.map_err(|e| {
            RelayError::Upstream(format!("Failed to parse conversation response: {}", e))
        })?;

        if let Some(result) = &body.result {
            if let Some(value) = result.value.as_deref().filter(|v| *v != "Success") {
                let message = result.message.as_deref().unwrap_or(value);
                tracing::warn!("Conversation create denied: {}", message);
                return Err(RelayError::SessionCreation(message.to_string()).into());
            }
        }

        let (Some(conversation_id), Some(client_id)) = (body.conversation_id, body.client_id)
        else {
            return Err(RelayError::SessionCreation(
                "Conversation response is missing identifiers".to_string(),
            )
            .into());
        };

        let conversation_signature = body
            .conversation_signature
            .or(header_signature)
            .unwrap_or_default();
        if conversation_signature.is_empty() && encrypted_signature.is_none() {
            return Err(RelayError::SessionCreation(
                "Conversation response is missing a signature".to_string(),
            )
            .into());
        }

        tracing::info!("Created conversation {}", conversation_id);

        Ok(ConversationInfo {
            conversation_id,
            client_id,
            conversation_signature,
            encrypted_signature,
            endpoint: endpoint.to_string(),
        })
    }
}
