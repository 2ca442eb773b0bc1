//! WebSocket connector for the upstream ChatHub
//!
//! The socket URL is taken from `upstream.socket_url` when configured and
//! otherwise derived from the conversation's endpoint
//! (`https://host` becomes `wss://host/sydney/ChatHub`). Newer engines hand
//! out an encrypted signature at creation time; it is passed along as the
//! `sec_access_token` query parameter.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{ChatSocket, SocketConnector};
use crate::config::UpstreamConfig;
use crate::conversation::types::ConversationInfo;
use crate::error::{Result, RelayError};

/// Path of the chat hub on the conversation endpoint.
const CHAT_HUB_PATH: &str = "/sydney/ChatHub";

/// Opens `tokio-tungstenite` sockets to the upstream chat hub.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    socket_url: Option<String>,
    headers: Vec<(String, String)>,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Build a connector from the upstream configuration.
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            socket_url: config.socket_url.clone(),
            headers: config.header_pairs(),
            connect_timeout: config.request_timeout(),
        }
    }

    /// Resolve the socket URL for a conversation.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if neither the configured socket URL
    /// nor the conversation endpoint is a usable URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use hubrelay::config::UpstreamConfig;
    /// use hubrelay::conversation::ConversationInfo;
    /// use hubrelay::conversation::socket::websocket::WebSocketConnector;
    ///
    /// let connector = WebSocketConnector::new(&UpstreamConfig::default());
    /// let info = ConversationInfo {
    ///     conversation_id: "c".into(),
    ///     client_id: "u".into(),
    ///     conversation_signature: "s".into(),
    ///     encrypted_signature: None,
    ///     endpoint: "https://www.bing.com".into(),
    /// };
    /// assert_eq!(
    ///     connector.socket_url_for(&info).unwrap(),
    ///     "wss://www.bing.com/sydney/ChatHub"
    /// );
    /// ```
    pub fn socket_url_for(&self, info: &ConversationInfo) -> Result<String> {
        let mut url = match &self.socket_url {
            Some(configured) => url::Url::parse(configured)
                .map_err(|e| RelayError::Config(format!("Invalid socket URL: {}", e)))?,
            None => {
                let mut url = url::Url::parse(&info.endpoint).map_err(|e| {
                    RelayError::Config(format!("Invalid conversation endpoint: {}", e))
                })?;
                let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
                url.set_scheme(scheme).map_err(|_| {
                    RelayError::Config(format!("Cannot derive socket URL from {}", info.endpoint))
                })?;
                url.set_path(CHAT_HUB_PATH);
                url.set_query(None);
                url
            }
        };

        if let Some(token) = &info.encrypted_signature {
            url.query_pairs_mut().append_pair("sec_access_token", token);
        }

        Ok(url.to_string())
    }
}

#[async_trait]
impl SocketConnector for WebSocketConnector {
    async fn connect(&self, info: &ConversationInfo) -> Result<Box<dyn ChatSocket>> {
        let url = self.socket_url_for(info)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::TransientSocket(format!("Invalid socket request: {}", e)))?;

        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().insert(name, value);
                }
                _ => tracing::warn!("Skipping invalid upstream header: {}", name),
            }
        }

        tracing::debug!("Connecting to chat hub for conversation {}", info.conversation_id);

        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| RelayError::TransientSocket("Socket connect timed out".to_string()))?
                .map_err(|e| RelayError::TransientSocket(format!("Socket connect failed: {}", e)))?;

        Ok(Box::new(WebSocketChatSocket { stream }))
    }
}

/// A connected upstream socket.
struct WebSocketChatSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ChatSocket for WebSocketChatSocket {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| RelayError::TransientSocket(format!("Socket send failed: {}", e)).into())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    return Some(Err(RelayError::TransientSocket(format!(
                        "Socket read failed: {}",
                        e
                    ))
                    .into()))
                }
            };

            match message {
                Message::Text(text) => return Some(Ok(text.as_str().to_string())),
                Message::Binary(data) => {
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()))
                }
                Message::Close(frame) => {
                    tracing::debug!("Chat hub closed the socket: {:?}", frame);
                    return None;
                }
                // Pings are answered by tungstenite itself.
                _ => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("Ignoring socket close error: {}", e);
        }
    }
}
