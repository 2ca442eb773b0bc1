//! OpenAI-compatible relay over the upstream conversation
//!
//! A request flows through the relay like this:
//!
//! ```text
//! ApiRequest --parse_request--> TurnRequest --Relay::start_turn--> TurnStream
//!                                                                     |
//!            SSE / JSON  <--RelayChunk--  TurnTranslator  <--ChatEvent-+
//! ```
//!
//! - `types`: request and response shapes
//! - `translate`: [`ChatEvent`] to delta translation
//! - `bridge`: ties the inbound connection to upstream cancellation
//! - `server`: the axum front end

pub mod bridge;
pub mod server;
pub mod translate;
pub mod types;

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

pub use bridge::ClientLifetime;
pub use translate::{DeltaCursor, RelayChunk, TurnTranslator};
pub use types::{parse_request, ApiMessage, ApiRequest, ApiResponse, Choice, Role, TurnRequest};

use crate::config::Config;
use crate::conversation::socket::websocket::WebSocketConnector;
use crate::conversation::{
    ChatEvent, Conversation, ConversationClient, ConversationInfo, ConversationStyle,
    SessionOptions, SocketConnector,
};
use crate::error::{Result, RelayError};
use crate::image::ImageGenerator;

/// Output of one relayed turn.
pub type ChunkStream = Pin<Box<dyn Stream<Item = RelayChunk> + Send>>;

/// Relay a turn's events in arrival order
///
/// Stops without further output once `cancel` fires. The events are then
/// drained without translation so a [`TurnStream`](crate::conversation::TurnStream)
/// observing the same token gets to close its socket. When the events end
/// without [`ChatEvent::Done`] the translator's terminal chunk is still
/// produced.
pub fn relay_turn<S>(
    events: S,
    translator: TurnTranslator,
    cancel: CancellationToken,
) -> ChunkStream
where
    S: Stream<Item = ChatEvent> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut events = Box::pin(events);
        let mut translator = translator;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                event = events.next() => Some(event),
            };

            match next {
                None => {
                    while events.next().await.is_some() {}
                    return;
                }
                Some(None) => {
                    if let Some(chunk) = translator.finish() {
                        yield chunk;
                    }
                    return;
                }
                Some(Some(event)) => {
                    if let Some(chunk) = translator.translate(event) {
                        let terminal = chunk.is_terminal();
                        yield chunk;
                        if terminal {
                            return;
                        }
                    }
                }
            }
        }
    };

    Box::pin(stream)
}

/// Drain a non-streaming turn into its single response.
///
/// # Errors
///
/// Returns [`RelayError::Upstream`] if the turn ended without producing a
/// response (it was cancelled).
pub async fn collect_response(mut chunks: ChunkStream) -> Result<ApiResponse> {
    while let Some(chunk) = chunks.next().await {
        if let RelayChunk::Complete(response) = chunk {
            return Ok(response);
        }
    }
    Err(RelayError::Upstream("turn ended without a response".to_string()).into())
}

/// A started turn.
pub struct StartedTurn {
    /// Correlation id of the conversation the turn runs in
    pub correlation_id: String,
    /// Relay output, lazily driven
    pub chunks: ChunkStream,
}

impl std::fmt::Debug for StartedTurn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartedTurn")
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

/// Relay-wide settings.
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    /// Style for requests naming an unknown model
    pub default_style: ConversationStyle,
    /// Per-turn session options
    pub session: SessionOptions,
}

/// Opens conversations and runs turns for inbound requests.
#[derive(Debug, Clone)]
pub struct Relay {
    client: ConversationClient,
    connector: Arc<dyn SocketConnector>,
    images: Option<Arc<ImageGenerator>>,
    options: RelayOptions,
}

impl Relay {
    /// Create a relay from its parts.
    pub fn new(client: ConversationClient, connector: Arc<dyn SocketConnector>) -> Self {
        Self {
            client,
            connector,
            images: None,
            options: RelayOptions::default(),
        }
    }

    /// Build the production relay from configuration
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ConversationClient::new(&config.upstream)?;
        let connector = Arc::new(WebSocketConnector::new(&config.upstream));

        let mut relay = Self::new(client, connector).with_options(RelayOptions {
            default_style: config.relay.default_style,
            session: SessionOptions {
                max_malformed_frames: config.relay.max_malformed_frames,
            },
        });
        if config.image.enabled {
            relay = relay.with_images(Arc::new(ImageGenerator::new(
                &config.image,
                &config.upstream,
            )?));
        }
        Ok(relay)
    }

    /// Enable image generation for every conversation.
    pub fn with_images(mut self, images: Arc<ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    /// Replace the relay options.
    pub fn with_options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    /// Style used for unknown models.
    pub fn default_style(&self) -> ConversationStyle {
        self.options.default_style
    }

    /// Resume the conversation behind `correlation_id`, or create one
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Origin to create new conversations on
    /// * `correlation_id` - Id from a previous response, if any
    ///
    /// # Returns
    ///
    /// The conversation and the correlation id to hand back to the caller
    ///
    /// # Errors
    ///
    /// - [`RelayError::InvalidCorrelationId`] if the id does not decode
    /// - Any error from [`ConversationClient::create`]
    pub async fn open(
        &self,
        endpoint: &str,
        correlation_id: Option<&str>,
    ) -> Result<(Conversation, String)> {
        let (conversation, id) = match correlation_id {
            Some(id) => {
                let info = ConversationInfo::from_correlation_id(id)?;
                tracing::debug!("Resuming conversation {}", info.conversation_id);
                (
                    Conversation::resume(info, Arc::clone(&self.connector)),
                    id.to_string(),
                )
            }
            None => {
                let info = self.client.create(endpoint).await?;
                let id = info.to_correlation_id()?;
                (Conversation::created(info, Arc::clone(&self.connector)), id)
            }
        };

        let conversation = conversation.with_options(self.options.session.clone());
        let conversation = match &self.images {
            Some(images) => conversation.with_images(Arc::clone(images)),
            None => conversation,
        };
        Ok((conversation, id))
    }

    /// Open the conversation for `request` and start its turn
    ///
    /// Nothing is read from the upstream socket until the returned chunks
    /// are polled.
    ///
    /// # Errors
    ///
    /// Returns error if the conversation cannot be opened
    pub async fn start_turn(
        &self,
        request: TurnRequest,
        endpoint: &str,
        cancel: CancellationToken,
    ) -> Result<StartedTurn> {
        let (conversation, correlation_id) =
            self.open(endpoint, request.correlation_id.as_deref()).await?;

        let events = conversation.send_turn(&request.prompt, request.style, cancel.clone())?;
        let translator =
            TurnTranslator::new(correlation_id.clone(), request.style.as_str(), request.stream);

        Ok(StartedTurn {
            correlation_id,
            chunks: relay_turn(events, translator, cancel),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::conversation::socket::fake::FakeConnector;
    use crate::test_utils::{sample_correlation_id, turn_script};

    fn relay(connector: FakeConnector) -> Relay {
        let client = ConversationClient::new(&UpstreamConfig::default()).unwrap();
        Relay::new(client, Arc::new(connector))
    }

    fn request(correlation_id: String, stream: bool) -> TurnRequest {
        TurnRequest {
            prompt: "hi".to_string(),
            style: ConversationStyle::Creative,
            stream,
            correlation_id: Some(correlation_id),
        }
    }

    #[tokio::test]
    async fn test_relay_turn_streams_deltas_then_done() {
        let events = futures::stream::iter(vec![
            ChatEvent::update("a"),
            ChatEvent::update("ab"),
            ChatEvent::Done,
            ChatEvent::update("never"),
        ]);
        let chunks: Vec<RelayChunk> = relay_turn(
            events,
            TurnTranslator::new("id", "creative", true),
            CancellationToken::new(),
        )
        .collect()
        .await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], RelayChunk::Done);
        let text: String = chunks[..2]
            .iter()
            .map(|c| match c {
                RelayChunk::Delta(r) => r.delta_text(),
                other => panic!("unexpected chunk {:?}", other),
            })
            .collect();
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn test_relay_turn_finishes_when_events_end_early() {
        let events = futures::stream::iter(vec![ChatEvent::update("partial")]);
        let response = collect_response(relay_turn(
            events,
            TurnTranslator::new("id", "creative", false),
            CancellationToken::new(),
        ))
        .await
        .unwrap();
        assert_eq!(response.message_text(), "partial");
    }

    #[tokio::test]
    async fn test_resumed_turn_uses_correlation_id_without_creating() {
        let connector = FakeConnector::new(turn_script(&["Hel", "Hello"]));
        let relay = relay(connector.clone());
        let id = sample_correlation_id();

        // The configured endpoint is unreachable, so creating would fail.
        let turn = relay
            .start_turn(request(id.clone(), false), "http://127.0.0.1:1", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(turn.correlation_id, id);

        let response = collect_response(turn.chunks).await.unwrap();
        assert_eq!(response.id, id);
        assert_eq!(response.message_text(), "Hello");
        assert_eq!(connector.connections(), 1);
    }

    #[tokio::test]
    async fn test_invalid_correlation_id_is_rejected() {
        let relay = relay(FakeConnector::new(vec![]));
        let err = relay
            .start_turn(
                request("{not json".to_string(), true),
                "http://127.0.0.1:1",
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RelayError>(),
            Some(RelayError::InvalidCorrelationId(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_after_two_chunks_stops_upstream_reads() {
        let connector = FakeConnector::new(turn_script(&["a", "ab", "abc", "abcd", "abcde"]));
        let relay = relay(connector.clone());
        let cancel = CancellationToken::new();

        let mut turn = relay
            .start_turn(
                request(sample_correlation_id(), true),
                "http://127.0.0.1:1",
                cancel.clone(),
            )
            .await
            .unwrap();

        let mut received = Vec::new();
        while let Some(chunk) = turn.chunks.next().await {
            received.push(chunk);
            if received.len() == 2 {
                cancel.cancel();
            }
        }

        assert_eq!(received.len(), 2);
        assert!(received.iter().all(|c| matches!(c, RelayChunk::Delta(_))));
        // Handshake acknowledgement plus the two relayed updates.
        assert_eq!(connector.reads(), 3);
        assert_eq!(connector.closes(), 1);
    }
}
