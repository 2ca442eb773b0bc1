//! One logical conversation and the event stream of its turns
//!
//! [`Conversation::send_turn`] returns a lazy [`TurnStream`]: nothing is read
//! from the socket until the consumer polls, and each poll reads at most what
//! is needed to produce the next [`ChatEvent`]. Dropping the stream drops the
//! socket; cancelling the token closes it explicitly and ends the stream
//! without further events.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::Stream;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::protocol::{self, FrameKind, TurnRecord};
use super::socket::{ChatSocket, SocketConnector};
use super::types::{ChatEvent, ConversationInfo, ConversationStyle};
use crate::codec::{encode_frame, DecodedFrame, FrameDecoder};
use crate::error::{Result, RelayError};
use crate::image::ImageGenerator;

/// Finite, non-restartable sequence of events for one turn.
pub type TurnStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

/// Per-session tunables.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// End the turn after this many malformed frames (`None`: tolerate all)
    pub max_malformed_frames: Option<u32>,
}

/// A remote conversation that turns can be sent to.
///
/// Clones share the same in-flight guard, so at most one turn runs per
/// conversation at a time.
#[derive(Debug, Clone)]
pub struct Conversation {
    info: ConversationInfo,
    connector: Arc<dyn SocketConnector>,
    images: Option<Arc<ImageGenerator>>,
    options: SessionOptions,
    start_of_session: Arc<AtomicBool>,
    turn_lock: Arc<Mutex<()>>,
}

impl Conversation {
    /// Resume an existing conversation.
    pub fn resume(info: ConversationInfo, connector: Arc<dyn SocketConnector>) -> Self {
        Self::build(info, connector, false)
    }

    /// Wrap a conversation that was just created; its first turn opens the
    /// session upstream.
    pub fn created(info: ConversationInfo, connector: Arc<dyn SocketConnector>) -> Self {
        Self::build(info, connector, true)
    }

    fn build(
        info: ConversationInfo,
        connector: Arc<dyn SocketConnector>,
        start_of_session: bool,
    ) -> Self {
        Self {
            info,
            connector,
            images: None,
            options: SessionOptions::default(),
            start_of_session: Arc::new(AtomicBool::new(start_of_session)),
            turn_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Enable the image workflow for turns of this conversation.
    pub fn with_images(mut self, images: Arc<ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    /// Replace the session options.
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Identifiers of this conversation.
    pub fn info(&self) -> &ConversationInfo {
        &self.info
    }

    /// Send one user turn and stream its events
    ///
    /// # Arguments
    ///
    /// * `prompt` - The user's message
    /// * `style` - Answer style for this turn
    /// * `cancel` - Cancelling closes the socket and ends the stream
    ///
    /// # Returns
    ///
    /// A lazy stream ending after [`ChatEvent::Done`], after a fatal
    /// [`ChatEvent::Error`], or silently on cancellation
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::TurnInProgress`] if another turn of this
    /// conversation is still streaming.
    pub fn send_turn(
        &self,
        prompt: &str,
        style: ConversationStyle,
        cancel: CancellationToken,
    ) -> Result<TurnStream> {
        let guard = Arc::clone(&self.turn_lock)
            .try_lock_owned()
            .map_err(|_| RelayError::TurnInProgress(self.info.conversation_id.clone()))?;

        let turn = TurnContext {
            info: self.info.clone(),
            prompt: prompt.to_string(),
            style,
            start_of_session: self.start_of_session.swap(false, Ordering::SeqCst),
            trace_id: uuid::Uuid::new_v4().simple().to_string(),
        };
        let connector = Arc::clone(&self.connector);
        let images = self.images.clone();
        let max_malformed = self.options.max_malformed_frames;

        tracing::debug!(
            conversation = %turn.info.conversation_id,
            style = %style,
            start_of_session = turn.start_of_session,
            "Starting turn"
        );

        let stream = async_stream::stream! {
            let _guard = guard;

            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = connector.connect(&turn.info) => Some(result),
            };
            let mut socket = match connected {
                None => return,
                Some(Ok(socket)) => socket,
                Some(Err(e)) => {
                    tracing::warn!("Turn could not connect: {}", e);
                    yield ChatEvent::error(e.to_string());
                    return;
                }
            };

            if let Err(e) = send_record(socket.as_mut(), &protocol::handshake_record()).await {
                yield ChatEvent::error(e.to_string());
                return;
            }

            let mut decoder = FrameDecoder::new();
            let mut awaiting_ack = true;
            let mut answer = String::new();

            loop {
                let received = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    message = socket.recv() => Some(message),
                };
                let message = match received {
                    None => {
                        tracing::debug!("Turn cancelled; closing socket");
                        socket.close().await;
                        return;
                    }
                    Some(None) => {
                        tracing::warn!("Socket closed before the turn completed");
                        yield ChatEvent::error(
                            RelayError::TransientSocket(
                                "connection closed before the turn completed".to_string(),
                            )
                            .to_string(),
                        );
                        return;
                    }
                    Some(Some(Err(e))) => {
                        tracing::warn!("Socket failed mid-turn: {}", e);
                        socket.close().await;
                        yield ChatEvent::error(e.to_string());
                        return;
                    }
                    Some(Some(Ok(text))) => text,
                };

                for decoded in decoder.push(&message) {
                    if cancel.is_cancelled() {
                        socket.close().await;
                        return;
                    }

                    let kind = match decoded {
                        DecodedFrame::Record(frame) => protocol::classify(&frame, awaiting_ack),
                        DecodedFrame::Malformed => FrameKind::Ignored,
                    };
                    match kind {
                        FrameKind::HandshakeAck => {
                            awaiting_ack = false;
                            let invocation = TurnRecord {
                                info: &turn.info,
                                prompt: &turn.prompt,
                                style: turn.style,
                                start_of_session: turn.start_of_session,
                                trace_id: &turn.trace_id,
                            }
                            .to_record();
                            let sent = match send_record(socket.as_mut(), &protocol::keep_alive_record()).await {
                                Ok(()) => send_record(socket.as_mut(), &invocation).await,
                                Err(e) => Err(e),
                            };
                            if let Err(e) = sent {
                                yield ChatEvent::error(e.to_string());
                                return;
                            }
                        }
                        FrameKind::KeepAlive => {
                            if let Err(e) = send_record(socket.as_mut(), &protocol::keep_alive_record()).await {
                                yield ChatEvent::error(e.to_string());
                                return;
                            }
                        }
                        FrameKind::Update(text) => {
                            answer.clone_from(&text);
                            yield ChatEvent::UpdateAnswer { text };
                        }
                        FrameKind::Final(result) => {
                            if let Some(error) = result.error {
                                yield ChatEvent::error(error);
                            }

                            let mut changed = false;
                            if let Some(text) = result.text {
                                changed = text != answer;
                                answer = text;
                            }

                            if let (Some(image_prompt), Some(images)) = (result.image_prompt, images.as_ref()) {
                                let iframe_id = uuid::Uuid::new_v4().to_string();
                                let generated = tokio::select! {
                                    biased;
                                    _ = cancel.cancelled() => None,
                                    result = images.generate(&image_prompt, &iframe_id) => Some(result),
                                };
                                match generated {
                                    None => {
                                        socket.close().await;
                                        return;
                                    }
                                    Some(Ok(markdown)) if !markdown.is_empty() => {
                                        answer = if answer.is_empty() {
                                            markdown
                                        } else {
                                            format!("{}\n\n{}", answer, markdown)
                                        };
                                        changed = true;
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(e)) => {
                                        tracing::warn!("Image generation failed: {}", e);
                                        yield ChatEvent::error(e.to_string());
                                    }
                                }
                            }

                            if changed {
                                yield ChatEvent::update(answer.clone());
                            }
                        }
                        FrameKind::Completed => {
                            socket.close().await;
                            yield ChatEvent::Done;
                            return;
                        }
                        FrameKind::Ignored => {}
                    }
                }

                if let Some(limit) = max_malformed {
                    if decoder.malformed_count() > limit {
                        socket.close().await;
                        yield ChatEvent::error(
                            RelayError::MalformedFrame(format!(
                                "{} malformed frames exceeded the limit of {}",
                                decoder.malformed_count(),
                                limit
                            ))
                            .to_string(),
                        );
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Owned inputs of one turn, moved into its stream.
struct TurnContext {
    info: ConversationInfo,
    prompt: String,
    style: ConversationStyle,
    start_of_session: bool,
    trace_id: String,
}

async fn send_record(socket: &mut dyn ChatSocket, record: &Value) -> Result<()> {
    socket.send(encode_frame(record)?).await
}
