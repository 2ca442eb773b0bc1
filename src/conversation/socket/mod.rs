//! Conversation socket abstraction and implementations
//!
//! A turn only needs to send text records and read text messages back, so
//! the seam is deliberately small:
//!
//! - [`websocket::WebSocketConnector`] -- the real upstream, over
//!   `tokio-tungstenite`.
//! - [`fake::FakeConnector`] -- scripted in-process socket used in tests
//!   (cfg(test) only).

use async_trait::async_trait;

use super::types::ConversationInfo;
use crate::error::Result;

/// One open conversation socket.
#[async_trait]
pub trait ChatSocket: Send {
    /// Send one text message (already framed).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RelayError::TransientSocket`] if the socket
    /// is gone.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Wait for the next text message.
    ///
    /// Returns `None` once the peer has closed the socket.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the socket. Errors are ignored.
    async fn close(&mut self);
}

/// Opens sockets for a conversation.
#[async_trait]
pub trait SocketConnector: Send + Sync + std::fmt::Debug {
    /// Connect to the socket serving `info`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or upgrade fails.
    async fn connect(&self, info: &ConversationInfo) -> Result<Box<dyn ChatSocket>>;
}

pub mod websocket;

#[cfg(test)]
pub mod fake;
