//! Upstream conversation handling
//!
//! This module owns everything on the engine side of the relay:
//!
//! - `types`: conversation identifiers, styles, and turn events
//! - `client`: conversation creation over HTTP
//! - `protocol`: the ChatHub record schema
//! - `socket`: the socket seam and its WebSocket implementation
//! - `session`: sending one turn and streaming its events

pub mod client;
pub mod protocol;
pub mod session;
pub mod socket;
pub mod types;

pub use client::ConversationClient;
pub use session::{Conversation, SessionOptions, TurnStream};
pub use socket::{ChatSocket, SocketConnector};
pub use types::{ChatEvent, ConversationInfo, ConversationStyle};
