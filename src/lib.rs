//! hubrelay - OpenAI-compatible relay for a ChatHub conversation socket
//!
//! This library provides the core functionality of the relay: the upstream
//! conversation protocol, the translation of its events into OpenAI-style
//! chat completions, and the HTTP server that exposes them.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `codec`: Record framing for the upstream socket
//! - `conversation`: Conversation creation, the socket seam, and turn streams
//! - `relay`: Request parsing, event translation, cancellation, and the server
//! - `image`: Image generation submit-and-poll workflow
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use hubrelay::{Config, Relay};
//! use hubrelay::relay::{collect_response, TurnRequest};
//! use hubrelay::conversation::ConversationStyle;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let relay = Relay::from_config(&config)?;
//!     let request = TurnRequest {
//!         prompt: "Hello".to_string(),
//!         style: ConversationStyle::Balanced,
//!         stream: false,
//!         correlation_id: None,
//!     };
//!     let turn = relay
//!         .start_turn(request, "https://www.bing.com", CancellationToken::new())
//!         .await?;
//!     let response = collect_response(turn.chunks).await?;
//!     println!("{}", response.message_text());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod codec;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod image;
pub mod relay;

// Re-export commonly used types
pub use config::Config;
pub use conversation::{ChatEvent, Conversation, ConversationInfo, ConversationStyle};
pub use error::{RelayError, Result};
pub use relay::Relay;

#[cfg(test)]
pub mod test_utils;
