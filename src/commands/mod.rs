/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `serve`: Run the relay server
- `ask`: Send one prompt upstream from the terminal
- `image`: Run the image generation workflow on its own
*/

use crate::config::Config;
use crate::error::{Result, RelayError};

// Relay server handler
pub mod serve {
    //! Relay server handler.

    use super::*;

    /// Run the relay server until interrupted
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    ///
    /// # Errors
    ///
    /// Returns error if the server cannot start
    pub async fn run_serve(config: Config) -> Result<()> {
        tracing::info!(
            "Starting relay on {}:{}",
            config.server.host,
            config.server.port
        );
        match &config.upstream.endpoint {
            Some(endpoint) => tracing::info!("Upstream endpoint: {}", endpoint),
            None => tracing::info!("Upstream endpoint derived from request Host header"),
        }
        crate::relay::server::serve(&config).await
    }
}

// Single-turn handler
pub mod ask {
    //! Single-turn handler.
    //!
    //! Runs one turn through the same relay path the server uses and prints
    //! the answer. The correlation id is printed on stderr so the next
    //! invocation can continue the conversation with `--id`.

    use super::*;
    use crate::conversation::ConversationStyle;
    use crate::relay::{ClientLifetime, Relay, RelayChunk, TurnRequest};
    use futures::StreamExt;
    use std::io::Write;

    /// Send one prompt and print the answer
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `prompt` - Prompt to send
    /// * `style` - Optional style name; the configured default otherwise
    /// * `id` - Correlation id of a conversation to continue
    /// * `stream` - Print deltas as they arrive
    ///
    /// # Errors
    ///
    /// Returns error if the style is unknown, no upstream endpoint is
    /// configured, or the conversation cannot be opened
    pub async fn run_ask(
        config: Config,
        prompt: String,
        style: Option<String>,
        id: Option<String>,
        stream: bool,
    ) -> Result<()> {
        let relay = Relay::from_config(&config)?;
        let style = match style {
            Some(name) => name.parse::<ConversationStyle>()?,
            None => relay.default_style(),
        };
        let endpoint = config.upstream.endpoint.clone().ok_or_else(|| {
            RelayError::Config("upstream.endpoint must be set to use ask".to_string())
        })?;

        let lifetime = ClientLifetime::new();
        let turn = relay
            .start_turn(
                TurnRequest {
                    prompt,
                    style,
                    stream,
                    correlation_id: id,
                },
                &endpoint,
                lifetime.token(),
            )
            .await?;

        let mut chunks = turn.chunks;
        let mut stdout = std::io::stdout();
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);

        loop {
            let chunk = tokio::select! {
                _ = &mut interrupt => {
                    tracing::info!("Interrupted; cancelling turn");
                    drop(lifetime);
                    return Ok(());
                }
                chunk = chunks.next() => chunk,
            };

            match chunk {
                Some(RelayChunk::Delta(response)) => {
                    write!(stdout, "{}", response.delta_text())?;
                    stdout.flush()?;
                }
                Some(RelayChunk::Complete(response)) => {
                    writeln!(stdout, "{}", response.message_text())?;
                }
                Some(RelayChunk::Done) => writeln!(stdout)?,
                None => break,
            }
        }

        lifetime.complete();
        eprintln!("id: {}", turn.correlation_id);
        Ok(())
    }
}

// Image generation handler
pub mod image {
    //! Image generation handler.

    use super::*;
    use crate::image::ImageGenerator;

    /// Generate images for `prompt` and print them as markdown
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotAuthenticated`] or [`RelayError::PollExhausted`]
    /// when no images could be produced
    pub async fn run_image(config: Config, prompt: String) -> Result<()> {
        let generator = ImageGenerator::new(&config.image, &config.upstream)?;
        let iframe_id = uuid::Uuid::new_v4().to_string();

        tracing::info!("Generating images for {:?}", prompt);
        let markdown = generator.generate(&prompt, &iframe_id).await?;

        if markdown.is_empty() {
            tracing::warn!("Result page contained no images");
        } else {
            println!("{}", markdown);
        }
        Ok(())
    }
}
