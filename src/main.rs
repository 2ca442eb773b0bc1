//! hubrelay - OpenAI-compatible relay for a ChatHub conversation socket
//!
#![doc = "hubrelay - OpenAI-compatible relay for a ChatHub conversation socket"]
#![doc = "Main entry point for the hubrelay application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hubrelay::cli::{Cli, Commands};
use hubrelay::commands;
use hubrelay::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Serve { .. } => {
            // Host and port overrides were applied while loading the config
            commands::serve::run_serve(config).await?;
            Ok(())
        }
        Commands::Ask {
            prompt,
            style,
            id,
            no_stream,
        } => {
            tracing::info!("Sending a single turn");
            if let Some(s) = &style {
                tracing::debug!("Using style override: {}", s);
            }
            if id.is_some() {
                tracing::debug!("Continuing an existing conversation");
            }
            commands::ask::run_ask(config, prompt, style, id, !no_stream).await?;
            Ok(())
        }
        Commands::Image { prompt } => {
            commands::image::run_image(config, prompt).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects debug output.
fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose {
        "hubrelay=debug,tower_http=debug"
    } else {
        "hubrelay=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
