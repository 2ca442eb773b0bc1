//! Command-line interface definition for hubrelay
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to run the relay server, send a single turn, and
//! generate images.

use clap::{Parser, Subcommand};

/// hubrelay - OpenAI-compatible relay for a ChatHub conversation socket
///
/// Serves chat completions backed by an upstream streaming conversation,
/// or talks to the upstream directly from the terminal.
#[derive(Parser, Debug, Clone)]
#[command(name = "hubrelay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "HUBRELAY_CONFIG", default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for hubrelay
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the OpenAI-compatible relay server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one prompt upstream and print the answer as it streams
    Ask {
        /// Prompt to send
        #[arg(long)]
        prompt: String,

        /// Conversation style (creative, balanced, precise)
        #[arg(short, long)]
        style: Option<String>,

        /// Correlation id of a conversation to continue
        #[arg(long)]
        id: Option<String>,

        /// Print the whole answer once instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },

    /// Generate images for a prompt and print them as markdown
    Image {
        /// Image prompt
        #[arg(long)]
        prompt: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            command: Commands::Serve {
                host: None,
                port: None,
            },
        }
    }
}
