//! Configuration management for hubrelay
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::conversation::ConversationStyle;
use crate::error::{Result, RelayError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for hubrelay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Inbound HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream conversation engine settings
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Relay behaviour settings
    #[serde(default)]
    pub relay: RelayConfig,
    /// Image generation settings
    #[serde(default)]
    pub image: ImageConfig,
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upstream conversation engine configuration
///
/// Cookies and headers are read from here as-is; storing or refreshing
/// them is left to whoever writes the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Origin used to create conversations (e.g. `https://www.bing.com`)
    ///
    /// When unset, the origin is derived from the `Host` header of each
    /// inbound request.
    #[serde(default = "default_endpoint")]
    pub endpoint: Option<String>,

    /// Explicit socket URL. When unset it is derived from the conversation
    /// endpoint (`wss://<host>/sydney/ChatHub`).
    #[serde(default)]
    pub socket_url: Option<String>,

    /// Raw `Cookie` header sent with every upstream request
    #[serde(default)]
    pub cookie: Option<String>,

    /// Extra headers sent with every upstream request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// `User-Agent` sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for upstream HTTP requests (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_endpoint() -> Option<String> {
    Some("https://www.bing.com".to_string())
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36 Edg/115.0.1901.203".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            socket_url: None,
            cookie: None,
            headers: HashMap::new(),
            user_agent: default_user_agent(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl UpstreamConfig {
    /// All headers to attach to upstream requests, cookie included.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(cookie) = self.cookie.as_deref().filter(|c| !c.is_empty()) {
            pairs.push(("Cookie".to_string(), cookie.to_string()));
        }
        pairs
    }

    /// Per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Relay behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Style used when a request names an unknown model
    #[serde(default)]
    pub default_style: ConversationStyle,

    /// End a turn with an error after this many malformed frames
    ///
    /// `None` tolerates malformed frames indefinitely.
    #[serde(default)]
    pub max_malformed_frames: Option<u32>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_style: ConversationStyle::default(),
            max_malformed_frames: None,
        }
    }
}

/// Image generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Run the image workflow when the engine asks for generated content
    #[serde(default = "default_image_enabled")]
    pub enabled: bool,

    /// Origin hosting the image creation endpoints
    #[serde(default = "default_image_base_url")]
    pub base_url: String,

    /// Total number of result polls before giving up, counting the first
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    /// Delay before each poll (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_image_enabled() -> bool {
    true
}

fn default_image_base_url() -> String {
    "https://www.bing.com".to_string()
}

fn default_max_polls() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    3000
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: default_image_enabled(),
            base_url: default_image_base_url(),
            max_polls: default_max_polls(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ImageConfig {
    /// Poll delay as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(host) = std::env::var("HUBRELAY_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("HUBRELAY_PORT") {
            if let Ok(value) = port.parse() {
                self.server.port = value;
            } else {
                tracing::warn!("Invalid HUBRELAY_PORT: {}", port);
            }
        }

        if let Ok(endpoint) = std::env::var("HUBRELAY_ENDPOINT") {
            // An empty value switches to Host-header derivation.
            self.upstream.endpoint = Some(endpoint).filter(|e| !e.is_empty());
        }

        if let Ok(socket_url) = std::env::var("HUBRELAY_SOCKET_URL") {
            self.upstream.socket_url = Some(socket_url).filter(|s| !s.is_empty());
        }

        if let Ok(cookie) = std::env::var("HUBRELAY_COOKIE") {
            self.upstream.cookie = Some(cookie);
        }

        if let Ok(style) = std::env::var("HUBRELAY_DEFAULT_STYLE") {
            match style.parse() {
                Ok(value) => self.relay.default_style = value,
                Err(_) => tracing::warn!("Invalid HUBRELAY_DEFAULT_STYLE: {}", style),
            }
        }

        if let Ok(max_polls) = std::env::var("HUBRELAY_IMAGE_MAX_POLLS") {
            if let Ok(value) = max_polls.parse() {
                self.image.max_polls = value;
            } else {
                tracing::warn!("Invalid HUBRELAY_IMAGE_MAX_POLLS: {}", max_polls);
            }
        }

        if let Ok(interval) = std::env::var("HUBRELAY_IMAGE_POLL_INTERVAL_MS") {
            if let Ok(value) = interval.parse() {
                self.image.poll_interval_ms = value;
            } else {
                tracing::warn!("Invalid HUBRELAY_IMAGE_POLL_INTERVAL_MS: {}", interval);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let crate::cli::Commands::Serve { host, port } = &cli.command {
            if let Some(host) = host {
                self.server.host = host.clone();
            }
            if let Some(port) = port {
                self.server.port = *port;
            }
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(RelayError::Config("server.host cannot be empty".to_string()).into());
        }

        if let Some(endpoint) = &self.upstream.endpoint {
            validate_url(endpoint, &["http", "https"], "upstream.endpoint")?;
        }

        if let Some(socket_url) = &self.upstream.socket_url {
            validate_url(socket_url, &["ws", "wss"], "upstream.socket_url")?;
        }

        if self.upstream.request_timeout_seconds == 0 {
            return Err(RelayError::Config(
                "upstream.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.image.enabled {
            validate_url(&self.image.base_url, &["http", "https"], "image.base_url")?;
        }

        if self.image.max_polls == 0 {
            return Err(
                RelayError::Config("image.max_polls must be greater than 0".to_string()).into(),
            );
        }

        Ok(())
    }
}

fn validate_url(value: &str, schemes: &[&str], field: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| RelayError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(RelayError::Config(format!(
            "{} must use one of: {}",
            field,
            schemes.join(", ")
        ))
        .into());
    }
    Ok(())
}
