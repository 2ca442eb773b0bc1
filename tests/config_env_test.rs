//! Configuration loading integration tests
//!
//! Environment overrides mutate process state, so every test here runs
//! serially.

use serial_test::serial;

use hubrelay::cli::{Cli, Commands};
use hubrelay::config::Config;
use hubrelay::conversation::ConversationStyle;

mod common;

const ENV_VARS: &[&str] = &[
    "HUBRELAY_HOST",
    "HUBRELAY_PORT",
    "HUBRELAY_ENDPOINT",
    "HUBRELAY_SOCKET_URL",
    "HUBRELAY_COOKIE",
    "HUBRELAY_DEFAULT_STYLE",
    "HUBRELAY_IMAGE_MAX_POLLS",
    "HUBRELAY_IMAGE_POLL_INTERVAL_MS",
];

fn clear_env() {
    for name in ENV_VARS {
        std::env::remove_var(name);
    }
}

fn serve_cli(port: Option<u16>) -> Cli {
    Cli {
        config: None,
        verbose: false,
        json_logs: false,
        command: Commands::Serve { host: None, port },
    }
}

const CONFIG: &str = r#"
server:
  host: 0.0.0.0
  port: 8080
upstream:
  endpoint: https://upstream.example.com
  cookie: "_U=file"
relay:
  default_style: balanced
image:
  max_polls: 4
"#;

/// Values from the YAML file are used when nothing overrides them.
#[test]
#[serial]
fn test_load_from_file() {
    clear_env();
    let (_dir, path) = common::temp_config_file(CONFIG);

    let config = Config::load(path.to_str().unwrap(), &serve_cli(None)).unwrap();

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(
        config.upstream.endpoint.as_deref(),
        Some("https://upstream.example.com")
    );
    assert_eq!(config.relay.default_style, ConversationStyle::Balanced);
    assert_eq!(config.image.max_polls, 4);
    assert_eq!(config.image.poll_interval_ms, 3000);
    assert!(config.validate().is_ok());
}

/// Environment variables override the file; the CLI overrides both.
#[test]
#[serial]
fn test_env_then_cli_overrides() {
    clear_env();
    std::env::set_var("HUBRELAY_PORT", "9100");
    std::env::set_var("HUBRELAY_COOKIE", "_U=env");
    std::env::set_var("HUBRELAY_DEFAULT_STYLE", "Precise");
    std::env::set_var("HUBRELAY_IMAGE_POLL_INTERVAL_MS", "250");
    let (_dir, path) = common::temp_config_file(CONFIG);

    let config = Config::load(path.to_str().unwrap(), &serve_cli(None)).unwrap();
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.upstream.cookie.as_deref(), Some("_U=env"));
    assert_eq!(config.relay.default_style, ConversationStyle::Precise);
    assert_eq!(config.image.poll_interval_ms, 250);

    let config = Config::load(path.to_str().unwrap(), &serve_cli(Some(9200))).unwrap();
    assert_eq!(config.server.port, 9200);

    clear_env();
}

/// An empty endpoint switches to deriving it from the request host.
#[test]
#[serial]
fn test_empty_endpoint_env_clears_endpoint() {
    clear_env();
    std::env::set_var("HUBRELAY_ENDPOINT", "");

    let config = Config::load("does-not-exist.yaml", &serve_cli(None)).unwrap();
    assert!(config.upstream.endpoint.is_none());
    assert!(config.validate().is_ok());

    clear_env();
}

/// Unparseable values are ignored with a warning instead of failing.
#[test]
#[serial]
fn test_invalid_env_values_are_ignored() {
    clear_env();
    std::env::set_var("HUBRELAY_PORT", "not-a-port");
    std::env::set_var("HUBRELAY_DEFAULT_STYLE", "gpt-4");
    std::env::set_var("HUBRELAY_IMAGE_MAX_POLLS", "-1");

    let config = Config::load("does-not-exist.yaml", &serve_cli(None)).unwrap();
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.relay.default_style, ConversationStyle::Creative);
    assert_eq!(config.image.max_polls, 10);

    clear_env();
}

/// A socket URL with an HTTP scheme fails validation.
#[test]
#[serial]
fn test_invalid_socket_url_fails_validation() {
    clear_env();
    std::env::set_var("HUBRELAY_SOCKET_URL", "https://hub.example.com/sydney/ChatHub");

    let config = Config::load("does-not-exist.yaml", &serve_cli(None)).unwrap();
    assert!(config.validate().is_err());

    clear_env();
}
