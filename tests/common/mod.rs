//! Shared fixtures for hubrelay integration tests
//!
//! - [`temp_config_file`] writes a YAML config into a temp dir.
//! - [`mount_conversation_create`] answers conversation creation on a
//!   `wiremock` server.
//! - [`ChatHub`] is a local `tokio-tungstenite` server that plays one turn
//!   per connection and records the invocations it receives.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEPARATOR: char = '\u{1e}';

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Answer `GET /turing/conversation/create` with a fixed conversation,
/// expecting exactly `times` calls.
#[allow(dead_code)]
pub async fn mount_conversation_create(server: &MockServer, conversation_id: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path("/turing/conversation/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "conversationId": conversation_id,
            "clientId": "client-e2e",
            "conversationSignature": "sig-e2e",
            "result": {"value": "Success", "message": null}
        })))
        .expect(times)
        .mount(server)
        .await;
}

/// Frame one record the way the chat hub does.
#[allow(dead_code)]
pub fn frame(record: Value) -> String {
    let mut text = record.to_string();
    text.push(SEPARATOR);
    text
}

/// Partial update carrying `text` as the answer so far.
#[allow(dead_code)]
pub fn update_frame(text: &str) -> String {
    frame(json!({
        "type": 1,
        "target": "update",
        "arguments": [{"messages": [{"author": "bot", "text": text}]}]
    }))
}

/// Local chat hub that plays the same turn on every connection.
#[allow(dead_code)]
pub struct ChatHub {
    pub url: String,
    invocations: Arc<Mutex<Vec<Value>>>,
}

#[allow(dead_code)]
impl ChatHub {
    /// Start a hub that answers each turn with `updates` followed by
    /// completion.
    pub async fn start(updates: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind chat hub");
        let address = listener.local_addr().expect("chat hub address");
        let invocations = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&invocations);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let updates = updates.clone();
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    if let Ok(socket) = tokio_tungstenite::accept_async(stream).await {
                        play_turn(socket, updates, recorded).await;
                    }
                });
            }
        });

        Self {
            url: format!("ws://{}/sydney/ChatHub", address),
            invocations,
        }
    }

    /// Every chat invocation received so far, in order.
    pub fn invocations(&self) -> Vec<Value> {
        self.invocations
            .lock()
            .expect("chat hub lock poisoned")
            .clone()
    }
}

async fn play_turn<S>(
    mut socket: tokio_tungstenite::WebSocketStream<S>,
    updates: Vec<String>,
    recorded: Arc<Mutex<Vec<Value>>>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    while let Some(Ok(message)) = socket.next().await {
        let Message::Text(text) = message else {
            continue;
        };

        for record in text.as_str().split(SEPARATOR).filter(|r| !r.is_empty()) {
            let Ok(record) = serde_json::from_str::<Value>(record) else {
                continue;
            };

            if record.get("protocol").is_some() {
                let _ = socket.send(Message::text(frame(json!({})))).await;
            } else if record["type"] == 4 {
                recorded
                    .lock()
                    .expect("chat hub lock poisoned")
                    .push(record);
                for update in &updates {
                    let _ = socket.send(Message::text(update.clone())).await;
                }
                let _ = socket
                    .send(Message::text(frame(json!({"type": 3, "invocationId": "0"}))))
                    .await;
            }
        }
    }
}
