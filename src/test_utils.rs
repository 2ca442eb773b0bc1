//! Test utilities for hubrelay
//!
//! This module provides common test fixtures: a sample conversation,
//! builders for upstream records, and temporary file helpers.

use crate::codec::encode_frame;
use crate::conversation::ConversationInfo;
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;

/// Conversation identifiers used across tests.
pub fn sample_info() -> ConversationInfo {
    ConversationInfo {
        conversation_id: "conv-1".to_string(),
        client_id: "client-1".to_string(),
        conversation_signature: "sig".to_string(),
        encrypted_signature: None,
        endpoint: "https://www.bing.com".to_string(),
    }
}

/// Correlation id of [`sample_info`].
pub fn sample_correlation_id() -> String {
    sample_info()
        .to_correlation_id()
        .expect("Failed to serialize sample conversation")
}

/// Frame one record.
pub fn frame(record: Value) -> String {
    encode_frame(&record).expect("Failed to encode frame")
}

/// Handshake acknowledgement.
pub fn ack_frame() -> String {
    frame(json!({}))
}

/// Partial update carrying `text` as the answer so far.
pub fn update_frame(text: &str) -> String {
    frame(json!({
        "type": 1,
        "target": "update",
        "arguments": [{"messages": [{"author": "bot", "text": text}]}]
    }))
}

/// Successful final result with `text` as the answer.
pub fn final_frame(text: &str) -> String {
    frame(json!({
        "type": 2,
        "invocationId": "0",
        "item": {
            "messages": [{"author": "user", "text": "q"}, {"author": "bot", "text": text}],
            "result": {"value": "Success"}
        }
    }))
}

/// Invocation completed.
pub fn completed_frame() -> String {
    frame(json!({"type": 3, "invocationId": "0"}))
}

/// A whole turn: acknowledgement, one update per entry, completion.
///
/// # Examples
///
/// ```ignore
/// let script = turn_script(&["Hel", "Hello"]);
/// assert_eq!(script.len(), 4);
/// ```
pub fn turn_script(updates: &[&str]) -> Vec<String> {
    let mut script = vec![ack_frame()];
    script.extend(updates.iter().map(|text| update_frame(text)));
    script.push(completed_frame());
    script
}

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_script_shape() {
        let script = turn_script(&["a", "ab"]);
        assert_eq!(script.len(), 4);
        assert_eq!(script[0], "{}\u{1e}");
        assert!(script[3].contains("\"type\":3"));
    }

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "config.yaml", "server: {}");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "server: {}");
    }
}
