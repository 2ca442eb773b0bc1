//! Scripted in-process socket for conversation unit tests
//!
//! [`FakeConnector`] hands out sockets that replay a fixed list of inbound
//! messages and record everything the client sends. Each inbound message is
//! returned by one `recv()` call, which lets tests count exactly how many
//! upstream messages a turn consumed.
//!
//! ```text
//! client send()  -----> sent      (test reads via FakeConnector::sent)
//! script queue   -----> recv()    (one scripted message per call)
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ChatSocket, SocketConnector};
use crate::conversation::types::ConversationInfo;
use crate::error::{Result, RelayError};

/// What the fake socket does on each `recv()` call.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Deliver this text
    Message(String),
    /// Fail the read
    Fail(String),
}

/// Shared observation state for every socket the connector opened.
#[derive(Debug, Default)]
struct Observed {
    sent: Mutex<Vec<String>>,
    reads: AtomicUsize,
    connections: AtomicUsize,
    closed: AtomicUsize,
}

/// Connector whose sockets replay a script.
#[derive(Debug, Clone)]
pub struct FakeConnector {
    script: Vec<Scripted>,
    observed: Arc<Observed>,
}

impl FakeConnector {
    /// Create a connector replaying `messages` on every connection.
    pub fn new(messages: Vec<String>) -> Self {
        Self::scripted(messages.into_iter().map(Scripted::Message).collect())
    }

    /// Create a connector replaying an explicit script.
    pub fn scripted(script: Vec<Scripted>) -> Self {
        Self {
            script,
            observed: Arc::new(Observed::default()),
        }
    }

    /// Every message the client sent, across all connections.
    pub fn sent(&self) -> Vec<String> {
        self.observed
            .sent
            .lock()
            .expect("FakeConnector: sent lock poisoned")
            .clone()
    }

    /// Number of scripted messages handed to the client.
    pub fn reads(&self) -> usize {
        self.observed.reads.load(Ordering::SeqCst)
    }

    /// Number of sockets opened.
    pub fn connections(&self) -> usize {
        self.observed.connections.load(Ordering::SeqCst)
    }

    /// Number of explicit `close()` calls.
    pub fn closes(&self) -> usize {
        self.observed.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn connect(&self, _info: &ConversationInfo) -> Result<Box<dyn ChatSocket>> {
        self.observed.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSocket {
            script: self.script.clone().into(),
            observed: Arc::clone(&self.observed),
            closed: false,
        }))
    }
}

struct FakeSocket {
    script: VecDeque<Scripted>,
    observed: Arc<Observed>,
    closed: bool,
}

#[async_trait]
impl ChatSocket for FakeSocket {
    async fn send(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(RelayError::TransientSocket("FakeSocket closed".to_string()).into());
        }
        self.observed
            .sent
            .lock()
            .expect("FakeConnector: sent lock poisoned")
            .push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        if self.closed {
            return None;
        }
        let next = self.script.pop_front()?;
        self.observed.reads.fetch_add(1, Ordering::SeqCst);
        Some(match next {
            Scripted::Message(text) => Ok(text),
            Scripted::Fail(reason) => Err(RelayError::TransientSocket(reason).into()),
        })
    }

    async fn close(&mut self) {
        self.closed = true;
        self.observed.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ConversationInfo {
        ConversationInfo {
            conversation_id: "c".to_string(),
            client_id: "u".to_string(),
            conversation_signature: "s".to_string(),
            encrypted_signature: None,
            endpoint: "https://www.bing.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_replays_script_in_order_then_ends() {
        let connector = FakeConnector::new(vec!["a".to_string(), "b".to_string()]);
        let mut socket = connector.connect(&info()).await.unwrap();

        assert_eq!(socket.recv().await.unwrap().unwrap(), "a");
        assert_eq!(socket.recv().await.unwrap().unwrap(), "b");
        assert!(socket.recv().await.is_none());
        assert_eq!(connector.reads(), 2);
    }

    #[tokio::test]
    async fn test_records_sent_messages() {
        let connector = FakeConnector::new(vec![]);
        let mut socket = connector.connect(&info()).await.unwrap();
        socket.send("hello".to_string()).await.unwrap();
        assert_eq!(connector.sent(), vec!["hello".to_string()]);
        assert_eq!(connector.connections(), 1);
    }

    #[tokio::test]
    async fn test_closed_socket_stops_reading() {
        let connector = FakeConnector::new(vec!["a".to_string()]);
        let mut socket = connector.connect(&info()).await.unwrap();
        socket.close().await;
        assert!(socket.recv().await.is_none());
        assert!(socket.send("x".to_string()).await.is_err());
        assert_eq!(connector.reads(), 0);
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let connector = FakeConnector::scripted(vec![Scripted::Fail("reset".to_string())]);
        let mut socket = connector.connect(&info()).await.unwrap();
        assert!(socket.recv().await.unwrap().is_err());
    }
}
