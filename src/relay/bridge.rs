//! Client lifetime to upstream cancellation
//!
//! axum drops the response body of a streaming request, or the handler
//! future of a non-streaming one, as soon as the inbound connection goes
//! away. A [`ClientLifetime`] lives inside whichever of the two outlives the
//! other and cancels the turn's token when it is dropped, so the upstream
//! socket is closed without a separate watcher task.
//!
//! A turn that finished normally calls [`ClientLifetime::complete`] first,
//! which disarms the guard.

use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancels its token when dropped before [`ClientLifetime::complete`].
#[derive(Debug)]
pub struct ClientLifetime {
    token: CancellationToken,
    guard: Option<DropGuard>,
}

impl ClientLifetime {
    /// Arm a new lifetime with a fresh token.
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Arm a lifetime around an existing token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            guard: Some(token.clone().drop_guard()),
            token,
        }
    }

    /// Token for the upstream turn.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The turn finished; dropping no longer cancels.
    pub fn complete(mut self) {
        if let Some(guard) = self.guard.take() {
            guard.disarm();
        }
    }
}

impl Default for ClientLifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ClientLifetime {
    fn drop(&mut self) {
        if self.guard.is_some() {
            tracing::debug!("Client went away mid-turn; cancelling upstream");
        }
    }
}
