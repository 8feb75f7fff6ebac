//! Backend session contract.
//!
//! These traits describe what the bridge needs from a chat backend. Every
//! completion is an `async fn` result and every listener is an event stream,
//! so implementations can wrap callback-based SDKs without leaking callbacks
//! into the bridge.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::events::{ChannelEventStream, SessionEventStream};
use crate::types::{Channel, ConnectionState, Message};

/// Error reported by the backend: a numeric code plus a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("backend error {code}: {message}")]
pub struct BackendError {
    /// Backend-defined error code.
    pub code: u32,
    /// Human-readable message.
    pub message: String,
}

impl BackendError {
    /// Construct a new backend error.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A live session and the event stream that was attached when it was
/// created.
///
/// The stream is created before the backend can emit anything, so a caller
/// that consumes `events` never misses a session event.
pub struct Connected {
    /// The authenticated session.
    pub session: Arc<dyn ChatSession>,
    /// Session-level events.
    pub events: SessionEventStream,
}

impl fmt::Debug for Connected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connected")
            .field("identity", &self.session.identity())
            .finish_non_exhaustive()
    }
}

/// A chat backend that can open sessions.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Authenticate with an access token and open a session.
    async fn connect(&self, token: &str) -> Result<Connected, BackendError>;

    /// Backend name (e.g., "memory").
    fn name(&self) -> &'static str;
}

/// One authenticated connection to the backend.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Identity the session is authenticated as.
    fn identity(&self) -> &str;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Channels the identity is subscribed to, most recent message first.
    async fn subscribed_channels(&self) -> Result<Vec<Arc<dyn ChatChannel>>, BackendError>;

    /// Close the session. Event streams end afterwards.
    async fn shutdown(&self);
}

/// A backend channel handle.
#[async_trait]
pub trait ChatChannel: Send + Sync + fmt::Debug {
    /// Channel identifier.
    fn sid(&self) -> &str;

    /// Current metadata as the backend knows it.
    fn snapshot(&self) -> Channel;

    /// Attach a new listener to this channel's events.
    fn subscribe(&self) -> ChannelEventStream;

    /// Send a text message. The message is also pushed to every listener.
    async fn send_message(&self, body: &str) -> Result<Message, BackendError>;

    /// The newest `count` messages, oldest first. Backends may return fewer
    /// than asked for.
    async fn last_messages(&self, count: usize) -> Result<Vec<Message>, BackendError>;

    /// Up to `count` messages starting at `index`, oldest first.
    ///
    /// Backends differ on whether the message at `index` itself is included;
    /// callers must filter.
    async fn messages_after(&self, index: u64, count: usize)
        -> Result<Vec<Message>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::new(20101, "Invalid Access Token");
        assert_eq!(err.to_string(), "backend error 20101: Invalid Access Token");
    }
}
