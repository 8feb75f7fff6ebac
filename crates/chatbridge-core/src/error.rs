use chatbridge_backend::BackendError;
use thiserror::Error;

/// Errors returned by bridge commands.
///
/// Unsolicited backend errors never show up here; they are delivered as
/// `sessionError` notifications.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The backend rejected the access token.
    #[error("Authentication failed ({code}): {message}")]
    Auth { code: u32, message: String },

    /// The channel is not registered. Raised without contacting the backend.
    #[error("Channel not found: {0}")]
    NotFound(String),

    /// The backend rejected a message.
    #[error("Send failed ({code}): {message}")]
    Send { code: u32, message: String },

    /// The backend failed a history or channel-list fetch.
    #[error("Fetch failed ({code}): {message}")]
    Fetch { code: u32, message: String },

    /// A session-scoped command arrived before `initialize`.
    #[error("Session not initialized")]
    NotInitialized,

    /// `initialize` was called while a session is active.
    #[error("Session already initialized")]
    AlreadyInitialized,
}

impl BridgeError {
    pub(crate) fn auth(err: BackendError) -> Self {
        BridgeError::Auth {
            code: err.code,
            message: err.message,
        }
    }

    pub(crate) fn send(err: BackendError) -> Self {
        BridgeError::Send {
            code: err.code,
            message: err.message,
        }
    }

    pub(crate) fn fetch(err: BackendError) -> Self {
        BridgeError::Fetch {
            code: err.code,
            message: err.message,
        }
    }

    /// Short, stable error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Auth { .. } => "auth_error",
            BridgeError::NotFound(_) => "not_found",
            BridgeError::Send { .. } => "send_error",
            BridgeError::Fetch { .. } => "fetch_error",
            BridgeError::NotInitialized => "not_initialized",
            BridgeError::AlreadyInitialized => "already_initialized",
        }
    }

    /// Code reported to the host: the backend's own code when the backend
    /// produced the error, the error kind otherwise.
    #[must_use]
    pub fn wire_code(&self) -> String {
        match self {
            BridgeError::Auth { code, .. }
            | BridgeError::Send { code, .. }
            | BridgeError::Fetch { code, .. } => code.to_string(),
            other => other.kind().to_string(),
        }
    }

    /// Message reported to the host.
    #[must_use]
    pub fn wire_message(&self) -> String {
        match self {
            BridgeError::Auth { message, .. }
            | BridgeError::Send { message, .. }
            | BridgeError::Fetch { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_codes_pass_through() {
        let err = BridgeError::send(BackendError::new(50511, "Message too long"));
        assert_eq!(err.kind(), "send_error");
        assert_eq!(err.wire_code(), "50511");
        assert_eq!(err.wire_message(), "Message too long");
    }

    #[test]
    fn test_local_errors_use_kind_as_code() {
        let err = BridgeError::NotFound("CH1".into());
        assert_eq!(err.wire_code(), "not_found");
        assert_eq!(err.wire_message(), "Channel not found: CH1");
    }
}
