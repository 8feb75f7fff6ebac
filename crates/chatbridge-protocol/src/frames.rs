//! Frame types for the host connection.
//!
//! Frames wrap commands, replies and notifications with request correlation
//! and keepalive. Each frame is serialized using MessagePack.

use serde::{Deserialize, Serialize};

use crate::commands::{Command, Reply};
use crate::notifications::Notification;

/// Current protocol version, announced in [`Frame::Connected`].
pub const PROTOCOL_VERSION: u8 = 1;

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Host command awaiting a reply.
    #[serde(rename = "request")]
    Request {
        /// Request ID echoed in the reply.
        id: u64,
        /// The command.
        command: Command,
    },

    /// Successful reply to a request.
    #[serde(rename = "response")]
    Response {
        /// ID of the request.
        id: u64,
        /// The result.
        reply: Reply,
    },

    /// Failed reply to a request.
    #[serde(rename = "error")]
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        /// Stable error code.
        code: String,
        /// Human-readable error message.
        message: String,
    },

    /// Unsolicited notification.
    #[serde(rename = "notification")]
    Notification {
        /// The notification.
        notification: Notification,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Sent by the server once the host connection is established.
    #[serde(rename = "connected")]
    Connected {
        /// Unique connection identifier.
        connection_id: String,
        /// Protocol version.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },
}

impl Frame {
    /// Short name of the frame kind, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Request { .. } => "request",
            Frame::Response { .. } => "response",
            Frame::Error { .. } => "error",
            Frame::Notification { .. } => "notification",
            Frame::Ping { .. } => "ping",
            Frame::Pong { .. } => "pong",
            Frame::Connected { .. } => "connected",
        }
    }

    /// Create a new Request frame.
    #[must_use]
    pub fn request(id: u64, command: Command) -> Self {
        Frame::Request { id, command }
    }

    /// Create a new Response frame.
    #[must_use]
    pub fn response(id: u64, reply: Reply) -> Self {
        Frame::Response { id, reply }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(id: u64, code: impl Into<String>, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a new Notification frame.
    #[must_use]
    pub fn notification(notification: Notification) -> Self {
        Frame::Notification { notification }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version: PROTOCOL_VERSION,
            heartbeat,
        }
    }
}
