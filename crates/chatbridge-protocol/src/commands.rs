//! Commands issued by the host and the replies the bridge returns.

use serde::{Deserialize, Serialize};

use crate::records::{ChannelRecord, MessageRecord};

/// A host-originated command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Command {
    /// Create the session with an access token.
    Initialize {
        /// Access token issued to the host.
        token: String,
    },

    /// List the subscribed channels, most recently active first.
    ListChannels,

    /// Send a text message to a channel.
    SendMessage {
        /// Target channel.
        sid: String,
        /// Message text.
        body: String,
    },

    /// Fetch one page of messages with an index greater than `index`.
    FetchMessagesAfter {
        /// Target channel.
        sid: String,
        /// Highest index the host has already seen.
        index: u64,
    },

    /// Fetch the newest message of a channel.
    FetchLastMessage {
        /// Target channel.
        sid: String,
    },
}

impl Command {
    /// Wire name of this command.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Command::Initialize { .. } => "initialize",
            Command::ListChannels => "listChannels",
            Command::SendMessage { .. } => "sendMessage",
            Command::FetchMessagesAfter { .. } => "fetchMessagesAfter",
            Command::FetchLastMessage { .. } => "fetchLastMessage",
        }
    }

    /// The channel a command targets, if it is channel-scoped.
    #[must_use]
    pub fn channel_sid(&self) -> Option<&str> {
        match self {
            Command::SendMessage { sid, .. }
            | Command::FetchMessagesAfter { sid, .. }
            | Command::FetchLastMessage { sid } => Some(sid),
            Command::Initialize { .. } | Command::ListChannels => None,
        }
    }
}

/// Successful result of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Reply {
    /// Result of `initialize`.
    Initialized(bool),
    /// Result of `listChannels`.
    Channels(Vec<ChannelRecord>),
    /// Result of `sendMessage`.
    Sent(bool),
    /// Result of `fetchMessagesAfter`.
    Messages(Vec<MessageRecord>),
    /// Result of `fetchLastMessage`; `None` when the channel has no messages.
    LastMessage(Option<MessageRecord>),
}
