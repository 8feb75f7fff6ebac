//! Data model shared by every backend implementation.

use chatbridge_protocol::{ChannelRecord, MessageRecord};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Per-channel synchronization progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelSyncStatus {
    /// Nothing has been fetched yet.
    #[default]
    None,
    /// Only the identifier is known.
    Identifier,
    /// Metadata (names, attributes) is available.
    Metadata,
    /// Metadata, members and messages are available.
    All,
    /// Synchronization failed.
    Failed,
}

/// Point-in-time view of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Backend-assigned identifier.
    pub sid: String,
    /// Unique (display) name.
    pub unique_name: Option<String>,
    /// Human-friendly name.
    pub friendly_name: Option<String>,
    /// Member identities in backend order.
    pub members: Vec<String>,
    /// Synchronization progress.
    pub sync_status: ChannelSyncStatus,
    /// Creation time of the newest message, if any.
    pub last_message_at: Option<u64>,
}

impl Channel {
    /// Create a channel view with only an identifier.
    #[must_use]
    pub fn new(sid: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            unique_name: None,
            friendly_name: None,
            members: Vec::new(),
            sync_status: ChannelSyncStatus::None,
            last_message_at: None,
        }
    }

    /// Host-facing record for this channel.
    #[must_use]
    pub fn to_record(&self) -> ChannelRecord {
        ChannelRecord {
            sid: self.sid.clone(),
            unique_name: self.unique_name.clone(),
            friendly_name: self.friendly_name.clone(),
            members: self.members.clone(),
        }
    }
}

/// A channel message. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Identifier, unique within the channel.
    pub sid: String,
    /// Owning channel identifier.
    pub channel_sid: String,
    /// Text body. May be empty.
    pub body: String,
    /// Author identity.
    pub author: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub date_created: u64,
    /// Per-channel, monotonically increasing index.
    pub index: u64,
}

impl Message {
    /// Host-facing record for this message.
    #[must_use]
    pub fn to_record(&self) -> MessageRecord {
        MessageRecord {
            sid: self.sid.clone(),
            channel_sid: self.channel_sid.clone(),
            body: self.body.clone(),
            timestamp: self.date_created,
            author: self.author.clone(),
            index: self.index,
        }
    }
}

/// A channel member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Member identity.
    pub identity: String,
    /// Index of the last message this member has read.
    pub last_consumed_index: Option<u64>,
}

impl Member {
    /// Create a member with no read horizon.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            last_consumed_index: None,
        }
    }
}

/// State of the connection between the session and the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Denied,
    Error,
}
