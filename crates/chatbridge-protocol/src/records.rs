//! Flat records exchanged with the host.
//!
//! Every record serializes to a map with camelCase keys so hosts can consume
//! it without knowing anything about the Rust types behind it.

use serde::{Deserialize, Serialize};

/// A channel as presented to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    /// Backend-assigned channel identifier.
    pub sid: String,
    /// Unique (display) name, if the channel has one.
    pub unique_name: Option<String>,
    /// Human-friendly name, if the channel has one.
    pub friendly_name: Option<String>,
    /// Member identities in backend order.
    pub members: Vec<String>,
}

/// A message as presented to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Message identifier, unique within its channel.
    pub sid: String,
    /// Owning channel identifier.
    pub channel_sid: String,
    /// Message text. May be empty.
    pub body: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Author identity.
    pub author: String,
    /// Per-channel message index, used as the pagination cursor.
    pub index: u64,
}

/// Error payload for unsolicited error notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Backend error code, stringified.
    pub error_code: String,
    /// Human-readable message.
    pub error_message: String,
}

impl ErrorRecord {
    /// Create a new error record.
    #[must_use]
    pub fn new(code: impl ToString, message: impl Into<String>) -> Self {
        Self {
            error_code: code.to_string(),
            error_message: message.into(),
        }
    }
}

/// Client-level synchronization progress reported by the backend.
///
/// The adapter layer passes these through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientSyncStatus {
    /// Synchronization has started.
    Started,
    /// The list of channels is known, channel details are still loading.
    ChannelsKnown,
    /// Every channel has been fetched.
    ChannelsComplete,
    /// Synchronization finished.
    Complete,
    /// Synchronization failed.
    Failed,
}

/// What changed on a channel, as reported with a channel update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelUpdateReason {
    Status,
    LastConsumedMessageIndex,
    UniqueName,
    FriendlyName,
    Attributes,
    LastMessage,
    NotificationLevel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_record_uses_camel_case_keys() {
        let record = ChannelRecord {
            sid: "CH1".into(),
            unique_name: Some("general".into()),
            friendly_name: None,
            members: vec!["alice".into(), "bob".into()],
        };

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "sid": "CH1",
                "uniqueName": "general",
                "friendlyName": null,
                "members": ["alice", "bob"],
            })
        );
    }

    #[test]
    fn message_record_carries_channel_sid() {
        let record = MessageRecord {
            sid: "IM1".into(),
            channel_sid: "CH1".into(),
            body: String::new(),
            timestamp: 1_700_000_000_000,
            author: "alice".into(),
            index: 7,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["channelSid"], "CH1");
        assert_eq!(value["body"], "");
        assert_eq!(value["index"], 7);
    }

    #[test]
    fn sync_status_uses_camel_case() {
        assert_eq!(
            serde_json::to_value(ClientSyncStatus::ChannelsKnown).unwrap(),
            json!("channelsKnown")
        );
    }
}
