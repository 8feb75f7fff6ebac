//! Outbound notifications pushed from the bridge to the host.
//!
//! Notifications are fire-and-forget: the host never acknowledges them.

use serde::{Deserialize, Serialize};

use crate::records::{ChannelRecord, ChannelUpdateReason, ClientSyncStatus, ErrorRecord, MessageRecord};

/// A notification delivered to the host.
///
/// Serialized as a flat map tagged with an `event` key, for example
/// `{"event": "channelDeleted", "sid": "CH1"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Notification {
    /// A channel became known to the session.
    ChannelAdded(ChannelRecord),

    /// A known channel changed.
    ChannelUpdated {
        /// Channel identifier.
        sid: String,
        /// What changed.
        reason: ChannelUpdateReason,
    },

    /// A channel was deleted.
    ChannelDeleted {
        /// Channel identifier.
        sid: String,
    },

    /// A new message arrived on a registered channel.
    MessageAdded(MessageRecord),

    /// Client synchronization progressed.
    SyncStatusChanged {
        /// Backend-reported status.
        status: ClientSyncStatus,
    },

    /// Session initialization failed.
    InitializationError(ErrorRecord),

    /// The backend reported an error outside of any pending operation.
    SessionError(ErrorRecord),
}

impl Notification {
    /// Wire name of this notification.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Notification::ChannelAdded(_) => "channelAdded",
            Notification::ChannelUpdated { .. } => "channelUpdated",
            Notification::ChannelDeleted { .. } => "channelDeleted",
            Notification::MessageAdded(_) => "messageAdded",
            Notification::SyncStatusChanged { .. } => "syncStatusChanged",
            Notification::InitializationError(_) => "initializationError",
            Notification::SessionError(_) => "sessionError",
        }
    }

    /// The channel this notification is about, if any.
    #[must_use]
    pub fn channel_sid(&self) -> Option<&str> {
        match self {
            Notification::ChannelAdded(record) => Some(&record.sid),
            Notification::ChannelUpdated { sid, .. } | Notification::ChannelDeleted { sid } => {
                Some(sid)
            }
            Notification::MessageAdded(record) => Some(&record.channel_sid),
            Notification::SyncStatusChanged { .. }
            | Notification::InitializationError(_)
            | Notification::SessionError(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notifications_are_flat_tagged_maps() {
        let deleted = Notification::ChannelDeleted { sid: "CH1".into() };
        assert_eq!(
            serde_json::to_value(&deleted).unwrap(),
            json!({"event": "channelDeleted", "sid": "CH1"})
        );

        let updated = Notification::ChannelUpdated {
            sid: "CH1".into(),
            reason: ChannelUpdateReason::FriendlyName,
        };
        assert_eq!(
            serde_json::to_value(&updated).unwrap(),
            json!({"event": "channelUpdated", "sid": "CH1", "reason": "friendlyName"})
        );

        let error = Notification::SessionError(ErrorRecord::new(50_000, "boom"));
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"event": "sessionError", "errorCode": "50000", "errorMessage": "boom"})
        );
    }

    #[test]
    fn event_names_match_serialized_tags() {
        let notifications = [
            Notification::ChannelDeleted { sid: "CH1".into() },
            Notification::SyncStatusChanged {
                status: ClientSyncStatus::Complete,
            },
            Notification::InitializationError(ErrorRecord::new(20_101, "bad token")),
            Notification::MessageAdded(MessageRecord {
                sid: "IM1".into(),
                channel_sid: "CH1".into(),
                body: "hi".into(),
                timestamp: 0,
                author: "alice".into(),
                index: 0,
            }),
        ];

        for notification in notifications {
            let value = serde_json::to_value(&notification).unwrap();
            assert_eq!(value["event"], notification.event_name());
        }
    }

    #[test]
    fn channel_sid_lookup() {
        let deleted = Notification::ChannelDeleted { sid: "CH9".into() };
        assert_eq!(deleted.channel_sid(), Some("CH9"));

        let sync = Notification::SyncStatusChanged {
            status: ClientSyncStatus::Started,
        };
        assert_eq!(sync.channel_sid(), None);
    }
}
