//! Session listener: keeps the registry in step with session events and
//! forwards the ones hosts care about.

use std::sync::Arc;

use chatbridge_backend::{SessionEvent, SessionEventStream};
use chatbridge_protocol::{ErrorRecord, Notification};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::notifier::Notifier;
use crate::registry::ChannelRegistry;

/// Spawn the session listener task.
///
/// The task ends when the session's event stream closes.
pub fn spawn(
    events: SessionEventStream,
    registry: Arc<ChannelRegistry>,
    notifier: Notifier,
) -> JoinHandle<()> {
    tokio::spawn(listen(events, registry, notifier))
}

async fn listen(mut events: SessionEventStream, registry: Arc<ChannelRegistry>, notifier: Notifier) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(notification) = apply(event, &registry) {
                    notifier.emit(notification);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Session listener lagged");
            }
            Err(RecvError::Closed) => {
                debug!("Session event stream closed");
                break;
            }
        }
    }
}

/// Apply one session event to the registry and return the notification to
/// forward, if any.
pub fn apply(event: SessionEvent, registry: &ChannelRegistry) -> Option<Notification> {
    match event {
        SessionEvent::ChannelAdded(handle) => {
            let channel = registry.upsert(handle);
            info!(channel = %channel.sid, "Channel added");
            Some(Notification::ChannelAdded(channel.to_record()))
        }
        SessionEvent::ChannelUpdated { channel, reason } => {
            let channel = registry.refresh_metadata(channel);
            debug!(channel = %channel.sid, ?reason, "Channel updated");
            Some(Notification::ChannelUpdated {
                sid: channel.sid,
                reason,
            })
        }
        SessionEvent::ChannelDeleted(handle) => {
            let sid = handle.sid().to_string();
            registry.remove(&sid);
            info!(channel = %sid, "Channel deleted");
            Some(Notification::ChannelDeleted { sid })
        }
        SessionEvent::ClientSynchronization(status) => {
            info!(?status, "Client synchronization changed");
            Some(Notification::SyncStatusChanged { status })
        }
        SessionEvent::Error(err) => {
            warn!(code = err.code, error = %err.message, "Session error");
            Some(Notification::SessionError(ErrorRecord::new(
                err.code,
                err.message,
            )))
        }
        SessionEvent::ChannelJoined(handle) => {
            trace!(channel = %handle.sid(), "Channel joined");
            None
        }
        SessionEvent::ChannelInvited(handle) => {
            trace!(channel = %handle.sid(), "Channel invited");
            None
        }
        SessionEvent::ChannelSynchronizationChanged(handle) => {
            trace!(channel = %handle.sid(), "Channel synchronization changed");
            None
        }
        SessionEvent::UserUpdated { identity, reason } => {
            trace!(%identity, ?reason, "User updated");
            None
        }
        SessionEvent::UserSubscribed { identity } => {
            trace!(%identity, "User subscribed");
            None
        }
        SessionEvent::UserUnsubscribed { identity } => {
            trace!(%identity, "User unsubscribed");
            None
        }
        SessionEvent::NewMessageNotification {
            channel_sid, index, ..
        } => {
            trace!(channel = %channel_sid, index, "New message push notification");
            None
        }
        SessionEvent::AddedToChannelNotification { channel_sid } => {
            trace!(channel = %channel_sid, "Added to channel push notification");
            None
        }
        SessionEvent::InvitedToChannelNotification { channel_sid } => {
            trace!(channel = %channel_sid, "Invited to channel push notification");
            None
        }
        SessionEvent::RemovedFromChannelNotification { channel_sid } => {
            trace!(channel = %channel_sid, "Removed from channel push notification");
            None
        }
        SessionEvent::NotificationSubscribed => {
            trace!("Push notifications subscribed");
            None
        }
        SessionEvent::NotificationFailed(err) => {
            warn!(code = err.code, error = %err.message, "Push notification registration failed");
            None
        }
        SessionEvent::ConnectionStateChanged(state) => {
            debug!(?state, "Connection state changed");
            None
        }
        SessionEvent::TokenExpired => {
            warn!("Access token expired");
            None
        }
        SessionEvent::TokenAboutToExpire => {
            info!("Access token about to expire");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbridge_backend::{BackendError, ChatChannel, ConnectionState, MemoryBackend};
    use chatbridge_protocol::{ChannelUpdateReason, ClientSyncStatus};

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(Notifier::new(16))
    }

    #[tokio::test]
    async fn test_channel_lifecycle_updates_registry() {
        let registry = registry();
        let backend = MemoryBackend::new("alice", "token");
        let handle: Arc<dyn ChatChannel> = backend.seed_channel("CH1", Some("General"), &["alice"]);

        let added = apply(SessionEvent::ChannelAdded(handle.clone()), &registry);
        assert!(matches!(added, Some(Notification::ChannelAdded(ref r)) if r.sid == "CH1"));
        assert!(registry.contains("CH1"));

        let updated = apply(
            SessionEvent::ChannelUpdated {
                channel: handle.clone(),
                reason: ChannelUpdateReason::FriendlyName,
            },
            &registry,
        );
        assert_eq!(
            updated,
            Some(Notification::ChannelUpdated {
                sid: "CH1".into(),
                reason: ChannelUpdateReason::FriendlyName,
            })
        );

        let deleted = apply(SessionEvent::ChannelDeleted(handle), &registry);
        assert_eq!(deleted, Some(Notification::ChannelDeleted { sid: "CH1".into() }));
        assert!(!registry.contains("CH1"));
    }

    #[tokio::test]
    async fn test_update_for_unknown_channel_registers_it() {
        let registry = registry();
        let backend = MemoryBackend::new("alice", "token");
        let handle = backend.seed_channel("CH9", None, &["alice"]);

        apply(
            SessionEvent::ChannelUpdated {
                channel: handle,
                reason: ChannelUpdateReason::Attributes,
            },
            &registry,
        );
        assert!(registry.contains("CH9"));
    }

    #[test]
    fn test_sync_status_and_errors_are_forwarded() {
        let registry = registry();

        assert_eq!(
            apply(SessionEvent::ClientSynchronization(ClientSyncStatus::Complete), &registry),
            Some(Notification::SyncStatusChanged {
                status: ClientSyncStatus::Complete
            })
        );

        match apply(
            SessionEvent::Error(BackendError::new(50400, "Service unavailable")),
            &registry,
        ) {
            Some(Notification::SessionError(record)) => {
                assert_eq!(record.error_code, "50400");
                assert_eq!(record.error_message, "Service unavailable");
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn test_other_events_are_dropped() {
        let registry = registry();
        let dropped = [
            SessionEvent::UserSubscribed {
                identity: "bob".into(),
            },
            SessionEvent::NotificationSubscribed,
            SessionEvent::ConnectionStateChanged(ConnectionState::Connected),
            SessionEvent::TokenAboutToExpire,
            SessionEvent::TokenExpired,
            SessionEvent::AddedToChannelNotification {
                channel_sid: "CH1".into(),
            },
        ];
        for event in dropped {
            assert!(apply(event, &registry).is_none());
        }
        assert!(registry.is_empty());
    }
}
