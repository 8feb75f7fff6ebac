//! Events pushed by a backend session.
//!
//! Both event sets are closed: consumers match every variant, so a new kind
//! of event is a compile error rather than a silently dropped callback.

use std::sync::Arc;

use chatbridge_protocol::{ChannelUpdateReason, ClientSyncStatus};
use tokio::sync::broadcast;

use crate::traits::{BackendError, ChatChannel};
use crate::types::{ChannelSyncStatus, ConnectionState, Member, Message};

/// Stream of events for one channel.
pub type ChannelEventStream = broadcast::Receiver<ChannelEvent>;

/// Stream of session-level events.
pub type SessionEventStream = broadcast::Receiver<SessionEvent>;

/// Why a message changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageUpdateReason {
    Body,
    Attributes,
}

/// Why a member changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberUpdateReason {
    LastConsumedMessageIndex,
    LastConsumptionTimestamp,
    Attributes,
}

/// Why a user changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserUpdateReason {
    FriendlyName,
    Attributes,
    ReachabilityOnline,
    ReachabilityNotifiable,
}

/// An event on a single channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    MessageAdded(Message),
    MessageUpdated {
        message: Message,
        reason: MessageUpdateReason,
    },
    MessageDeleted(Message),
    MemberAdded(Member),
    MemberUpdated {
        member: Member,
        reason: MemberUpdateReason,
    },
    MemberDeleted(Member),
    TypingStarted {
        channel_sid: String,
        member: Member,
    },
    TypingEnded {
        channel_sid: String,
        member: Member,
    },
    SynchronizationChanged {
        channel_sid: String,
        status: ChannelSyncStatus,
    },
}

/// An event on the session as a whole.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ChannelJoined(Arc<dyn ChatChannel>),
    ChannelInvited(Arc<dyn ChatChannel>),
    ChannelAdded(Arc<dyn ChatChannel>),
    ChannelUpdated {
        channel: Arc<dyn ChatChannel>,
        reason: ChannelUpdateReason,
    },
    ChannelDeleted(Arc<dyn ChatChannel>),
    ChannelSynchronizationChanged(Arc<dyn ChatChannel>),
    Error(BackendError),
    UserUpdated {
        identity: String,
        reason: UserUpdateReason,
    },
    UserSubscribed {
        identity: String,
    },
    UserUnsubscribed {
        identity: String,
    },
    ClientSynchronization(ClientSyncStatus),
    NewMessageNotification {
        channel_sid: String,
        message_sid: String,
        index: u64,
    },
    AddedToChannelNotification {
        channel_sid: String,
    },
    InvitedToChannelNotification {
        channel_sid: String,
    },
    RemovedFromChannelNotification {
        channel_sid: String,
    },
    NotificationSubscribed,
    NotificationFailed(BackendError),
    ConnectionStateChanged(ConnectionState),
    TokenExpired,
    TokenAboutToExpire,
}
