//! Per-channel listener: attaches to a channel's event stream and forwards
//! what the host needs.
//!
//! Only `MessageAdded` reaches the host. Member, typing, update, delete and
//! synchronization events are received and dropped here; hosts read that
//! state from channel snapshots instead.

use chatbridge_backend::{ChannelEvent, ChannelEventStream, ChatChannel};
use chatbridge_protocol::Notification;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::notifier::Notifier;

/// A live listener attachment.
///
/// Dropping the subscription detaches the listener.
#[derive(Debug)]
pub struct Subscription {
    channel_sid: String,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop forwarding. Idempotent; dropping does the same.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Whether the listener is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
        debug!(channel = %self.channel_sid, "Listener detached");
    }
}

/// Attach a listener to `channel`, forwarding through `notifier`.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime.
pub fn attach(channel: &dyn ChatChannel, notifier: Notifier) -> Subscription {
    let channel_sid = channel.sid().to_string();
    let events = channel.subscribe();
    let task = tokio::spawn(listen(channel_sid.clone(), events, notifier));
    debug!(channel = %channel_sid, "Listener attached");

    Subscription { channel_sid, task }
}

async fn listen(channel_sid: String, mut events: ChannelEventStream, notifier: Notifier) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(notification) = translate(&channel_sid, event) {
                    notifier.emit(notification);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(channel = %channel_sid, skipped, "Channel listener lagged");
            }
            Err(RecvError::Closed) => {
                debug!(channel = %channel_sid, "Channel event stream closed");
                break;
            }
        }
    }
}

/// Translate one channel event into at most one host notification.
#[must_use]
pub fn translate(channel_sid: &str, event: ChannelEvent) -> Option<Notification> {
    match event {
        ChannelEvent::MessageAdded(message) => Some(Notification::MessageAdded(message.to_record())),
        ChannelEvent::MessageUpdated { message, reason } => {
            trace!(channel = %channel_sid, message = %message.sid, ?reason, "Message updated");
            None
        }
        ChannelEvent::MessageDeleted(message) => {
            trace!(channel = %channel_sid, message = %message.sid, "Message deleted");
            None
        }
        ChannelEvent::MemberAdded(member) => {
            trace!(channel = %channel_sid, member = %member.identity, "Member added");
            None
        }
        ChannelEvent::MemberUpdated { member, reason } => {
            trace!(channel = %channel_sid, member = %member.identity, ?reason, "Member updated");
            None
        }
        ChannelEvent::MemberDeleted(member) => {
            trace!(channel = %channel_sid, member = %member.identity, "Member deleted");
            None
        }
        ChannelEvent::TypingStarted { member, .. } => {
            trace!(channel = %channel_sid, member = %member.identity, "Typing started");
            None
        }
        ChannelEvent::TypingEnded { member, .. } => {
            trace!(channel = %channel_sid, member = %member.identity, "Typing ended");
            None
        }
        ChannelEvent::SynchronizationChanged { status, .. } => {
            trace!(channel = %channel_sid, ?status, "Channel synchronization changed");
            None
        }
    }
}
