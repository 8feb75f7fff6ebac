//! Outbound notification fan-out.

use chatbridge_protocol::Notification;
use tokio::sync::broadcast;
use tracing::trace;

/// Default notification buffer per subscriber.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

/// Receiver side handed to hosts.
pub type NotificationStream = broadcast::Receiver<Notification>;

/// Fire-and-forget sender shared by every adapter.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Create a notifier buffering up to `capacity` notifications per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Attach a new host subscriber.
    pub fn subscribe(&self) -> NotificationStream {
        self.tx.subscribe()
    }

    /// Number of attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Push a notification to every subscriber.
    ///
    /// Returns the number of subscribers reached. Having none is not an
    /// error; lagging subscribers are handled by `broadcast`.
    pub fn emit(&self, notification: Notification) -> usize {
        trace!(
            event = notification.event_name(),
            channel = notification.channel_sid().unwrap_or("-"),
            "Emitting notification"
        );
        self.tx.send(notification).unwrap_or_default()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fans_out_to_every_subscriber() {
        let notifier = Notifier::new(8);
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        let reached = notifier.emit(Notification::ChannelDeleted { sid: "CH1".into() });
        assert_eq!(reached, 2);

        assert_eq!(a.recv().await.unwrap(), b.recv().await.unwrap());
    }

    #[test]
    fn test_emit_without_subscribers() {
        let notifier = Notifier::default();
        assert_eq!(notifier.subscriber_count(), 0);
        assert_eq!(
            notifier.emit(Notification::ChannelDeleted { sid: "CH1".into() }),
            0
        );
    }
}
