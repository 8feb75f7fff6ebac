//! Channel registry.
//!
//! The registry is the single authority for which channels the bridge knows
//! about. Every entry owns exactly one listener subscription; replacing or
//! removing an entry releases the old subscription before anything else
//! happens to it.

use std::cmp::Ordering;
use std::sync::Arc;

use chatbridge_backend::{Channel, ChatChannel};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::channel::{self, Subscription};
use crate::error::BridgeError;
use crate::notifier::Notifier;

/// A registered channel and its listener.
struct RegistryEntry {
    channel: Channel,
    handle: Arc<dyn ChatChannel>,
    subscription: Subscription,
}

/// Registry of known channels keyed by sid.
pub struct ChannelRegistry {
    entries: DashMap<String, RegistryEntry>,
    notifier: Notifier,
}

impl ChannelRegistry {
    /// Create an empty registry whose listeners forward through `notifier`.
    #[must_use]
    pub fn new(notifier: Notifier) -> Self {
        Self {
            entries: DashMap::new(),
            notifier,
        }
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            channel_count: self.entries.len(),
            active_subscriptions: self
                .entries
                .iter()
                .filter(|e| e.subscription.is_active())
                .count(),
        }
    }

    /// Register `handle`, replacing any entry with the same sid.
    ///
    /// A replaced entry's listener is detached before the new listener is
    /// attached, so a channel never has two live listeners.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn upsert(&self, handle: Arc<dyn ChatChannel>) -> Channel {
        let sid = handle.sid().to_string();
        let channel = handle.snapshot();

        match self.entries.entry(sid) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                // Detach first; the old subscription is dropped on replacement.
                entry.subscription.abort();
                entry.subscription = channel::attach(handle.as_ref(), self.notifier.clone());
                entry.channel = channel.clone();
                entry.handle = handle;
                debug!(channel = %channel.sid, "Channel re-registered");
            }
            Entry::Vacant(vacant) => {
                let subscription = channel::attach(handle.as_ref(), self.notifier.clone());
                vacant.insert(RegistryEntry {
                    channel: channel.clone(),
                    handle,
                    subscription,
                });
                debug!(channel = %channel.sid, "Channel registered");
            }
        }

        channel
    }

    /// Register `handle` only if it is unknown or its listener has stopped.
    /// Known channels with a live listener just get fresh metadata.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn ensure(&self, handle: Arc<dyn ChatChannel>) -> Channel {
        let live = self
            .entries
            .get(handle.sid())
            .is_some_and(|e| e.subscription.is_active());

        if live {
            self.refresh_metadata(handle)
        } else {
            self.upsert(handle)
        }
    }

    /// Refresh the stored metadata of a known channel without touching its
    /// listener. Unknown channels are registered.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn refresh_metadata(&self, handle: Arc<dyn ChatChannel>) -> Channel {
        if let Some(mut entry) = self.entries.get_mut(handle.sid()) {
            entry.channel = handle.snapshot();
            entry.handle = handle;
            return entry.channel.clone();
        }

        self.upsert(handle)
    }

    /// Look up a channel's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] if the channel is not registered.
    pub fn get(&self, sid: &str) -> Result<Channel, BridgeError> {
        self.entries
            .get(sid)
            .map(|e| e.channel.clone())
            .ok_or_else(|| BridgeError::NotFound(sid.to_string()))
    }

    /// Look up the backend handle of a registered channel.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] if the channel is not registered.
    pub fn handle(&self, sid: &str) -> Result<Arc<dyn ChatChannel>, BridgeError> {
        self.entries
            .get(sid)
            .map(|e| Arc::clone(&e.handle))
            .ok_or_else(|| BridgeError::NotFound(sid.to_string()))
    }

    /// Remove a channel and detach its listener. Removing an unknown sid is a
    /// no-op.
    pub fn remove(&self, sid: &str) -> Option<Channel> {
        let (_, entry) = self.entries.remove(sid)?;
        debug!(channel = %sid, "Channel removed");
        Some(entry.channel)
    }

    /// All registered channels, most recent message first.
    ///
    /// Recency is read from the live handles, so messages that arrived since
    /// registration count. Channels without messages sort last; ties are
    /// broken by sid.
    #[must_use]
    pub fn list_sorted_by_recency(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self
            .entries
            .iter_mut()
            .map(|mut e| {
                let snapshot = e.handle.snapshot();
                e.channel = snapshot.clone();
                snapshot
            })
            .collect();

        channels.sort_by(compare_recency);
        channels
    }

    /// Check if a channel is registered.
    #[must_use]
    pub fn contains(&self, sid: &str) -> bool {
        self.entries.contains_key(sid)
    }

    /// Number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no channel is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and its listener.
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        info!(channels = count, "Channel registry cleared");
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.entries.len())
            .finish_non_exhaustive()
    }
}

fn compare_recency(a: &Channel, b: &Channel) -> Ordering {
    match (a.last_message_at, b.last_message_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.sid.cmp(&b.sid))
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of registered channels.
    pub channel_count: usize,
    /// Number of listeners still running.
    pub active_subscriptions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbridge_backend::MemoryBackend;
    use std::time::Duration;
    use tokio::time::timeout;

    fn registry() -> (ChannelRegistry, Notifier) {
        let notifier = Notifier::new(64);
        (ChannelRegistry::new(notifier.clone()), notifier)
    }

    async fn settle_listeners(channel: &chatbridge_backend::MemoryChannel, expected: usize) {
        timeout(Duration::from_secs(1), async {
            while channel.listener_count() != expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("listener count did not settle");
    }

    #[tokio::test]
    async fn test_registry_upsert_get_remove() {
        let (registry, _) = registry();
        let backend = MemoryBackend::new("alice", "token");
        let general = backend.seed_channel("CH1", Some("General"), &["alice"]);

        let channel = registry.upsert(general.clone());
        assert_eq!(channel.sid, "CH1");
        assert_eq!(registry.get("CH1").unwrap().friendly_name.as_deref(), Some("General"));
        assert!(registry.contains("CH1"));
        assert_eq!(general.listener_count(), 1);

        assert!(registry.remove("CH1").is_some());
        assert!(matches!(registry.get("CH1"), Err(BridgeError::NotFound(_))));
        settle_listeners(&general, 0).await;

        assert!(registry.remove("CH1").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_registry_upsert_keeps_single_listener() {
        let (registry, notifier) = registry();
        let mut notifications = notifier.subscribe();
        let backend = MemoryBackend::new("alice", "token");
        let general = backend.seed_channel("CH1", Some("General"), &["alice"]);

        for _ in 0..5 {
            registry.upsert(general.clone());
        }
        settle_listeners(&general, 1).await;
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.stats().active_subscriptions, 1);

        general.post("bob", "once");
        let first = timeout(Duration::from_secs(1), notifications.recv())
            .await
            .expect("notification timeout")
            .expect("notification receive");
        assert_eq!(first.event_name(), "messageAdded");

        tokio::task::yield_now().await;
        assert!(notifications.try_recv().is_err(), "message delivered twice");
    }

    #[tokio::test]
    async fn test_registry_refresh_keeps_listener() {
        let (registry, _) = registry();
        let backend = MemoryBackend::new("alice", "token");
        let general = backend.seed_channel("CH1", Some("General"), &["alice"]);
        registry.upsert(general.clone());

        backend.rename_channel("CH1", "Lobby");
        let refreshed = registry.refresh_metadata(general.clone());
        assert_eq!(refreshed.friendly_name.as_deref(), Some("Lobby"));
        assert_eq!(registry.get("CH1").unwrap().friendly_name.as_deref(), Some("Lobby"));
        assert_eq!(general.listener_count(), 1);

        registry.ensure(general.clone());
        assert_eq!(general.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_registry_sorted_by_recency() {
        let (registry, _) = registry();
        let backend = MemoryBackend::new("alice", "token");
        let quiet = backend.seed_channel("CH-quiet", None, &["alice"]);
        let older = backend.seed_channel("CH-older", None, &["alice"]);
        let newer = backend.seed_channel("CH-newer", None, &["alice"]);

        older.post("bob", "first");
        newer.post("bob", "second");
        for handle in [quiet, older.clone(), newer] {
            registry.upsert(handle);
        }

        let order: Vec<String> = registry
            .list_sorted_by_recency()
            .into_iter()
            .map(|c| c.sid)
            .collect();
        assert_eq!(order, ["CH-newer", "CH-older", "CH-quiet"]);

        // Activity after registration is picked up.
        older.post("bob", "third");
        let head = registry.list_sorted_by_recency().remove(0);
        assert_eq!(head.sid, "CH-older");
    }

    #[tokio::test]
    async fn test_registry_clear_detaches_everything() {
        let (registry, _) = registry();
        let backend = MemoryBackend::new("alice", "token");
        let a = backend.seed_channel("CH1", None, &["alice"]);
        let b = backend.seed_channel("CH2", None, &["alice"]);
        registry.upsert(a.clone());
        registry.upsert(b.clone());
        assert_eq!(registry.stats().channel_count, 2);

        registry.clear();
        assert!(registry.is_empty());
        settle_listeners(&a, 0).await;
        settle_listeners(&b, 0).await;
    }

    #[test]
    fn test_compare_recency_orders_missing_last() {
        let mut a = Channel::new("a");
        let mut b = Channel::new("b");
        let c = Channel::new("c");
        a.last_message_at = Some(10);
        b.last_message_at = Some(20);

        let mut channels = vec![c, a, b];
        channels.sort_by(compare_recency);
        let order: Vec<&str> = channels.iter().map(|c| c.sid.as_str()).collect();
        assert_eq!(order, ["b", "a", "c"]);
    }
}
