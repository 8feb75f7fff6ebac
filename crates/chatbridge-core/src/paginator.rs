//! History fetches and message sends against registered channels.
//!
//! Every operation resolves the channel through the registry first, so an
//! unknown sid fails with [`BridgeError::NotFound`] before the backend is
//! contacted.

use std::sync::Arc;

use chatbridge_backend::Message;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::registry::ChannelRegistry;

/// Largest page `messages_after` returns.
pub const MAX_PAGE_SIZE: usize = 300;

/// Largest count `last_messages` returns.
pub const MAX_LAST_MESSAGES: usize = 100;

/// Page size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginatorConfig {
    /// Upper bound for `messages_after` pages.
    pub max_page_size: usize,
    /// Upper bound for `last_messages`.
    pub max_last_messages: usize,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            max_page_size: MAX_PAGE_SIZE,
            max_last_messages: MAX_LAST_MESSAGES,
        }
    }
}

/// Bounded history access.
#[derive(Debug)]
pub struct Paginator {
    registry: Arc<ChannelRegistry>,
    config: PaginatorConfig,
}

impl Paginator {
    /// Create a paginator over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ChannelRegistry>, config: PaginatorConfig) -> Self {
        Self { registry, config }
    }

    /// Largest page this paginator returns.
    #[must_use]
    pub fn max_page_size(&self) -> usize {
        self.config.max_page_size.max(1)
    }

    /// The newest `count` messages of a channel, oldest first.
    ///
    /// `count` is clamped to `1..=max_last_messages`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotFound`] for unknown channels, [`BridgeError::Fetch`]
    /// if the backend fails.
    pub async fn last_messages(&self, sid: &str, count: usize) -> Result<Vec<Message>, BridgeError> {
        let channel = self.registry.handle(sid)?;
        let count = count.clamp(1, self.config.max_last_messages.max(1));

        let mut messages = channel.last_messages(count).await.map_err(|e| {
            warn!(channel = %sid, code = e.code, error = %e.message, "Fetching last messages failed");
            BridgeError::fetch(e)
        })?;

        messages.sort_by_key(|m| m.index);
        messages.dedup_by_key(|m| m.index);
        if messages.len() > count {
            messages = messages.split_off(messages.len() - count);
        }

        debug!(channel = %sid, requested = count, returned = messages.len(), "Fetched last messages");
        Ok(messages)
    }

    /// Up to `page_size` messages with index strictly greater than `cursor`,
    /// ascending by index.
    ///
    /// `page_size` is clamped to `1..=max_page_size`. Calling again with the
    /// last returned index as the cursor walks the rest of the history.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotFound`] for unknown channels, [`BridgeError::Fetch`]
    /// if the backend fails.
    pub async fn messages_after(
        &self,
        sid: &str,
        cursor: u64,
        page_size: usize,
    ) -> Result<Vec<Message>, BridgeError> {
        let channel = self.registry.handle(sid)?;
        let page_size = page_size.clamp(1, self.max_page_size());

        // One extra: some backends include the message at the cursor.
        let mut anchor = cursor;
        let mut messages = loop {
            let mut raw = channel
                .messages_after(anchor, page_size.saturating_add(1))
                .await
                .map_err(|e| {
                    warn!(channel = %sid, cursor, code = e.code, error = %e.message, "Fetching messages failed");
                    BridgeError::fetch(e)
                })?;

            let Some(highest) = raw.iter().map(|m| m.index).max() else {
                break raw;
            };
            raw.retain(|m| m.index > cursor);
            let reached = highest.max(anchor);
            if !raw.is_empty() || reached == u64::MAX {
                break raw;
            }
            // Only the anchor came back; a ceiling below two hides the rest.
            anchor = reached + 1;
        };

        messages.sort_by_key(|m| m.index);
        messages.dedup_by_key(|m| m.index);
        messages.truncate(page_size);

        debug!(channel = %sid, cursor, returned = messages.len(), "Fetched message page");
        Ok(messages)
    }

    /// Send a text message to a registered channel.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotFound`] for unknown channels, [`BridgeError::Send`]
    /// if the backend rejects the message.
    pub async fn send_message(&self, sid: &str, body: &str) -> Result<Message, BridgeError> {
        let channel = self.registry.handle(sid)?;

        let message = channel.send_message(body).await.map_err(|e| {
            warn!(channel = %sid, code = e.code, error = %e.message, "Sending message failed");
            BridgeError::send(e)
        })?;

        debug!(channel = %sid, index = message.index, "Message sent");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Notifier;
    use chatbridge_backend::{BackendError, MemoryBackend, MemoryBackendConfig, MemoryChannel};

    fn setup(messages: usize) -> (Paginator, Arc<MemoryChannel>) {
        let registry = Arc::new(ChannelRegistry::new(Notifier::new(1024)));
        let backend = MemoryBackend::new("alice", "token");
        let channel = backend.seed_channel("CH1", Some("General"), &["alice", "bob"]);
        for i in 0..messages {
            channel.post("bob", &format!("message {i}"));
        }
        registry.upsert(channel.clone());

        (
            Paginator::new(registry, PaginatorConfig::default()),
            channel,
        )
    }

    fn indices(messages: &[Message]) -> Vec<u64> {
        messages.iter().map(|m| m.index).collect()
    }

    #[tokio::test]
    async fn test_messages_after_excludes_cursor() {
        let (paginator, _channel) = setup(10);

        let page = paginator.messages_after("CH1", 4, 300).await.unwrap();
        assert_eq!(indices(&page), [5, 6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn test_messages_after_caps_page_size() {
        let (paginator, _channel) = setup(350);

        let page = paginator.messages_after("CH1", 0, 10_000).await.unwrap();
        assert_eq!(page.len(), MAX_PAGE_SIZE);
        assert_eq!(page.first().map(|m| m.index), Some(1));
        assert_eq!(page.last().map(|m| m.index), Some(300));
    }

    #[tokio::test]
    async fn test_messages_after_walks_history() {
        let (paginator, _channel) = setup(25);

        let mut cursor = 0;
        let mut seen = vec![0];
        loop {
            let page = paginator.messages_after("CH1", cursor, 7).await.unwrap();
            let Some(last) = page.last() else { break };
            assert!(page.iter().all(|m| m.index > cursor));
            cursor = last.index;
            seen.extend(indices(&page));
        }

        assert_eq!(seen, (0..25).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_messages_after_past_end_is_empty() {
        let (paginator, _channel) = setup(3);
        assert!(paginator.messages_after("CH1", 2, 300).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_messages_after_single_message_ceiling() {
        let registry = Arc::new(ChannelRegistry::new(Notifier::new(1024)));
        let backend = MemoryBackend::with_config(MemoryBackendConfig {
            identity: "alice".into(),
            accepted_tokens: vec!["token".into()],
            fetch_ceiling: 1,
        });
        let channel = backend.seed_channel("CH1", None, &["alice", "bob"]);
        for i in 0..5 {
            channel.post("bob", &format!("message {i}"));
        }
        registry.upsert(channel.clone());
        let paginator = Paginator::new(registry, PaginatorConfig::default());

        let page = paginator.messages_after("CH1", 1, 300).await.unwrap();
        assert_eq!(indices(&page), [2]);

        let mut cursor = 1;
        let mut seen = Vec::new();
        loop {
            let page = paginator.messages_after("CH1", cursor, 300).await.unwrap();
            let Some(last) = page.last() else { break };
            cursor = last.index;
            seen.extend(indices(&page));
        }
        assert_eq!(seen, [2, 3, 4]);
    }

    #[tokio::test]
    async fn test_messages_after_unbounded_page_size() {
        let (paginator, _channel) = setup(5);
        let paginator = Paginator::new(
            paginator.registry.clone(),
            PaginatorConfig {
                max_page_size: usize::MAX,
                ..PaginatorConfig::default()
            },
        );

        let page = paginator.messages_after("CH1", 1, usize::MAX).await.unwrap();
        assert_eq!(indices(&page), [2, 3, 4]);
    }

    #[tokio::test]
    async fn test_last_messages() {
        let (paginator, _channel) = setup(5);

        let last = paginator.last_messages("CH1", 1).await.unwrap();
        assert_eq!(indices(&last), [4]);

        let last_three = paginator.last_messages("CH1", 3).await.unwrap();
        assert_eq!(indices(&last_three), [2, 3, 4]);

        let (empty, _channel) = setup(0);
        assert!(empty.last_messages("CH1", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_channel_never_reaches_backend() {
        let (paginator, channel) = setup(2);

        assert!(matches!(
            paginator.messages_after("nope", 0, 10).await,
            Err(BridgeError::NotFound(ref sid)) if sid == "nope"
        ));
        assert!(matches!(
            paginator.last_messages("nope", 1).await,
            Err(BridgeError::NotFound(_))
        ));
        assert!(matches!(
            paginator.send_message("nope", "hi").await,
            Err(BridgeError::NotFound(_))
        ));

        assert_eq!(channel.fetch_calls(), 0);
        assert_eq!(channel.send_calls(), 0);
    }

    #[tokio::test]
    async fn test_send_message_and_failure() {
        let (paginator, channel) = setup(0);

        let sent = paginator.send_message("CH1", "hello").await.unwrap();
        assert_eq!(sent.body, "hello");
        assert_eq!(sent.author, "alice");
        assert_eq!(channel.message_count(), 1);

        channel.fail_next_send(BackendError::new(50511, "Message too long"));
        assert_eq!(
            paginator.send_message("CH1", "too long").await,
            Err(BridgeError::Send {
                code: 50511,
                message: "Message too long".into(),
            })
        );
        assert_eq!(channel.message_count(), 1);
    }
}
