//! In-process backend.
//!
//! `MemoryBackend` keeps channels and messages in memory and pushes events
//! through the same streams a networked backend would. It backs the demo
//! server and doubles as the scripted backend in tests: the `create_*`,
//! `delete_*`, `post` and `emit` helpers play the role of the remote service.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chatbridge_protocol::{ChannelUpdateReason, ClientSyncStatus};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::events::{ChannelEvent, ChannelEventStream, SessionEvent};
use crate::traits::{BackendError, ChatBackend, ChatChannel, ChatSession, Connected};
use crate::types::{now_millis, Channel, ChannelSyncStatus, ConnectionState, Member, Message};

/// Error code for a rejected access token.
pub const INVALID_TOKEN: u32 = 20101;

/// Error code for operations on a deleted channel.
pub const CHANNEL_DELETED: u32 = 50300;

/// Default number of messages a single fetch may return.
pub const DEFAULT_FETCH_CEILING: usize = 1000;

const EVENT_CAPACITY: usize = 1024;

/// Memory backend configuration.
#[derive(Debug, Clone)]
pub struct MemoryBackendConfig {
    /// Identity every session authenticates as.
    pub identity: String,
    /// Tokens accepted by `connect`.
    pub accepted_tokens: Vec<String>,
    /// Upper bound on messages returned by one fetch.
    pub fetch_ceiling: usize,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            identity: "user".to_string(),
            accepted_tokens: Vec::new(),
            fetch_ceiling: DEFAULT_FETCH_CEILING,
        }
    }
}

/// Backend-wide message clock. Never goes backwards and never repeats, so
/// recency ordering across channels is total.
#[derive(Debug, Default)]
struct Clock(AtomicU64);

impl Clock {
    fn tick(&self) -> u64 {
        let now = now_millis();
        let mut prev = self.0.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .0
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

struct Inner {
    identity: String,
    clock: Arc<Clock>,
    tokens: RwLock<HashSet<String>>,
    channels: RwLock<BTreeMap<String, Arc<MemoryChannel>>>,
    session_tx: broadcast::Sender<SessionEvent>,
    fetch_ceiling: usize,
}

impl Inner {
    fn emit(&self, event: SessionEvent) -> usize {
        self.session_tx.send(event).unwrap_or_default()
    }
}

/// A backend that lives entirely in memory.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    /// Create a backend with default configuration that accepts `token`.
    #[must_use]
    pub fn new(identity: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_config(MemoryBackendConfig {
            identity: identity.into(),
            accepted_tokens: vec![token.into()],
            ..MemoryBackendConfig::default()
        })
    }

    /// Create a backend with custom configuration.
    #[must_use]
    pub fn with_config(config: MemoryBackendConfig) -> Self {
        let (session_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                identity: config.identity,
                clock: Arc::new(Clock::default()),
                tokens: RwLock::new(config.accepted_tokens.into_iter().collect()),
                channels: RwLock::new(BTreeMap::new()),
                session_tx,
                fetch_ceiling: config.fetch_ceiling.max(1),
            }),
        }
    }

    /// Accept an additional access token.
    pub fn accept_token(&self, token: impl Into<String>) {
        self.inner
            .tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.into());
    }

    /// Add a channel without announcing it, as if it existed before any
    /// session connected.
    pub fn seed_channel(
        &self,
        sid: impl Into<String>,
        friendly_name: Option<&str>,
        members: &[&str],
    ) -> Arc<MemoryChannel> {
        let channel = Arc::new(MemoryChannel::new(
            sid.into(),
            friendly_name.map(str::to_string),
            members,
            self.inner.identity.clone(),
            self.inner.fetch_ceiling,
            self.inner.clock.clone(),
        ));
        self.inner
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.sid.clone(), channel.clone());
        channel
    }

    /// Add a channel and announce it to connected sessions.
    pub fn create_channel(
        &self,
        sid: impl Into<String>,
        friendly_name: Option<&str>,
        members: &[&str],
    ) -> Arc<MemoryChannel> {
        let channel = self.seed_channel(sid, friendly_name, members);
        debug!(channel = %channel.sid, "Memory backend: channel added");
        self.inner.emit(SessionEvent::ChannelAdded(channel.clone()));
        channel
    }

    /// Look up a channel.
    #[must_use]
    pub fn channel(&self, sid: &str) -> Option<Arc<MemoryChannel>> {
        self.inner
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sid)
            .cloned()
    }

    /// Change a channel's friendly name and announce the update.
    ///
    /// Returns `false` if the channel does not exist.
    pub fn rename_channel(&self, sid: &str, friendly_name: impl Into<String>) -> bool {
        let Some(channel) = self.channel(sid) else {
            return false;
        };
        channel.meta().friendly_name = Some(friendly_name.into());
        self.inner.emit(SessionEvent::ChannelUpdated {
            channel,
            reason: ChannelUpdateReason::FriendlyName,
        });
        true
    }

    /// Delete a channel and announce it.
    ///
    /// Returns `false` if the channel does not exist.
    pub fn delete_channel(&self, sid: &str) -> bool {
        let removed = self
            .inner
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sid);
        match removed {
            Some(channel) => {
                channel.meta().deleted = true;
                debug!(channel = %sid, "Memory backend: channel deleted");
                self.inner.emit(SessionEvent::ChannelDeleted(channel));
                true
            }
            None => false,
        }
    }

    /// Report client synchronization progress.
    pub fn set_sync_status(&self, status: ClientSyncStatus) {
        self.inner.emit(SessionEvent::ClientSynchronization(status));
    }

    /// Report an unsolicited error.
    pub fn report_error(&self, code: u32, message: impl Into<String>) {
        self.inner
            .emit(SessionEvent::Error(BackendError::new(code, message)));
    }

    /// Push an arbitrary session event. Returns the number of listeners.
    pub fn emit(&self, event: SessionEvent) -> usize {
        self.inner.emit(event)
    }

    /// Number of attached session listeners.
    #[must_use]
    pub fn session_listener_count(&self) -> usize {
        self.inner.session_tx.receiver_count()
    }
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    async fn connect(&self, token: &str) -> Result<Connected, BackendError> {
        let accepted = self
            .inner
            .tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(token);
        if !accepted {
            debug!("Memory backend: rejected access token");
            return Err(BackendError::new(INVALID_TOKEN, "Invalid Access Token"));
        }

        let events = self.inner.session_tx.subscribe();
        let session = Arc::new(MemorySession {
            inner: self.inner.clone(),
            state: RwLock::new(ConnectionState::Connected),
        });
        debug!(identity = %self.inner.identity, "Memory backend: session connected");

        Ok(Connected { session, events })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Session opened against a [`MemoryBackend`].
pub struct MemorySession {
    inner: Arc<Inner>,
    state: RwLock<ConnectionState>,
}

#[async_trait]
impl ChatSession for MemorySession {
    fn identity(&self) -> &str {
        &self.inner.identity
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    async fn subscribed_channels(&self) -> Result<Vec<Arc<dyn ChatChannel>>, BackendError> {
        let mut channels: Vec<Arc<MemoryChannel>> = self
            .inner
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        // Newest activity first; silent channels last.
        channels.sort_by(|a, b| b.last_message_at().cmp(&a.last_message_at()));

        Ok(channels
            .into_iter()
            .map(|c| c as Arc<dyn ChatChannel>)
            .collect())
    }

    async fn shutdown(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) =
            ConnectionState::Disconnected;
        debug!(identity = %self.inner.identity, "Memory backend: session closed");
    }
}

#[derive(Debug)]
struct ChannelMeta {
    unique_name: Option<String>,
    friendly_name: Option<String>,
    members: Vec<String>,
    sync_status: ChannelSyncStatus,
    deleted: bool,
}

/// A channel held by a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryChannel {
    sid: String,
    identity: String,
    fetch_ceiling: usize,
    clock: Arc<Clock>,
    meta: Mutex<ChannelMeta>,
    messages: Mutex<Vec<Message>>,
    events: broadcast::Sender<ChannelEvent>,
    send_failure: Mutex<Option<BackendError>>,
    send_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MemoryChannel {
    fn new(
        sid: String,
        friendly_name: Option<String>,
        members: &[&str],
        identity: String,
        fetch_ceiling: usize,
        clock: Arc<Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            meta: Mutex::new(ChannelMeta {
                unique_name: friendly_name
                    .as_deref()
                    .map(|name| name.to_lowercase().replace(' ', "-")),
                friendly_name,
                members: members.iter().map(|m| m.to_string()).collect(),
                sync_status: ChannelSyncStatus::All,
                deleted: false,
            }),
            sid,
            identity,
            fetch_ceiling,
            clock,
            messages: Mutex::new(Vec::new()),
            events,
            send_failure: Mutex::new(None),
            send_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    fn meta(&self) -> std::sync::MutexGuard<'_, ChannelMeta> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_message_at(&self) -> Option<u64> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|m| m.date_created)
    }

    fn ensure_live(&self) -> Result<(), BackendError> {
        if self.meta().deleted {
            return Err(BackendError::new(CHANNEL_DELETED, "Channel has been deleted"));
        }
        Ok(())
    }

    /// Append a message from `author` and push it to every listener.
    pub fn post(&self, author: &str, body: &str) -> Message {
        let message = {
            let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
            let index = messages.last().map_or(0, |m| m.index + 1);
            let date_created = self.clock.tick();
            let message = Message {
                sid: format!("IM{}{:08}", self.sid, index),
                channel_sid: self.sid.clone(),
                body: body.to_string(),
                author: author.to_string(),
                date_created,
                index,
            };
            messages.push(message.clone());
            message
        };

        let listeners = self.emit(ChannelEvent::MessageAdded(message.clone()));
        trace!(channel = %self.sid, index = message.index, listeners, "Memory backend: message added");
        message
    }

    /// Push an arbitrary channel event. Returns the number of listeners.
    pub fn emit(&self, event: ChannelEvent) -> usize {
        self.events.send(event).unwrap_or_default()
    }

    /// Announce a member joining.
    pub fn add_member(&self, identity: &str) {
        self.meta().members.push(identity.to_string());
        self.emit(ChannelEvent::MemberAdded(Member::new(identity)));
    }

    /// Make the next `send_message` fail with `error`.
    pub fn fail_next_send(&self, error: BackendError) {
        *self
            .send_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Number of `send_message` calls that reached this channel.
    #[must_use]
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::Relaxed)
    }

    /// Number of fetch calls that reached this channel.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::Relaxed)
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ChatChannel for MemoryChannel {
    fn sid(&self) -> &str {
        &self.sid
    }

    fn snapshot(&self) -> Channel {
        let last_message_at = self.last_message_at();
        let meta = self.meta();
        Channel {
            sid: self.sid.clone(),
            unique_name: meta.unique_name.clone(),
            friendly_name: meta.friendly_name.clone(),
            members: meta.members.clone(),
            sync_status: meta.sync_status,
            last_message_at,
        }
    }

    fn subscribe(&self) -> ChannelEventStream {
        self.events.subscribe()
    }

    async fn send_message(&self, body: &str) -> Result<Message, BackendError> {
        self.send_calls.fetch_add(1, Ordering::Relaxed);
        self.ensure_live()?;

        let failure = self
            .send_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(err) = failure {
            return Err(err);
        }

        Ok(self.post(&self.identity, body))
    }

    async fn last_messages(&self, count: usize) -> Result<Vec<Message>, BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
        self.ensure_live()?;

        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let count = count.min(self.fetch_ceiling);
        let start = messages.len().saturating_sub(count);
        Ok(messages[start..].to_vec())
    }

    async fn messages_after(
        &self,
        index: u64,
        count: usize,
    ) -> Result<Vec<Message>, BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
        self.ensure_live()?;

        // The anchor message itself is part of the page.
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(messages
            .iter()
            .filter(|m| m.index >= index)
            .take(count.min(self.fetch_ceiling))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_unknown_token() {
        let backend = MemoryBackend::new("alice", "good");

        let err = backend.connect("bad").await.unwrap_err();
        assert_eq!(err.code, INVALID_TOKEN);

        backend.accept_token("bad");
        assert!(backend.connect("bad").await.is_ok());
    }

    #[tokio::test]
    async fn test_session_stream_sees_events_emitted_after_connect() {
        let backend = MemoryBackend::new("alice", "token");
        let Connected { mut events, .. } = backend.connect("token").await.unwrap();

        backend.create_channel("CH1", Some("General"), &["alice"]);

        match events.recv().await.unwrap() {
            SessionEvent::ChannelAdded(channel) => assert_eq!(channel.sid(), "CH1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscribed_channels_sorted_by_recency() {
        let backend = MemoryBackend::new("alice", "token");
        let quiet = backend.seed_channel("CH1", None, &[]);
        let older = backend.seed_channel("CH2", None, &[]);
        let newer = backend.seed_channel("CH3", None, &[]);
        older.post("bob", "first");
        newer.post("bob", "second");
        drop(quiet);

        let Connected { session, .. } = backend.connect("token").await.unwrap();
        let sids: Vec<String> = session
            .subscribed_channels()
            .await
            .unwrap()
            .iter()
            .map(|c| c.sid().to_string())
            .collect();

        assert_eq!(sids, vec!["CH3", "CH2", "CH1"]);
    }

    #[tokio::test]
    async fn test_messages_after_includes_anchor() {
        let backend = MemoryBackend::new("alice", "token");
        let channel = backend.seed_channel("CH1", None, &[]);
        for i in 0..5 {
            channel.post("bob", &format!("m{i}"));
        }

        let page = channel.messages_after(2, 2).await.unwrap();
        let indices: Vec<u64> = page.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![2, 3]);

        let last = channel.last_messages(2).await.unwrap();
        let indices: Vec<u64> = last.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_fetch_ceiling_bounds_results() {
        let backend = MemoryBackend::with_config(MemoryBackendConfig {
            accepted_tokens: vec!["token".into()],
            fetch_ceiling: 3,
            ..MemoryBackendConfig::default()
        });
        let channel = backend.seed_channel("CH1", None, &[]);
        for i in 0..10 {
            channel.post("bob", &format!("m{i}"));
        }

        assert_eq!(channel.last_messages(50).await.unwrap().len(), 3);
        assert_eq!(channel.messages_after(0, 50).await.unwrap().len(), 3);
        assert_eq!(channel.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_send_failure_and_deleted_channel() {
        let backend = MemoryBackend::new("alice", "token");
        let channel = backend.seed_channel("CH1", None, &[]);

        channel.fail_next_send(BackendError::new(50511, "Message too long"));
        let err = channel.send_message("x").await.unwrap_err();
        assert_eq!(err.code, 50511);

        let sent = channel.send_message("ok").await.unwrap();
        assert_eq!(sent.author, "alice");
        assert_eq!(sent.index, 0);

        assert!(backend.delete_channel("CH1"));
        assert!(!backend.delete_channel("CH1"));
        let err = channel.send_message("late").await.unwrap_err();
        assert_eq!(err.code, CHANNEL_DELETED);
        assert_eq!(channel.send_calls(), 3);
    }
}
