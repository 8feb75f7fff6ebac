//! The bridge: command entry points for hosts plus the notification stream.

use std::sync::Arc;

use chatbridge_backend::{ChatBackend, ChatSession, Connected};
use chatbridge_protocol::{ChannelRecord, Command, ErrorRecord, MessageRecord, Notification, Reply};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::notifier::{Notifier, NotificationStream, DEFAULT_NOTIFICATION_CAPACITY};
use crate::paginator::{Paginator, PaginatorConfig};
use crate::registry::ChannelRegistry;

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Notifications buffered per host subscriber.
    pub notification_capacity: usize,
    /// Largest page returned by `fetchMessagesAfter`.
    pub max_page_size: usize,
    /// Largest count served by last-message fetches.
    pub max_last_messages: usize,
}

impl BridgeConfig {
    /// Page size limits.
    #[must_use]
    pub fn pagination(&self) -> PaginatorConfig {
        PaginatorConfig {
            max_page_size: self.max_page_size,
            max_last_messages: self.max_last_messages,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let pagination = PaginatorConfig::default();
        Self {
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            max_page_size: pagination.max_page_size,
            max_last_messages: pagination.max_last_messages,
        }
    }
}

struct ActiveSession {
    session: Arc<dyn ChatSession>,
    listener: Option<JoinHandle<()>>,
}

impl ActiveSession {
    /// Abort the session listener and wait until it has exited. Once this
    /// returns no session event can touch the registry.
    async fn stop(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            // Cancelled is the expected outcome.
            let _ = listener.await;
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if let Some(listener) = &self.listener {
            listener.abort();
        }
    }
}

/// Bridges one backend session to any number of host subscribers.
pub struct Bridge {
    backend: Arc<dyn ChatBackend>,
    registry: Arc<ChannelRegistry>,
    paginator: Paginator,
    notifier: Notifier,
    session: Mutex<Option<ActiveSession>>,
}

impl Bridge {
    /// Create a bridge with default configuration.
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self::with_config(backend, BridgeConfig::default())
    }

    /// Create a bridge with custom configuration.
    #[must_use]
    pub fn with_config(backend: Arc<dyn ChatBackend>, config: BridgeConfig) -> Self {
        info!(backend = backend.name(), "Creating bridge with config: {:?}", config);
        let notifier = Notifier::new(config.notification_capacity);
        let registry = Arc::new(ChannelRegistry::new(notifier.clone()));
        let paginator = Paginator::new(Arc::clone(&registry), config.pagination());

        Self {
            backend,
            registry,
            paginator,
            notifier,
            session: Mutex::new(None),
        }
    }

    /// Subscribe to host notifications.
    pub fn subscribe(&self) -> NotificationStream {
        self.notifier.subscribe()
    }

    /// The channel registry.
    #[must_use]
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Whether a session is active.
    pub async fn is_initialized(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Authenticate and start the session.
    ///
    /// The session listener is attached before this returns, so no session
    /// event is missed. A failed attempt is also reported as an
    /// `initializationError` notification.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Auth`] if the backend rejects the token,
    /// [`BridgeError::AlreadyInitialized`] if a session is active.
    pub async fn initialize(&self, token: &str) -> Result<bool, BridgeError> {
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            return Err(BridgeError::AlreadyInitialized);
        }

        match self.backend.connect(token).await {
            Ok(Connected { session, events }) => {
                let listener = crate::session::spawn(
                    events,
                    Arc::clone(&self.registry),
                    self.notifier.clone(),
                );
                info!(identity = %session.identity(), backend = self.backend.name(), "Session initialized");
                *slot = Some(ActiveSession {
                    session,
                    listener: Some(listener),
                });
                Ok(true)
            }
            Err(err) => {
                warn!(code = err.code, error = %err.message, "Session initialization failed");
                self.notifier.emit(Notification::InitializationError(ErrorRecord::new(
                    err.code,
                    err.message.clone(),
                )));
                Err(BridgeError::auth(err))
            }
        }
    }

    async fn active_session(&self) -> Result<Arc<dyn ChatSession>, BridgeError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| Arc::clone(&s.session))
            .ok_or(BridgeError::NotInitialized)
    }

    /// Channels the identity is subscribed to, most recent message first.
    ///
    /// New channels are registered with a listener. Channels already known
    /// keep their listener and get fresh metadata.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotInitialized`] before `initialize`,
    /// [`BridgeError::Fetch`] if the backend fails.
    pub async fn list_channels(&self) -> Result<Vec<ChannelRecord>, BridgeError> {
        let session = self.active_session().await?;
        let channels = session
            .subscribed_channels()
            .await
            .map_err(BridgeError::fetch)?;

        for channel in channels {
            self.registry.ensure(channel);
        }

        let records: Vec<ChannelRecord> = self
            .registry
            .list_sorted_by_recency()
            .iter()
            .map(|c| c.to_record())
            .collect();
        debug!(channels = records.len(), "Listed channels");
        Ok(records)
    }

    /// Send a text message to a registered channel.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotFound`] or [`BridgeError::Send`].
    pub async fn send_message(&self, sid: &str, body: &str) -> Result<bool, BridgeError> {
        self.paginator.send_message(sid, body).await.map(|_| true)
    }

    /// Messages with index strictly greater than `index`, one page of at most
    /// the configured page size, ascending.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotFound`] or [`BridgeError::Fetch`].
    pub async fn fetch_messages_after(
        &self,
        sid: &str,
        index: u64,
    ) -> Result<Vec<MessageRecord>, BridgeError> {
        let page = self
            .paginator
            .messages_after(sid, index, self.paginator.max_page_size())
            .await?;
        Ok(page.iter().map(|m| m.to_record()).collect())
    }

    /// The newest message of a channel, if any.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotFound`] or [`BridgeError::Fetch`].
    pub async fn fetch_last_message(&self, sid: &str) -> Result<Option<MessageRecord>, BridgeError> {
        let mut last = self.paginator.last_messages(sid, 1).await?;
        Ok(last.pop().map(|m| m.to_record()))
    }

    /// Run one host command.
    ///
    /// # Errors
    ///
    /// Whatever the matching operation returns.
    pub async fn dispatch(&self, command: Command) -> Result<Reply, BridgeError> {
        debug!(command = command.name(), "Dispatching command");
        match command {
            Command::Initialize { token } => self.initialize(&token).await.map(Reply::Initialized),
            Command::ListChannels => self.list_channels().await.map(Reply::Channels),
            Command::SendMessage { sid, body } => {
                self.send_message(&sid, &body).await.map(Reply::Sent)
            }
            Command::FetchMessagesAfter { sid, index } => self
                .fetch_messages_after(&sid, index)
                .await
                .map(Reply::Messages),
            Command::FetchLastMessage { sid } => {
                self.fetch_last_message(&sid).await.map(Reply::LastMessage)
            }
        }
    }

    /// Close the session and drop every channel listener. The bridge can be
    /// initialized again afterwards.
    pub async fn shutdown(&self) {
        let active = self.session.lock().await.take();
        if let Some(active) = active {
            let session = Arc::clone(&active.session);
            session.shutdown().await;
            active.stop().await;
            info!(identity = %session.identity(), "Session closed");
        }
        self.registry.clear();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("backend", &self.backend.name())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
