//! # chatbridge-backend
//!
//! Backend session contract for the chatbridge synchronization bridge.
//!
//! A backend opens one authenticated session, exposes the channels the
//! identity is subscribed to, and pushes events:
//!
//! - **Session events** - channel lifecycle, sync progress, errors
//! - **Channel events** - messages, members, typing, per-channel sync
//!
//! All backends implement [`ChatBackend`], [`ChatSession`] and
//! [`ChatChannel`], so the bridge never depends on a particular SDK.
//!
//! ```rust,ignore
//! use chatbridge_backend::{ChatBackend, Connected};
//!
//! async fn open(backend: &dyn ChatBackend, token: &str) {
//!     let Connected { session, mut events } = backend.connect(token).await.unwrap();
//!     while let Ok(event) = events.recv().await {
//!         // Translate event
//!     }
//! }
//! ```

pub mod events;
pub mod traits;
pub mod types;

#[cfg(feature = "memory")]
pub mod memory;

pub use events::{
    ChannelEvent, ChannelEventStream, MemberUpdateReason, MessageUpdateReason, SessionEvent,
    SessionEventStream, UserUpdateReason,
};
pub use traits::{BackendError, ChatBackend, ChatChannel, ChatSession, Connected};
pub use types::{Channel, ChannelSyncStatus, ConnectionState, Member, Message};

#[cfg(feature = "memory")]
pub use memory::{MemoryBackend, MemoryBackendConfig, MemoryChannel};
