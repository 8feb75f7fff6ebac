//! # chatbridge-core
//!
//! Channel registry, event adapters and message pagination for chatbridge.
//!
//! This crate turns a backend session into commands and notifications a
//! host can consume:
//!
//! - **Bridge** - Command entry points and the notification stream
//! - **ChannelRegistry** - Known channels, one listener each
//! - **Paginator** - Bounded history fetches and message sends
//! - **Notifier** - Fan-out of notifications to host subscribers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Host     │────▶│   Bridge    │────▶│  Paginator  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │                   │
//!        │                   ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Notifier   │◀────│  Listeners  │◀────│  Registry   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use chatbridge_backend::MemoryBackend;
//! use chatbridge_core::Bridge;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let backend = MemoryBackend::new("alice", "token");
//! backend.seed_channel("CH1", Some("General"), &["alice"]);
//!
//! let bridge = Bridge::new(Arc::new(backend));
//! bridge.initialize("token").await.unwrap();
//!
//! let channels = bridge.list_channels().await.unwrap();
//! assert_eq!(channels[0].sid, "CH1");
//! # }
//! ```

pub mod bridge;
pub mod channel;
pub mod error;
pub mod notifier;
pub mod paginator;
pub mod registry;
pub mod session;

pub use bridge::{Bridge, BridgeConfig};
pub use channel::Subscription;
pub use error::BridgeError;
pub use notifier::{NotificationStream, Notifier};
pub use paginator::{Paginator, PaginatorConfig, MAX_LAST_MESSAGES, MAX_PAGE_SIZE};
pub use registry::{ChannelRegistry, RegistryStats};
