//! # chatbridge-protocol
//!
//! Host-facing protocol for the chatbridge synchronization bridge.
//!
//! The host talks to the bridge with [`Command`]s, receives a [`Reply`] per
//! command, and is pushed [`Notification`]s whenever the backend reports
//! something on its own. All payloads are flat records with camelCase keys.
//!
//! ## Frames
//!
//! - `Request` / `Response` / `Error` - Command round trips
//! - `Notification` - Pushed backend events
//! - `Ping` / `Pong` / `Connected` - Connection housekeeping
//!
//! ## Example
//!
//! ```rust
//! use chatbridge_protocol::{codec, Command, Frame};
//!
//! let frame = Frame::request(1, Command::FetchLastMessage { sid: "CH1".into() });
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod commands;
pub mod frames;
pub mod notifications;
pub mod records;

pub use codec::{decode, encode, ProtocolError};
pub use commands::{Command, Reply};
pub use frames::{Frame, PROTOCOL_VERSION};
pub use notifications::Notification;
pub use records::{ChannelRecord, ChannelUpdateReason, ClientSyncStatus, ErrorRecord, MessageRecord};
