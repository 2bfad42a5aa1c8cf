//! Zone Link
//!
//! Client-side real-time sync layer for a multiplayer world: a reliable,
//! topic-based channel for chat and entity lifecycle, plus a best-effort UDP
//! path for movement deltas.
//!
//! ## Architecture
//!
//! ```text
//! ZoneClient  (client.rs)            ← collaborator API, poll() per tick
//!   ├── ChannelConnection  (connection.rs)  ← lifecycle, joins, refs
//!   │     ├── Connector / FrameSink  (transport/)  ← socket, own thread
//!   │     └── DeliveryQueue  (queue.rs)      ← the only lock
//!   ├── EntityReconciler  (reconciler.rs)    ← id → position table
//!   └── DatagramSender  (datagram.rs)        ← movement packets, UDP
//! ```
//!
//! Inbound frames travel transport → `DeliveryQueue` → `ZoneClient::poll`
//! → `EntityReconciler` → callbacks, all callbacks on the polling thread.

// Protocol, queue and reducer are always available.
pub mod chat;
pub mod connection;
pub mod datagram;
pub mod error;
pub mod events;
pub mod protocol;
pub mod queue;
pub mod reconciler;
pub mod transport;
pub mod types;

pub mod client;

pub use chat::{ChatCommand, ChatMessage};
pub use client::{ListenerId, ZoneClient};
pub use connection::{ChannelConnection, ConnectionState, Delivery, Membership};
pub use datagram::{DatagramSender, PacketFormat};
pub use error::{Result, SyncError};
pub use events::ChannelEvent;
pub use protocol::Envelope;
pub use reconciler::{EntityNotification, EntityReconciler, RemoteEntity};
pub use types::{ClientConfig, Vec3};
