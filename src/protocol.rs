//! Channel wire protocol: the message envelope and its payloads.
//!
//! This module owns **every JSON message that crosses the reliable channel**
//! between this client and the channel server.
//!
//! ## Envelope
//!
//! ```json
//! {"topic": "zone:1", "event": "player_moved", "payload": {...}, "ref": "7", "join_ref": null}
//! ```
//!
//! | Field      | Type            | Notes                                      |
//! |------------|-----------------|--------------------------------------------|
//! | `topic`    | string          | channel the message is scoped to           |
//! | `event`    | string          | see [`event`] constants                    |
//! | `payload`  | object \| null  | shape depends on `event`                   |
//! | `ref`      | string \| null  | per-connection counter, correlation only   |
//! | `join_ref` | string \| null  | ref of the join that opened the channel    |
//!
//! Decoding is lenient about the envelope (missing optional fields default to
//! `null`) and strict about payloads (see [`crate::events`]).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Vec3;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub join_ref: Option<String>,
}

impl Envelope {
    pub fn new(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
        reference: Option<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            reference,
            join_ref: None,
        }
    }

    /// `phx_join` request with an empty payload.
    pub fn join(topic: impl Into<String>, reference: String) -> Self {
        Self::new(
            topic,
            event::JOIN,
            serde_json::Value::Object(Default::default()),
            Some(reference),
        )
    }
}

/// Serialize an envelope to a text frame.
pub fn encode(envelope: &Envelope) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Parse one text frame into an envelope.
pub fn decode(frame: &str) -> Result<Envelope> {
    Ok(serde_json::from_str(frame)?)
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// `message` payload, in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub from: String,
    pub to: String,
    pub text: String,
}

/// `player_joined` payload, also one entry of a `zone_state` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoined {
    pub id: String,
    pub position: Vec3,
}

/// `player_moved` payload.  `delta` is relative to the last known position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMoved {
    pub id: String,
    pub delta: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLeft {
    pub id: String,
}

/// `zone_state` payload: an additive snapshot of known players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    pub players: Vec<PlayerJoined>,
}

/// `phx_reply` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: String,
    #[serde(default)]
    pub response: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Every `event` string this client sends or understands.
pub mod event {
    pub const JOIN: &str = "phx_join";
    pub const REPLY: &str = "phx_reply";
    pub const ERROR: &str = "phx_error";
    pub const CLOSE: &str = "phx_close";
    pub const HEARTBEAT: &str = "heartbeat";

    pub const CHAT: &str = "message";

    pub const ZONE_STATE: &str = "zone_state";
    pub const PLAYER_JOINED: &str = "player_joined";
    pub const PLAYER_MOVED: &str = "player_moved";
    pub const PLAYER_LEFT: &str = "player_left";
}

/// Topic naming helpers.
pub mod topics {
    pub const ZONE_PREFIX: &str = "zone:";
    pub const WHISPER_PREFIX: &str = "chat:whisper:";
    /// Reserved topic for connection-level heartbeats.
    pub const HEARTBEAT: &str = "phoenix";

    pub fn zone(zone_id: &str) -> String {
        format!("{ZONE_PREFIX}{zone_id}")
    }

    pub fn whisper(name: &str) -> String {
        format!("{WHISPER_PREFIX}{name}")
    }

    pub fn is_zone(topic: &str) -> bool {
        topic.starts_with(ZONE_PREFIX)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
