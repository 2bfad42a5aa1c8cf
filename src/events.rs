//! Typed channel events decoded from raw envelopes.
//!
//! The payload shape is resolved once, here, by the `event` name.  Handlers
//! downstream match on [`ChannelEvent`] instead of comparing strings.

use crate::error::{Result, SyncError};
use crate::protocol::{
    event, ChatPayload, Envelope, PlayerJoined, PlayerLeft, PlayerMoved, Reply, ZoneState,
};

/// A single semantic event received on the reliable channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// `message` – chat delivery.
    Chat(ChatPayload),
    /// `phx_reply` – join (or other request) acknowledgement.
    Reply(Reply),
    /// `phx_error` – the server reports the channel crashed.
    ChannelError,
    /// `phx_close` – the server closed the channel.
    ChannelClosed,

    /// `zone_state` – additive snapshot.
    Snapshot(ZoneState),
    PlayerJoined(PlayerJoined),
    PlayerMoved(PlayerMoved),
    PlayerLeft(PlayerLeft),

    /// Any other event name; the envelope stays available to generic listeners.
    Unknown,
}

impl ChannelEvent {
    /// Resolve the payload of `envelope` according to its event name.
    ///
    /// Fails with [`SyncError::Protocol`] when a known event carries a
    /// payload of the wrong shape.  Unknown event names never fail.
    pub fn decode(envelope: &Envelope) -> Result<Self> {
        let ev = match envelope.event.as_str() {
            event::CHAT => ChannelEvent::Chat(from_payload(envelope)?),
            event::REPLY => ChannelEvent::Reply(from_payload(envelope)?),
            event::ERROR => ChannelEvent::ChannelError,
            event::CLOSE => ChannelEvent::ChannelClosed,
            event::ZONE_STATE => ChannelEvent::Snapshot(from_payload(envelope)?),
            event::PLAYER_JOINED => ChannelEvent::PlayerJoined(from_payload(envelope)?),
            event::PLAYER_MOVED => ChannelEvent::PlayerMoved(from_payload(envelope)?),
            event::PLAYER_LEFT => ChannelEvent::PlayerLeft(from_payload(envelope)?),
            _ => ChannelEvent::Unknown,
        };
        Ok(ev)
    }

    /// True for the events folded into the entity table.
    pub fn is_entity_event(&self) -> bool {
        matches!(
            self,
            ChannelEvent::Snapshot(_)
                | ChannelEvent::PlayerJoined(_)
                | ChannelEvent::PlayerMoved(_)
                | ChannelEvent::PlayerLeft(_)
        )
    }
}

fn from_payload<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T> {
    T::deserialize(&envelope.payload).map_err(|e| {
        SyncError::Protocol(format!(
            "bad `{}` payload on {}: {}",
            envelope.event, envelope.topic, e
        ))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
