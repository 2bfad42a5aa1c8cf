//! Core types shared across all modules.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

use crate::datagram::PacketFormat;

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Client config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the channel endpoint.
    pub socket_url: String,
    /// Name stamped into the `from` field of outgoing chat.
    pub player_name: String,
    /// Topic that un-addressed chat goes to.
    pub global_topic: String,
    /// Zone joined on connect (`zone:<zone_id>`).
    pub zone_id: String,
    /// Topics joined whenever the connection opens.  Empty means
    /// `[global_topic, zone:<zone_id>]`.
    pub default_topics: Vec<String>,
    /// `host:port` the movement datagrams are sent to.
    pub udp_server: String,
    /// Wire layout of movement datagrams.
    pub packet_format: PacketFormat,
    /// Max deliveries handled per `poll()`; 0 drains everything.
    pub drain_limit: usize,
    /// Seconds between `phoenix` heartbeats while open; 0 disables them.
    pub heartbeat_secs: u64,
}

impl ClientConfig {
    /// Topics to join on open, with the derived default applied.
    pub fn topics(&self) -> Vec<String> {
        if !self.default_topics.is_empty() {
            return self.default_topics.clone();
        }
        vec![self.global_topic.clone(), format!("zone:{}", self.zone_id)]
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_url: "ws://localhost:4001/socket/websocket".into(),
            player_name: "player1".into(),
            global_topic: "chat:global".into(),
            zone_id: "1".into(),
            default_topics: Vec::new(),
            udp_server: "127.0.0.1:4000".into(),
            packet_format: PacketFormat::Hashed,
            drain_limit: 0,
            heartbeat_secs: 30,
        }
    }
}
