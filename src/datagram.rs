//! Movement datagrams – fixed-layout binary deltas over UDP.
//!
//! ## Wire layout (big-endian)
//!
//! `Hashed` (default, 18 bytes):
//!
//! | Offset | Size | Field                      |
//! |--------|------|----------------------------|
//! | 0      | 4    | `u32` stable hash of id    |
//! | 4      | 2    | `u16` opcode (`1` = move)  |
//! | 6      | 4    | `f32` dx                   |
//! | 10     | 4    | `f32` dy                   |
//! | 14     | 4    | `f32` dz                   |
//!
//! `Named` (legacy, `1 + len + 14` bytes): `u8` id length, the UTF-8 id,
//! then opcode and the three floats as above.
//!
//! Packets are fire-and-forget: no ack, no retry, no ordering.  Receivers
//! apply each as a relative delta once and tolerate loss as positional drift.
//!
//! The id hash is CRC-32C of the UTF-8 bytes.  Distinct ids may collide;
//! that is an accepted limitation of the compact format.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::types::Vec3;

pub const OPCODE_MOVE: u16 = 1;
pub const HASHED_PACKET_LEN: usize = 18;
pub const MAX_NAMED_ID_LEN: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketFormat {
    #[default]
    Hashed,
    Named,
}

/// Deterministic 32-bit digest of a player id.  `stable_hash("") == 0`.
pub fn stable_hash(id: &str) -> u32 {
    crc32c::crc32c(id.as_bytes())
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// How the sender is identified inside a decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerKey {
    Hash(u32),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovementPacket {
    pub player: PlayerKey,
    pub opcode: u16,
    pub delta: Vec3,
}

/// Build one movement packet.  Fails only for a `Named` id that does not
/// fit the length byte; nothing is sent in that case.
pub fn encode_movement(player_id: &str, delta: Vec3, format: PacketFormat) -> Result<Bytes> {
    let mut buf = match format {
        PacketFormat::Hashed => {
            let mut buf = BytesMut::with_capacity(HASHED_PACKET_LEN);
            buf.put_u32(stable_hash(player_id));
            buf
        }
        PacketFormat::Named => {
            let id = player_id.as_bytes();
            if id.len() > MAX_NAMED_ID_LEN {
                return Err(SyncError::Encoding(format!(
                    "player id is {} bytes, limit is {}",
                    id.len(),
                    MAX_NAMED_ID_LEN
                )));
            }
            let mut buf = BytesMut::with_capacity(1 + id.len() + 14);
            buf.put_u8(id.len() as u8);
            buf.put_slice(id);
            buf
        }
    };

    buf.put_u16(OPCODE_MOVE);
    buf.put_f32(delta.x);
    buf.put_f32(delta.y);
    buf.put_f32(delta.z);
    Ok(buf.freeze())
}

/// Parse a packet produced by [`encode_movement`].
///
/// The hashed layout is 4 + 2 + 3 × 4 bytes; the named one replaces the
/// hash with a length-prefixed id.
pub fn decode_movement(mut data: &[u8], format: PacketFormat) -> Result<MovementPacket> {
    let player = match format {
        PacketFormat::Hashed => {
            if data.len() != HASHED_PACKET_LEN {
                return Err(SyncError::Protocol(format!(
                    "movement packet is {} bytes, expected {}",
                    data.len(),
                    HASHED_PACKET_LEN
                )));
            }
            PlayerKey::Hash(data.get_u32())
        }
        PacketFormat::Named => {
            if data.is_empty() {
                return Err(SyncError::Protocol("empty movement packet".into()));
            }
            let len = data.get_u8() as usize;
            if data.len() != len + 14 {
                return Err(SyncError::Protocol(format!(
                    "named movement packet body is {} bytes, expected {}",
                    data.len(),
                    len + 14
                )));
            }
            let name = std::str::from_utf8(&data[..len])
                .map_err(|e| SyncError::Protocol(format!("player id is not UTF-8: {e}")))?
                .to_string();
            data.advance(len);
            PlayerKey::Name(name)
        }
    };

    let opcode = data.get_u16();
    let delta = Vec3::new(data.get_f32(), data.get_f32(), data.get_f32());
    Ok(MovementPacket {
        player,
        opcode,
        delta,
    })
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Fires movement packets at a fixed server address.
///
/// Holds no shared mutable state: `send_movement` can be called straight
/// from the caller's update loop without going through the delivery queue.
#[derive(Debug)]
pub struct DatagramSender {
    socket: UdpSocket,
    target: SocketAddr,
    player_id: String,
    format: PacketFormat,
}

impl DatagramSender {
    /// Bind an ephemeral local port and resolve `target` (`host:port`).
    pub fn new(target: &str, player_id: impl Into<String>, format: PacketFormat) -> Result<Self> {
        let target = target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| SyncError::Connection(format!("cannot resolve {target}")))?;
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            target,
            player_id: player_id.into(),
            format,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Encode and send one delta.
    ///
    /// Encoding errors are returned before anything is sent.  Socket errors
    /// are logged and swallowed.
    pub fn send_movement(&self, delta: Vec3) -> Result<()> {
        let packet = encode_movement(&self.player_id, delta, self.format)?;
        log::debug!("[datagram] Sending {:02X?}", &packet[..]);
        if let Err(e) = self.socket.send_to(&packet, self.target) {
            log::warn!("[datagram] Send to {} failed: {}", self.target, e);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
