//! `ZoneClient` – the object presentation collaborators hold.
//!
//! ## Usage
//!
//! ```no_run
//! use zone_link::{ClientConfig, Vec3, ZoneClient};
//! use zone_link::reconciler::EntityNotification;
//!
//! let mut client = ZoneClient::websocket(ClientConfig::default());
//!
//! client.on_chat(|msg| println!("[{}] {}", msg.from, msg.text));
//! client.on_entity(|n| match n {
//!     EntityNotification::Spawned { id, position } => println!("spawn {id} at {position}"),
//!     EntityNotification::Moved { id, position } => println!("move {id} to {position}"),
//!     EntityNotification::Removed { id } => println!("despawn {id}"),
//! });
//!
//! client.connect().unwrap();
//!
//! // In your update loop:
//! loop {
//!     client.poll();
//!     client.send_movement(Vec3::new(0.0, 0.0, 0.1)).ok();
//!     # break;
//! }
//! ```
//!
//! Everything observable – callbacks, the entity table, channel membership –
//! changes only inside [`ZoneClient::poll`].  Callbacks run on the caller's
//! thread, one at a time, in arrival order.

use std::time::{Duration, Instant};

use crate::chat::{ChatCommand, ChatMessage};
use crate::connection::{ChannelConnection, ConnectionState, Connector, Membership};
use crate::datagram::{encode_movement, DatagramSender};
use crate::error::Result;
use crate::events::ChannelEvent;
use crate::protocol::{event, topics, ChatPayload, Envelope};
use crate::reconciler::{EntityNotification, EntityReconciler, RemoteEntity};
use crate::types::{ClientConfig, Vec3};

// ---------------------------------------------------------------------------
// Listener registry
// ---------------------------------------------------------------------------

/// Returned by every `on_*` registration; pass back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listeners<T> {
    next: u64,
    entries: Vec<(ListenerId, Box<dyn FnMut(&T)>)>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            next: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> Listeners<T> {
    fn add(&mut self, f: Box<dyn FnMut(&T)>) -> ListenerId {
        self.next += 1;
        let id = ListenerId(self.next);
        self.entries.push((id, f));
        id
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(i, _)| *i != id);
        self.entries.len() != before
    }

    fn emit(&mut self, value: &T) {
        for (_, f) in self.entries.iter_mut() {
            f(value);
        }
    }
}

// ---------------------------------------------------------------------------
// ZoneClient
// ---------------------------------------------------------------------------

pub struct ZoneClient {
    config: ClientConfig,
    connection: ChannelConnection,
    reconciler: EntityReconciler,
    datagrams: Option<DatagramSender>,

    heartbeat_every: Option<Duration>,
    last_heartbeat: Instant,

    on_chat: Listeners<ChatMessage>,
    on_envelope: Listeners<Envelope>,
    on_entity: Listeners<EntityNotification>,
}

impl ZoneClient {
    pub fn new(config: ClientConfig, connector: Box<dyn Connector>) -> Self {
        let connection = ChannelConnection::new(connector, config.topics());
        let heartbeat_every =
            (config.heartbeat_secs > 0).then(|| Duration::from_secs(config.heartbeat_secs));
        let datagrams = match DatagramSender::new(
            &config.udp_server,
            config.player_name.clone(),
            config.packet_format,
        ) {
            Ok(sender) => Some(sender),
            Err(e) => {
                log::error!(
                    "[client] No movement datagrams to {}: {}",
                    config.udp_server,
                    e
                );
                None
            }
        };
        Self {
            config,
            connection,
            reconciler: EntityReconciler::new(),
            datagrams,
            heartbeat_every,
            last_heartbeat: Instant::now(),
            on_chat: Listeners::default(),
            on_envelope: Listeners::default(),
            on_entity: Listeners::default(),
        }
    }

    /// Client over the real WebSocket transport.
    #[cfg(feature = "transport")]
    pub fn websocket(config: ClientConfig) -> Self {
        let connector = crate::transport::WebSocketConnector::new()
            .with_thread_name(format!("zone-link-{}", config.player_name));
        Self::new(config, Box::new(connector))
    }

    /// Replace the datagram sender built from `config.udp_server`.
    pub fn with_datagram_sender(mut self, sender: DatagramSender) -> Self {
        self.datagrams = Some(sender);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Connect to `config.socket_url`.  No-op while connecting or open.
    pub fn connect(&mut self) -> Result<()> {
        let url = self.config.socket_url.clone();
        self.connect_to(&url)
    }

    pub fn connect_to(&mut self, url: &str) -> Result<()> {
        if self.connection.state() == ConnectionState::Closed {
            self.last_heartbeat = Instant::now();
        }
        self.connection.connect(url)
    }

    /// Close the connection and forget every remote entity.  Subscribers
    /// get a `Removed` for each entity that was known.
    pub fn close(&mut self) {
        self.connection.close();
        self.forget_entities();
    }

    fn forget_entities(&mut self) {
        for n in self.reconciler.clear() {
            self.on_entity.emit(&n);
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_open()
    }

    pub fn membership(&self, topic: &str) -> Membership {
        self.connection.membership(topic)
    }

    pub fn joined_topics(&self) -> Vec<String> {
        self.connection.joined_topics()
    }

    pub fn connection(&self) -> &ChannelConnection {
        &self.connection
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    pub fn join_channel(&mut self, topic: &str) {
        self.connection.join_channel(topic);
    }

    pub fn join_zone(&mut self, zone_id: &str) {
        self.connection.join_channel(&topics::zone(zone_id));
    }

    /// Send a chat message to `topic`.  Dropped when not connected.
    pub fn send_chat(&mut self, topic: &str, text: &str) -> bool {
        let payload = ChatPayload {
            from: self.config.player_name.clone(),
            to: topic.to_string(),
            text: text.to_string(),
        };
        match serde_json::to_value(&payload) {
            Ok(v) => self.connection.send(topic, event::CHAT, v),
            Err(e) => {
                log::warn!("[client] Cannot encode chat: {}", e);
                false
            }
        }
    }

    /// Parse a typed chat line (`/w name text` whispers) and send it.
    pub fn send_chat_line(&mut self, input: &str) -> bool {
        match ChatCommand::parse(input, &self.config.global_topic) {
            Some(cmd) => self.send_chat(&cmd.topic, &cmd.text),
            None => false,
        }
    }

    /// Send an arbitrary event on the reliable channel.
    pub fn send(&mut self, topic: &str, event: &str, payload: serde_json::Value) -> bool {
        self.connection.send(topic, event, payload)
    }

    /// Fire one movement delta over UDP.  Independent of the channel
    /// connection.  Only [`SyncError::Encoding`] reaches the caller; socket
    /// problems, including a sender that could not be set up, are logged.
    ///
    /// [`SyncError::Encoding`]: crate::error::SyncError::Encoding
    pub fn send_movement(&self, delta: Vec3) -> Result<()> {
        let Some(sender) = &self.datagrams else {
            encode_movement(&self.config.player_name, delta, self.config.packet_format)?;
            log::debug!("[client] No datagram sender; movement dropped");
            return Ok(());
        };
        sender.send_movement(delta)
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub fn on_chat(&mut self, f: impl FnMut(&ChatMessage) + 'static) -> ListenerId {
        self.on_chat.add(Box::new(f))
    }

    pub fn remove_chat_listener(&mut self, id: ListenerId) -> bool {
        self.on_chat.remove(id)
    }

    /// Every inbound envelope, before any typed handling.
    pub fn on_envelope(&mut self, f: impl FnMut(&Envelope) + 'static) -> ListenerId {
        self.on_envelope.add(Box::new(f))
    }

    pub fn remove_envelope_listener(&mut self, id: ListenerId) -> bool {
        self.on_envelope.remove(id)
    }

    pub fn on_entity(&mut self, f: impl FnMut(&EntityNotification) + 'static) -> ListenerId {
        self.on_entity.add(Box::new(f))
    }

    pub fn remove_entity_listener(&mut self, id: ListenerId) -> bool {
        self.on_entity.remove(id)
    }

    // -----------------------------------------------------------------------
    // Entity table
    // -----------------------------------------------------------------------

    pub fn entities(&self) -> &EntityReconciler {
        &self.reconciler
    }

    pub fn entity(&self, id: &str) -> Option<&RemoteEntity> {
        self.reconciler.get(id)
    }

    // -----------------------------------------------------------------------
    // poll() – call once per tick
    // -----------------------------------------------------------------------

    /// Drain the delivery queue and fire callbacks.  Returns how many
    /// envelopes were dispatched.
    pub fn poll(&mut self) -> usize {
        let was_live = self.connection.state() != ConnectionState::Closed;
        let dispatched = self.connection.poll(self.config.drain_limit);
        let count = dispatched.len();

        for d in dispatched {
            self.on_envelope.emit(&d.envelope);
            let Some(ev) = d.event else { continue };
            self.dispatch(&d.envelope, ev);
        }

        // Lost the socket: the server's view of the zone is gone with it.
        if was_live && self.connection.state() == ConnectionState::Closed {
            self.forget_entities();
        }

        self.maybe_heartbeat();
        count
    }

    fn dispatch(&mut self, envelope: &Envelope, ev: ChannelEvent) {
        match ev {
            ChannelEvent::Chat(c) => {
                let msg = ChatMessage {
                    topic: envelope.topic.clone(),
                    from: c.from,
                    to: c.to,
                    text: c.text,
                };
                self.on_chat.emit(&msg);
            }
            ev if ev.is_entity_event() => {
                if !topics::is_zone(&envelope.topic) {
                    log::debug!(
                        "[client] Ignoring {} on non-zone topic {}",
                        envelope.event,
                        envelope.topic
                    );
                    return;
                }
                for n in self.reconciler.apply(&ev) {
                    self.on_entity.emit(&n);
                }
            }
            _ => {}
        }
    }

    fn maybe_heartbeat(&mut self) {
        let Some(every) = self.heartbeat_every else {
            return;
        };
        if !self.connection.is_open() || self.last_heartbeat.elapsed() < every {
            return;
        }
        self.last_heartbeat = Instant::now();
        self.connection.heartbeat();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryConnector;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn client() -> (ZoneClient, MemoryConnector) {
        let server = MemoryConnector::new();
        let config = ClientConfig {
            default_topics: vec!["chat:global".into(), "zone:1".into()],
            heartbeat_secs: 0,
            ..Default::default()
        };
        (ZoneClient::new(config, Box::new(server.clone())), server)
    }

    #[test]
    fn chat_listener_receives_and_unsubscribes() {
        let (mut c, server) = client();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = c.on_chat(move |m| sink.borrow_mut().push(m.text.clone()));

        c.connect().unwrap();
        c.poll();
        server.push_envelope(&Envelope::new(
            "chat:global",
            "message",
            json!({"from": "bob", "to": "chat:global", "text": "hi"}),
            None,
        ));
        c.poll();
        assert_eq!(*seen.borrow(), vec!["hi".to_string()]);

        assert!(c.remove_chat_listener(id));
        assert!(!c.remove_chat_listener(id));
        server.push_envelope(&Envelope::new(
            "chat:global",
            "message",
            json!({"from": "bob", "to": "chat:global", "text": "again"}),
            None,
        ));
        c.poll();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn entity_events_outside_zone_topics_are_ignored() {
        let (mut c, server) = client();
        c.connect().unwrap();
        c.poll();
        server.push_envelope(&Envelope::new(
            "chat:global",
            "player_joined",
            json!({"id": "p1", "position": {"x": 0.0, "y": 0.0, "z": 0.0}}),
            None,
        ));
        c.poll();
        assert!(c.entities().is_empty());
    }

    #[test]
    fn close_despawns_known_entities() {
        let (mut c, server) = client();
        let removed = Rc::new(RefCell::new(Vec::new()));
        let sink = removed.clone();
        c.on_entity(move |n| {
            if let EntityNotification::Removed { id } = n {
                sink.borrow_mut().push(id.clone());
            }
        });

        c.connect().unwrap();
        c.poll();
        server.push_envelope(&Envelope::new(
            "zone:1",
            "player_joined",
            json!({"id": "p1", "position": {"x": 0.0, "y": 0.0, "z": 0.0}}),
            None,
        ));
        c.poll();
        assert!(c.entity("p1").is_some());

        c.close();
        assert!(c.entities().is_empty());
        assert_eq!(*removed.borrow(), vec!["p1".to_string()]);
        assert_eq!(c.state(), ConnectionState::Closed);
    }

    #[test]
    fn chat_line_whisper_is_addressed() {
        let (mut c, server) = client();
        c.connect().unwrap();
        c.poll();
        assert!(c.send_chat_line("/w ann meet at the well"));

        let last = server.sent_envelopes().pop().unwrap();
        assert_eq!(last.topic, "chat:whisper:ann");
        assert_eq!(last.event, "message");
        assert_eq!(last.payload["from"], "player1");
        assert_eq!(last.payload["text"], "meet at the well");
    }

    #[test]
    fn generic_listener_sees_unknown_events() {
        let (mut c, server) = client();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        c.on_envelope(move |e| sink.borrow_mut().push(e.event.clone()));

        c.connect().unwrap();
        c.poll();
        server.push_envelope(&Envelope::new("zone:1", "weather", json!({"rain": true}), None));
        c.poll();
        assert_eq!(*seen.borrow(), vec!["weather".to_string()]);
    }

    #[test]
    fn envelope_listener_unsubscribes() {
        let (mut c, server) = client();
        let seen = Rc::new(RefCell::new(0usize));
        let sink = seen.clone();
        let id = c.on_envelope(move |_| *sink.borrow_mut() += 1);

        c.connect().unwrap();
        c.poll();
        server.push_envelope(&Envelope::new("zone:1", "weather", json!({}), None));
        c.poll();
        assert_eq!(*seen.borrow(), 1);

        assert!(c.remove_envelope_listener(id));
        assert!(!c.remove_envelope_listener(id));
        server.push_envelope(&Envelope::new("zone:1", "weather", json!({}), None));
        c.poll();
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn entity_listener_unsubscribes() {
        let (mut c, server) = client();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = c.on_entity(move |n| sink.borrow_mut().push(n.id().to_string()));

        c.connect().unwrap();
        c.poll();
        server.push_envelope(&Envelope::new(
            "zone:1",
            "player_joined",
            json!({"id": "p1", "position": {"x": 0.0, "y": 0.0, "z": 0.0}}),
            None,
        ));
        c.poll();
        assert_eq!(*seen.borrow(), vec!["p1".to_string()]);

        assert!(c.remove_entity_listener(id));
        assert!(!c.remove_entity_listener(id));
        server.push_envelope(&Envelope::new("zone:1", "player_left", json!({"id": "p1"}), None));
        c.poll();
        assert!(c.entities().is_empty());
        assert_eq!(seen.borrow().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    #[test]
    fn unreachable_udp_target_never_fails_movement() {
        let config = ClientConfig {
            udp_server: "no-such-host.invalid:4000".into(),
            heartbeat_secs: 0,
            ..Default::default()
        };
        let c = ZoneClient::new(config, Box::new(MemoryConnector::new()));
        for _ in 0..3 {
            assert!(c.send_movement(Vec3::new(1.0, 0.0, 0.0)).is_ok());
        }
    }

    #[test]
    fn encoding_error_still_reaches_caller_without_sender() {
        let config = ClientConfig {
            udp_server: "no-such-host.invalid:4000".into(),
            player_name: "n".repeat(300),
            packet_format: crate::datagram::PacketFormat::Named,
            heartbeat_secs: 0,
            ..Default::default()
        };
        let c = ZoneClient::new(config, Box::new(MemoryConnector::new()));
        assert!(matches!(
            c.send_movement(Vec3::zero()),
            Err(crate::error::SyncError::Encoding(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------------

    fn heartbeats(server: &MemoryConnector) -> usize {
        server
            .sent_envelopes()
            .iter()
            .filter(|e| e.topic == "phoenix" && e.event == "heartbeat")
            .count()
    }

    #[test]
    fn heartbeat_fires_on_interval_while_open() {
        let server = MemoryConnector::new();
        let config = ClientConfig {
            default_topics: vec!["zone:1".into()],
            heartbeat_secs: 1,
            ..Default::default()
        };
        let mut c = ZoneClient::new(config, Box::new(server.clone()));

        c.connect().unwrap();
        c.poll();
        assert_eq!(heartbeats(&server), 0);

        std::thread::sleep(Duration::from_millis(1100));
        c.poll();
        c.poll();
        assert_eq!(heartbeats(&server), 1);

        let beat = server.sent_envelopes().pop().unwrap();
        assert_eq!(beat.payload, json!({}));

        c.close();
        std::thread::sleep(Duration::from_millis(1100));
        c.poll();
        assert_eq!(heartbeats(&server), 1);
    }
}
