//! `ChannelConnection` – connection lifecycle, join protocol and ref
//! sequencing for the reliable channel.
//!
//! ## Lifecycle
//!
//! ```text
//!            connect(url)            Delivery::Opened
//!  Closed ───────────────▶ Connecting ────────────────▶ Open
//!    ▲                         │                         │
//!    └──── close() / Delivery::Closed ◀──────────────────┘
//! ```
//!
//! The transport ([`Connector`] / [`FrameSink`]) runs on its own delivery
//! context and only ever talks back through an [`Inbox`].  Every state
//! change – Open, default joins, channel membership – happens inside
//! [`ChannelConnection::poll`], on the consumer's thread.
//!
//! ## Joins
//!
//! Joins are fire-and-forget: the `phx_join` is transmitted and the topic is
//! marked `Joined` straight away.  The later `phx_reply` is only logged.
//! Joining before the connection is open records the topic; it is joined
//! as soon as `Opened` is delivered.
//!
//! ## Sends
//!
//! `send` is best-effort while open.  When not open the message is dropped
//! silently – nothing is queued for later.

use crate::error::Result;
use crate::events::ChannelEvent;
use crate::protocol::{self, event, Envelope};
use crate::queue::{DeliveryQueue, Inbox};

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// What a transport reports back to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// The socket is open and frames may be sent.
    Opened,
    /// One parsed inbound frame.
    Frame(Envelope),
    /// The socket is gone (remote close, fault, or failed open).
    Closed { reason: String },
}

/// Outbound half of an open (or opening) transport.
pub trait FrameSink: Send {
    fn send_text(&self, frame: String) -> Result<()>;
    /// Release the transport.  Must not block.
    fn close(&self);
}

/// Opens transports.  `open` returns immediately; progress arrives through
/// `inbox` as [`Delivery`] values.
pub trait Connector {
    fn open(&self, url: &str, inbox: Inbox<Delivery>) -> Result<Box<dyn FrameSink>>;
}

/// Parse a raw text frame and hand it to the consumer.  Unparseable frames
/// are logged and discarded; the connection is unaffected.
pub fn deliver_frame(inbox: &Inbox<Delivery>, text: &str) {
    match protocol::decode(text) {
        Ok(envelope) => inbox.push(Delivery::Frame(envelope)),
        Err(e) => log::warn!("[connection] Discarding unparseable frame ({}): {}", e, text),
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Unjoined,
    Joining,
    Joined,
    Errored,
}

#[derive(Debug, Clone)]
struct Channel {
    topic: String,
    membership: Membership,
    join_ref: Option<String>,
}

/// An inbound envelope together with its decoded event.
///
/// `event` is `None` when the payload did not match the event's shape; the
/// envelope is still handed to generic listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub envelope: Envelope,
    pub event: Option<ChannelEvent>,
}

// ---------------------------------------------------------------------------
// ChannelConnection
// ---------------------------------------------------------------------------

pub struct ChannelConnection {
    connector: Box<dyn Connector>,
    default_topics: Vec<String>,
    state: ConnectionState,
    sink: Option<Box<dyn FrameSink>>,
    queue: DeliveryQueue<Delivery>,
    next_ref: u64,
    channels: Vec<Channel>,
}

impl ChannelConnection {
    pub fn new(connector: Box<dyn Connector>, default_topics: Vec<String>) -> Self {
        Self {
            connector,
            default_topics,
            state: ConnectionState::Closed,
            sink: None,
            queue: DeliveryQueue::new(),
            next_ref: 1,
            channels: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start opening the transport.  No-op unless currently `Closed`.
    pub fn connect(&mut self, url: &str) -> Result<()> {
        if self.state != ConnectionState::Closed {
            log::debug!("[connection] connect() while {:?} – ignored", self.state);
            return Ok(());
        }

        let epoch = self.queue.advance_epoch();
        self.next_ref = 1;
        log::info!("[connection] Connecting to {} (epoch {})", url, epoch);

        match self.connector.open(url, self.queue.inbox()) {
            Ok(sink) => {
                self.sink = Some(sink);
                self.state = ConnectionState::Connecting;
                Ok(())
            }
            Err(e) => {
                log::error!("[connection] Connect to {} failed: {}", url, e);
                Err(e)
            }
        }
    }

    /// Release the transport now.  Deliveries already queued for this
    /// connection are discarded; a fresh `connect` is required to resume.
    pub fn close(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.close();
            log::info!("[connection] Closed");
        }
        self.queue.advance_epoch();
        self.state = ConnectionState::Closed;
        self.reset_channels();
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn membership(&self, topic: &str) -> Membership {
        self.channel(topic)
            .map_or(Membership::Unjoined, |c| c.membership)
    }

    /// Topics currently marked `Joined`, in join order.
    pub fn joined_topics(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter(|c| c.membership == Membership::Joined)
            .map(|c| c.topic.clone())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Join `topic`.  Already joined (or joining) topics are left alone.
    pub fn join_channel(&mut self, topic: &str) {
        match self.membership(topic) {
            Membership::Joined | Membership::Joining => return,
            Membership::Unjoined | Membership::Errored => {}
        }
        if !self.is_open() {
            log::debug!("[connection] {} will be joined once open", topic);
            self.channel_mut(topic).membership = Membership::Unjoined;
            return;
        }

        let reference = self.make_ref();
        let mut join = Envelope::join(topic, reference.clone());
        join.join_ref = Some(reference.clone());

        self.channel_mut(topic).membership = Membership::Joining;
        let sent = self.transmit(&join);
        let channel = self.channel_mut(topic);
        if sent {
            channel.membership = Membership::Joined;
            channel.join_ref = Some(reference);
            log::info!("[connection] Joined {}", topic);
        } else {
            channel.membership = Membership::Errored;
        }
    }

    /// Send one message if open; otherwise drop it.  Returns whether the
    /// frame was handed to the transport.
    pub fn send(&mut self, topic: &str, event: &str, payload: serde_json::Value) -> bool {
        if !self.is_open() {
            log::debug!("[connection] Not open – dropping {} on {}", event, topic);
            return false;
        }
        let mut envelope = Envelope::new(topic, event, payload, Some(self.make_ref()));
        envelope.join_ref = self.channel(topic).and_then(|c| c.join_ref.clone());
        self.transmit(&envelope)
    }

    /// Keep-alive on the reserved `phoenix` topic.
    pub fn heartbeat(&mut self) -> bool {
        self.send(
            protocol::topics::HEARTBEAT,
            event::HEARTBEAT,
            serde_json::Value::Object(Default::default()),
        )
    }

    fn transmit(&mut self, envelope: &Envelope) -> bool {
        let Some(sink) = &self.sink else {
            return false;
        };
        let frame = match protocol::encode(envelope) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("[connection] Cannot encode {}: {}", envelope.event, e);
                return false;
            }
        };
        match sink.send_text(frame) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[connection] Send of {} failed: {}", envelope.event, e);
                false
            }
        }
    }

    fn make_ref(&mut self) -> String {
        let r = self.next_ref;
        self.next_ref += 1;
        r.to_string()
    }

    // -----------------------------------------------------------------------
    // Inbound – the drain step
    // -----------------------------------------------------------------------

    /// Run up to `limit` queued deliveries (`0` = all) in arrival order.
    ///
    /// Lifecycle deliveries are consumed here; inbound envelopes are
    /// returned, decoded, for the caller to dispatch.
    pub fn poll(&mut self, limit: usize) -> Vec<Dispatch> {
        let mut out = Vec::new();
        for delivery in self.queue.drain(limit) {
            match delivery {
                Delivery::Opened => self.on_opened(),
                Delivery::Closed { reason } => self.on_closed(&reason),
                Delivery::Frame(envelope) => {
                    let event = match ChannelEvent::decode(&envelope) {
                        Ok(ev) => {
                            self.on_control(&envelope, &ev);
                            Some(ev)
                        }
                        Err(e) => {
                            log::warn!("[connection] {}", e);
                            None
                        }
                    };
                    out.push(Dispatch { envelope, event });
                }
            }
        }
        out
    }

    fn on_opened(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        self.state = ConnectionState::Open;
        log::info!("[connection] Open");

        let mut topics = self.default_topics.clone();
        for c in &self.channels {
            if !topics.contains(&c.topic) {
                topics.push(c.topic.clone());
            }
        }
        for topic in topics {
            self.join_channel(&topic);
        }
    }

    fn on_closed(&mut self, reason: &str) {
        log::warn!("[connection] Transport closed: {}", reason);
        self.sink = None;
        self.state = ConnectionState::Closed;
        self.reset_channels();
    }

    fn on_control(&mut self, envelope: &Envelope, ev: &ChannelEvent) {
        match ev {
            ChannelEvent::Reply(reply) if reply.status == "ok" => {
                log::debug!("[connection] Reply ok for {}", envelope.topic);
            }
            ChannelEvent::Reply(reply) => {
                log::warn!(
                    "[connection] Reply {} for {}: {}",
                    reply.status,
                    envelope.topic,
                    reply.response
                );
            }
            ChannelEvent::ChannelError => {
                log::warn!("[connection] Channel {} errored", envelope.topic);
                if let Some(c) = self.find_mut(&envelope.topic) {
                    c.membership = Membership::Errored;
                }
            }
            ChannelEvent::ChannelClosed => {
                log::info!("[connection] Channel {} closed by server", envelope.topic);
                if let Some(c) = self.find_mut(&envelope.topic) {
                    c.membership = Membership::Unjoined;
                    c.join_ref = None;
                }
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Channel table
    // -----------------------------------------------------------------------

    fn channel(&self, topic: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.topic == topic)
    }

    fn find_mut(&mut self, topic: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.topic == topic)
    }

    fn channel_mut(&mut self, topic: &str) -> &mut Channel {
        let idx = match self.channels.iter().position(|c| c.topic == topic) {
            Some(i) => i,
            None => {
                self.channels.push(Channel {
                    topic: topic.to_string(),
                    membership: Membership::Unjoined,
                    join_ref: None,
                });
                self.channels.len() - 1
            }
        };
        &mut self.channels[idx]
    }

    fn reset_channels(&mut self) {
        for c in &mut self.channels {
            c.membership = Membership::Unjoined;
            c.join_ref = None;
        }
    }
}

impl Drop for ChannelConnection {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
