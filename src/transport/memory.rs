//! In-memory transport.
//!
//! Stands in for the socket in tests: frames the client sends are recorded,
//! and the test plays the server by pushing deliveries into the current
//! connection's inbox, from any thread.
//!
//! ```
//! use zone_link::transport::MemoryConnector;
//! use zone_link::connection::ChannelConnection;
//!
//! let server = MemoryConnector::new();
//! let mut conn = ChannelConnection::new(Box::new(server.clone()), vec!["zone:1".into()]);
//! conn.connect("memory://").unwrap();
//! conn.poll(0); // handles Opened, sends the join
//! assert_eq!(server.sent_envelopes()[0].event, "phx_join");
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::connection::{deliver_frame, Connector, Delivery, FrameSink};
use crate::error::{Result, SyncError};
use crate::protocol::{self, Envelope};
use crate::queue::Inbox;

#[derive(Default)]
struct State {
    /// Text frames the client transmitted, across all connections.
    sent: Vec<String>,
    /// Inbox of the most recent `open`.
    inbox: Option<Inbox<Delivery>>,
    /// `Opened` is pushed from inside `open` when set.
    auto_open: bool,
    /// Makes the next `open` fail with this reason.
    fail_next: Option<String>,
    /// Set once the most recent sink has been closed.
    sink_closed: bool,
    opens: usize,
    urls: Vec<String>,
}

/// Shared handle: keep one clone in the test, box another into the client.
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    /// Reports `Opened` as soon as the client connects.
    pub fn new() -> Self {
        Self::with_auto_open(true)
    }

    /// Stays in `Connecting` until [`MemoryConnector::complete_open`].
    pub fn manual() -> Self {
        Self::with_auto_open(false)
    }

    fn with_auto_open(auto_open: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                auto_open,
                ..Default::default()
            })),
        }
    }

    // ------------------------------------------------------------------
    // Server side
    // ------------------------------------------------------------------

    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.state.lock().fail_next = Some(reason.into());
    }

    pub fn complete_open(&self) {
        self.push(Delivery::Opened);
    }

    /// Deliver a raw text frame, exactly as a socket would.
    pub fn push_frame(&self, text: &str) {
        if let Some(inbox) = self.inbox() {
            deliver_frame(&inbox, text);
        }
    }

    pub fn push_envelope(&self, envelope: &Envelope) {
        match protocol::encode(envelope) {
            Ok(text) => self.push_frame(&text),
            Err(e) => log::warn!("[memory] Cannot encode test envelope: {}", e),
        }
    }

    /// Simulate the remote end dropping the socket.
    pub fn drop_connection(&self, reason: &str) {
        self.push(Delivery::Closed {
            reason: reason.to_string(),
        });
    }

    /// Inbox of the latest connection, for pushing from other threads.
    pub fn inbox(&self) -> Option<Inbox<Delivery>> {
        self.state.lock().inbox.clone()
    }

    fn push(&self, delivery: Delivery) {
        if let Some(inbox) = self.inbox() {
            inbox.push(delivery);
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent()
            .iter()
            .filter_map(|f| protocol::decode(f).ok())
            .collect()
    }

    pub fn bytes_sent(&self) -> usize {
        self.state.lock().sent.iter().map(String::len).sum()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.lock().urls.clone()
    }

    pub fn is_sink_closed(&self) -> bool {
        self.state.lock().sink_closed
    }
}

impl Connector for MemoryConnector {
    fn open(&self, url: &str, inbox: Inbox<Delivery>) -> Result<Box<dyn FrameSink>> {
        let mut st = self.state.lock();
        if let Some(reason) = st.fail_next.take() {
            return Err(SyncError::Connection(reason));
        }
        st.opens += 1;
        st.urls.push(url.to_string());
        st.sink_closed = false;
        if st.auto_open {
            inbox.push(Delivery::Opened);
        }
        st.inbox = Some(inbox);
        Ok(Box::new(MemorySink {
            state: self.state.clone(),
        }))
    }
}

struct MemorySink {
    state: Arc<Mutex<State>>,
}

impl FrameSink for MemorySink {
    fn send_text(&self, frame: String) -> Result<()> {
        let mut st = self.state.lock();
        if st.sink_closed {
            return Err(SyncError::Connection("memory sink closed".into()));
        }
        st.sent.push(frame);
        Ok(())
    }

    fn close(&self) {
        self.state.lock().sink_closed = true;
    }
}
