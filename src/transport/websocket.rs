//! WebSocket transport – a bridge thread owning the socket and a Tokio
//! runtime.
//!
//! ## Threading model
//!
//! ```text
//! consumer thread              │  bridge thread (current-thread Tokio)
//! ──────────────────────────── │ ─────────────────────────────────────
//! ChannelConnection::connect   │  connect_async(url)
//!   → WebSocketConnector::open │    → inbox.push(Opened | Closed)
//!                              │
//! FrameSink::send_text(frame)  │  select! {
//!   → out_tx.send(Text)       ─┼─▶  out_rx.recv() → ws.send(Text)
//!                              │    ws.next()     → deliver_frame(inbox)
//! ChannelConnection::poll      │  }
//!   ← queue.drain()           ◀┼── inbox.push(Frame | Closed)
//! ```
//!
//! The consumer never touches async code.  Dropping or closing the sink
//! ends the bridge loop and the thread.

use std::thread;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::connection::{deliver_frame, Connector, Delivery, FrameSink};
use crate::error::{Result, SyncError};
use crate::queue::Inbox;

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// Opens `ws://` / `wss://` connections on a dedicated bridge thread.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    thread_name: Option<String>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name given to each bridge thread (default `zone-link-transport`).
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &str, inbox: Inbox<Delivery>) -> Result<Box<dyn FrameSink>> {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Outbound>();
        let url = url.to_string();
        let name = self
            .thread_name
            .clone()
            .unwrap_or_else(|| "zone-link-transport".into());

        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("[transport] Runtime setup failed: {}", e);
                        inbox.push(Delivery::Closed {
                            reason: format!("runtime setup failed: {e}"),
                        });
                        return;
                    }
                };
                rt.block_on(run_bridge(url, inbox, out_rx));
            })
            .map_err(|e| SyncError::Connection(format!("cannot spawn transport thread: {e}")))?;

        Ok(Box::new(WebSocketSink { out: out_tx }))
    }
}

struct WebSocketSink {
    out: mpsc::UnboundedSender<Outbound>,
}

impl FrameSink for WebSocketSink {
    fn send_text(&self, frame: String) -> Result<()> {
        self.out
            .send(Outbound::Text(frame))
            .map_err(|_| SyncError::Connection("transport has exited".into()))
    }

    fn close(&self) {
        let _ = self.out.send(Outbound::Close);
    }
}

// ---------------------------------------------------------------------------
// Bridge loop
// ---------------------------------------------------------------------------

async fn run_bridge(
    url: String,
    inbox: Inbox<Delivery>,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    log::info!("[transport] Connecting to {}", url);

    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            log::error!("[transport] Connect to {} failed: {}", url, e);
            inbox.push(Delivery::Closed {
                reason: format!("connect failed: {e}"),
            });
            return;
        }
    };

    log::info!("[transport] Connected to {}", url);
    inbox.push(Delivery::Opened);

    let (mut write, mut read) = ws.split();

    let reason = loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => deliver_frame(&inbox, &text),
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".into());
                }
                Some(Ok(Message::Binary(data))) => {
                    log::debug!("[transport] Ignoring {}-byte binary frame", data.len());
                }
                // Ping / Pong / raw frames are handled by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("socket error: {e}"),
                None => break "stream ended".to_string(),
            },

            out = out_rx.recv() => match out {
                Some(Outbound::Text(frame)) => {
                    if let Err(e) = write.send(Message::Text(frame)).await {
                        break format!("send failed: {e}");
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    log::info!("[transport] Closed by client");
                    return;
                }
            },
        }
    };

    log::warn!("[transport] Connection lost: {}", reason);
    inbox.push(Delivery::Closed { reason });
}
