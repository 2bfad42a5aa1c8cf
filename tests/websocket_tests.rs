//! Live WebSocket round-trip against a local tokio-tungstenite server

#![cfg(feature = "transport")]

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::{accept_async, tungstenite::Message};
    use zone_link::protocol::{decode, encode};
    use zone_link::{ClientConfig, ConnectionState, Envelope, Membership, Vec3, ZoneClient};

    /// Accepts one client, waits for its zone join, pushes a snapshot, then
    /// reports the first chat frame it receives.
    async fn serve_once(listener: TcpListener, chat_tx: oneshot::Sender<Envelope>) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let env = decode(&text).unwrap();

            if env.event == "phx_join" {
                let reply = Envelope::new(
                    env.topic.as_str(),
                    "phx_reply",
                    json!({"status": "ok", "response": {}}),
                    env.reference.clone(),
                );
                ws.send(Message::Text(encode(&reply).unwrap())).await.unwrap();

                let snapshot = Envelope::new(
                    env.topic.as_str(),
                    "zone_state",
                    json!({"players": [{"id": "p1", "position": {"x": 1.0, "y": 2.0, "z": 3.0}}]}),
                    None,
                );
                ws.send(Message::Text(encode(&snapshot).unwrap())).await.unwrap();
            } else if env.event == "message" {
                let _ = chat_tx.send(env);
                let _ = ws.close(None).await;
                return;
            }
        }
    }

    async fn poll_until(client: &mut ZoneClient, mut done: impl FnMut(&ZoneClient) -> bool) -> bool {
        for _ in 0..500 {
            client.poll();
            if done(client) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn snapshot_and_chat_over_real_socket() {
        let listener = tokio_test::assert_ok!(TcpListener::bind("127.0.0.1:0").await);
        let addr = listener.local_addr().unwrap();
        let (chat_tx, chat_rx) = oneshot::channel();
        let server = tokio::spawn(serve_once(listener, chat_tx));

        let config = ClientConfig {
            socket_url: format!("ws://{addr}"),
            default_topics: vec!["zone:1".into()],
            heartbeat_secs: 0,
            ..Default::default()
        };
        let mut client = ZoneClient::websocket(config);
        tokio_test::assert_ok!(client.connect());
        assert_eq!(client.state(), ConnectionState::Connecting);

        assert!(poll_until(&mut client, |c| c.entity("p1").is_some()).await);
        assert_eq!(client.entity("p1").unwrap().position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(client.membership("zone:1"), Membership::Joined);

        assert!(client.send_chat("zone:1", "hi"));
        let chat = tokio::time::timeout(Duration::from_secs(5), chat_rx)
            .await
            .expect("server saw no chat")
            .unwrap();
        assert_eq!(chat.payload["text"], "hi");
        assert_eq!(chat.reference.as_deref(), Some("2"));

        assert!(poll_until(&mut client, |c| c.state() == ConnectionState::Closed).await);
        assert!(client.entities().is_empty());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_server_reports_closed() {
        // Bind then drop so the port is very likely free.
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();

        let config = ClientConfig {
            socket_url: format!("ws://{addr}"),
            heartbeat_secs: 0,
            ..Default::default()
        };
        let mut client = ZoneClient::websocket(config);
        client.connect().unwrap();

        assert!(poll_until(&mut client, |c| c.state() == ConnectionState::Closed).await);
        assert!(!client.send_chat("chat:global", "nobody home"));
    }
}
