//! In-process mock cable server for integration tests.
//!
//! Accepts WebSocket connections on a loopback port, negotiates a
//! configurable subprotocol, captures every client frame, and lets tests
//! script server frames. Dropping a connection's sender closes it from the
//! server side.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

/// One accepted client connection.
pub struct ServerConn {
    /// Parsed client-to-server frames.
    pub frames: mpsc::UnboundedReceiver<Value>,
    /// Raw server-to-client frames. Dropping this sender closes the
    /// connection from the server side.
    pub tx: mpsc::UnboundedSender<String>,
    /// Resolves when the connection ends.
    pub closed: oneshot::Receiver<()>,
    /// The `Sec-WebSocket-Protocol` list the client announced.
    pub requested_protocols: Option<String>,
}

pub struct MockServer {
    pub url: String,
    pub connections: mpsc::UnboundedReceiver<ServerConn>,
}

/// Start a mock server that negotiates `protocol` (or none) on every
/// connection.
pub async fn start_server(protocol: Option<&'static str>) -> MockServer {
    let _ = env_logger::builder().is_test(true).try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("ws://{}/cable", addr);
    let (conn_tx, conn_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let requested: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
                let requested_cb = requested.clone();
                let ws = match tokio_tungstenite::accept_hdr_async(
                    stream,
                    move |req: &Request, mut resp: Response| {
                        *requested_cb.lock().unwrap() = req
                            .headers()
                            .get("Sec-WebSocket-Protocol")
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        if let Some(p) = protocol {
                            resp.headers_mut()
                                .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(p));
                        }
                        Ok::<Response, ErrorResponse>(resp)
                    },
                )
                .await
                {
                    Ok(ws) => ws,
                    Err(_) => return,
                };

                let (frame_tx, frame_rx) = mpsc::unbounded_channel();
                let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
                let (closed_tx, closed_rx) = oneshot::channel();
                let requested_protocols = requested.lock().unwrap().take();
                let _ = conn_tx.send(ServerConn {
                    frames: frame_rx,
                    tx: out_tx,
                    closed: closed_rx,
                    requested_protocols,
                });

                let (mut sink, mut source) = ws.split();
                loop {
                    tokio::select! {
                        inbound = source.next() => {
                            match inbound {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                                        let _ = frame_tx.send(value);
                                    }
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            }
                        }
                        outbound = out_rx.recv() => {
                            match outbound {
                                Some(text) => {
                                    if sink.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                None => {
                                    let _ = sink.send(Message::Close(None)).await;
                                    break;
                                }
                            }
                        }
                    }
                }
                let _ = closed_tx.send(());
            });
        }
    });

    MockServer {
        url,
        connections: conn_rx,
    }
}

// ── scripted server frames ──────────────────────────────────────────────────

pub fn welcome() -> String {
    r#"{"type":"welcome"}"#.to_string()
}

pub fn ping() -> String {
    r#"{"type":"ping","message":1717171717}"#.to_string()
}

pub fn confirm(identifier: &str) -> String {
    serde_json::json!({"type": "confirm_subscription", "identifier": identifier}).to_string()
}

pub fn reject(identifier: &str) -> String {
    serde_json::json!({"type": "reject_subscription", "identifier": identifier}).to_string()
}

pub fn disconnect(reason: &str, reconnect: bool) -> String {
    serde_json::json!({"type": "disconnect", "reason": reason, "reconnect": reconnect}).to_string()
}

pub fn broadcast(identifier: &str, message: Value) -> String {
    serde_json::json!({"identifier": identifier, "message": message}).to_string()
}

// ── wait helpers ────────────────────────────────────────────────────────────

/// Wait for the next accepted connection.
pub async fn next_connection(server: &mut MockServer) -> ServerConn {
    tokio::time::timeout(Duration::from_secs(5), server.connections.recv())
        .await
        .expect("timed out waiting for a client connection")
        .expect("mock server stopped")
}

/// Assert that no new connection arrives within `wait`.
pub async fn assert_no_connection(server: &mut MockServer, wait: Duration) {
    if let Ok(Some(_)) = tokio::time::timeout(wait, server.connections.recv()).await {
        panic!("unexpected client connection");
    }
}

/// Wait for the next client frame on a connection.
pub async fn recv_frame(conn: &mut ServerConn) -> Value {
    tokio::time::timeout(Duration::from_secs(5), conn.frames.recv())
        .await
        .expect("timed out waiting for a client frame")
        .expect("server connection closed while waiting for a frame")
}

/// Assert that no client frame arrives within `wait`.
pub async fn assert_no_frame(conn: &mut ServerConn, wait: Duration) {
    if let Ok(Some(frame)) = tokio::time::timeout(wait, conn.frames.recv()).await {
        panic!("unexpected client frame: {}", frame);
    }
}

/// Wait for a unit signal (used with callback-fed channels).
pub async fn recv_signal<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a callback")
        .expect("callback channel closed")
}

/// Assert that no signal arrives within `wait`.
pub async fn assert_no_signal<T: std::fmt::Debug>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    wait: Duration,
) {
    if let Ok(Some(value)) = tokio::time::timeout(wait, rx.recv()).await {
        panic!("unexpected callback: {:?}", value);
    }
}
