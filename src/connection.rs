//! The WebSocket connection and its dispatch loop.
//!
//! One background task owns the socket, the [`ConnectionMonitor`], and the
//! subscription [`Registry`]. Inbound frame dispatch, command handling,
//! monitor polls, the visibility debounce, and the delayed reopen all run
//! on this single task, so handlers are never preempted mid-dispatch and
//! the registry needs no locking.
//!
//! Lifecycle:
//!
//! 1. `open()` dials the endpoint with the cable subprotocols and starts
//!    the monitor
//! 2. the loop multiplexes socket frames, API commands, and timer deadlines
//! 3. a stale or dropped socket is reopened by the monitor's poll
//! 4. the server's `welcome` re-advertises every tracked subscription

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value as JsonValue;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant as TokioInstant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::callbacks::{ChannelCallbacks, Disconnected};
use crate::consumer::UrlSource;
use crate::error::{CableLinkError, Result};
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::models::{ClientCommand, MessageType, ServerMessage};
use crate::monitor::{
    ConnectionMonitor, StaleCheck, Visibility, VISIBILITY_DEBOUNCE,
};
use crate::protocol::{is_protocol_supported, PROTOCOLS};
use crate::subscriptions::Registry;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Delay between closing a live socket and redialing it.
pub const REOPEN_DELAY: Duration = Duration::from_millis(500);

/// Ceiling for the WebSocket dial (TCP + TLS + handshake).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum accepted text frame size (64 MiB).
const MAX_TEXT_FRAME_BYTES: usize = 64 << 20;

/// Sleep target for disarmed timers; ~100 years is effectively "never".
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Symbolic readiness of the underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        write!(f, "{}", label)
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public handles to the connection task.
pub(crate) enum Cmd {
    /// Track a new subscription and advertise it to the server.
    Create {
        identifier: String,
        callbacks: ChannelCallbacks,
        result_tx: oneshot::Sender<u64>,
    },
    /// Remove one tracked subscription by entry id.
    Remove { entry_id: u64 },
    /// Transmit a pre-encoded frame if the socket is open.
    Transmit {
        frame: String,
        result_tx: oneshot::Sender<bool>,
    },
    /// Open the socket (no-op if already active).
    Connect { result_tx: oneshot::Sender<bool> },
    /// Open the socket only if it is not already active.
    EnsureActive { result_tx: oneshot::Sender<bool> },
    /// Close the socket and stop the monitor.
    Disconnect,
    /// Host page visibility changed.
    VisibilityChanged(Visibility),
    /// Tear everything down and exit the task.
    Shutdown,
}

// ── Connection ──────────────────────────────────────────────────────────────

/// Owns the socket and its identity: readiness state, negotiated
/// subprotocol, the `disconnected` transition flag, and the monitor.
pub(crate) struct Connection {
    url: UrlSource,
    state: SocketState,
    socket: Option<WsStream>,
    negotiated_protocol: Option<String>,
    /// Starts `true`; flips on socket open and back on the close
    /// *transition*. Deduplicates consecutive closes: only the transition
    /// fans out to subscriptions.
    disconnected: bool,
    pub(crate) monitor: ConnectionMonitor,
    handlers: EventHandlers,
    connected_flag: Arc<AtomicBool>,
}

impl Connection {
    fn new(url: UrlSource, handlers: EventHandlers, connected_flag: Arc<AtomicBool>) -> Self {
        Self {
            url,
            state: SocketState::Closed,
            socket: None,
            negotiated_protocol: None,
            disconnected: true,
            monitor: ConnectionMonitor::new(),
            handlers,
            connected_flag,
        }
    }

    fn is_open(&self) -> bool {
        self.state == SocketState::Open
    }

    fn is_active(&self) -> bool {
        matches!(self.state, SocketState::Open | SocketState::Connecting)
    }

    fn has_socket(&self) -> bool {
        self.socket.is_some()
    }

    fn is_protocol_supported(&self) -> bool {
        is_protocol_supported(self.negotiated_protocol.as_deref())
    }

    /// Transmit a frame if the socket is open. Returns `false` otherwise;
    /// dropped sends are made up by the `welcome`-driven reload.
    async fn send(&mut self, frame: &str) -> bool {
        if !self.is_open() {
            log::debug!(
                "[cable-link] Dropping outbound frame, socket is {}",
                self.state
            );
            return false;
        }
        let Some(ws) = self.socket.as_mut() else {
            return false;
        };
        match ws.send(Message::Text(frame.to_string().into())).await {
            Ok(()) => {
                self.handlers.emit_send(frame);
                true
            }
            Err(e) => {
                log::warn!("[cable-link] Failed to send frame: {}", e);
                self.handlers
                    .emit_error(ConnectionError::new(format!("Send failed: {}", e), true));
                false
            }
        }
    }

    /// Dial a new socket. Returns `false` when one is already active.
    ///
    /// The monitor starts before the dial resolves; a refused dial leaves
    /// it running, and its staleness poll drives the retry. A failed dial
    /// produces no close fanout: no socket ever opened, so `disconnected`
    /// never transitioned.
    async fn open(&mut self) -> bool {
        if self.is_active() {
            log::warn!(
                "[cable-link] Attempted to open a WebSocket that is already {}",
                self.state
            );
            return false;
        }
        // Dropping the previous socket here neutralizes it: a dropped
        // stream can never deliver another event into this task.
        self.socket = None;
        self.negotiated_protocol = None;
        self.state = SocketState::Connecting;
        self.monitor.start();

        let url = self.url.resolve();
        log::info!(
            "[cable-link] Opening WebSocket to {}, announcing {:?}",
            url,
            PROTOCOLS
        );
        match dial(&url).await {
            Ok((stream, protocol)) => {
                self.socket = Some(stream);
                self.negotiated_protocol = protocol;
                self.state = SocketState::Open;
                self.disconnected = false;
                self.connected_flag.store(true, Ordering::SeqCst);
                log::debug!(
                    "[cable-link] WebSocket open, using {:?} subprotocol",
                    self.negotiated_protocol
                );
                if !self.is_protocol_supported() {
                    log::error!(
                        "[cable-link] Negotiated subprotocol {:?} is not supported, disconnecting",
                        self.negotiated_protocol
                    );
                    self.close(false).await;
                }
            }
            Err(e) => {
                log::warn!("[cable-link] WebSocket dial failed: {}", e);
                self.handlers.emit_error(ConnectionError::new(
                    format!("Connection failed: {}", e),
                    true,
                ));
                self.state = SocketState::Closed;
            }
        }
        true
    }

    /// Request a socket close. With `allow_reconnect == false` the monitor
    /// stops first, so the close fanout reports no reconnect and no reopen
    /// is ever attempted.
    async fn close(&mut self, allow_reconnect: bool) {
        if !allow_reconnect {
            self.monitor.stop();
        }
        if self.is_active() {
            if let Some(ws) = self.socket.as_mut() {
                self.state = SocketState::Closing;
                if let Err(e) = ws.close(None).await {
                    log::debug!("[cable-link] Error while closing WebSocket: {}", e);
                }
            } else {
                self.state = SocketState::Closed;
            }
        }
    }

    /// Recycle the socket. An active connection is closed (errors
    /// swallowed) and the redial is scheduled after [`REOPEN_DELAY`];
    /// an inactive one is redialed immediately. Returns the deadline the
    /// caller should arm, if any.
    async fn reopen(&mut self) -> Option<Instant> {
        log::info!(
            "[cable-link] Reopening WebSocket, current state is {}",
            self.state
        );
        if self.is_active() {
            self.close(true).await;
            Some(Instant::now() + REOPEN_DELAY)
        } else {
            self.open().await;
            None
        }
    }

    /// Register that the socket is gone. Returns whether this was the
    /// `disconnected` transition (and the fanout should run); a close
    /// arriving while already disconnected produces nothing.
    fn handle_socket_close(&mut self) -> bool {
        self.socket = None;
        self.negotiated_protocol = None;
        self.state = SocketState::Closed;
        self.connected_flag.store(false, Ordering::SeqCst);
        if self.disconnected {
            return false;
        }
        self.disconnected = true;
        self.monitor.record_disconnect();
        log::info!("[cable-link] WebSocket closed");
        true
    }

    /// Next inbound frame. Pends forever without a socket; callers guard
    /// on [`has_socket`](Self::has_socket).
    async fn next_frame(&mut self) -> Option<std::result::Result<Message, WsError>> {
        match self.socket.as_mut() {
            Some(ws) => ws.next().await,
            None => std::future::pending().await,
        }
    }

    async fn pong(&mut self, payload: Bytes) {
        if let Some(ws) = self.socket.as_mut() {
            if let Err(e) = ws.send(Message::Pong(payload)).await {
                log::debug!("[cable-link] Failed to send pong: {}", e);
            }
        }
    }
}

/// Dial `url` announcing the cable subprotocols; resolves to the stream and
/// the subprotocol the server negotiated.
async fn dial(url: &str) -> Result<(WsStream, Option<String>)> {
    let mut request = url.into_client_request().map_err(|e| {
        CableLinkError::WebSocketError(format!("Failed to build WebSocket request: {}", e))
    })?;
    let protocols = HeaderValue::from_str(&PROTOCOLS.join(", ")).map_err(|e| {
        CableLinkError::WebSocketError(format!("Invalid subprotocol header: {}", e))
    })?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, protocols);

    let (stream, response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
        .await
        .map_err(|_| {
            CableLinkError::TimeoutError(format!("Connection timeout ({:?})", CONNECT_TIMEOUT))
        })??;

    let protocol = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    Ok((stream, protocol))
}

// ── The connection task ─────────────────────────────────────────────────────

fn deadline_or_far(deadline: Option<Instant>) -> TokioInstant {
    match deadline {
        Some(instant) => TokioInstant::from_std(instant),
        None => TokioInstant::now() + FAR_FUTURE,
    }
}

/// Encode and transmit a client command. Failed sends are deliberate
/// no-ops: the next `welcome` reload re-advertises subscriptions.
async fn send_command(connection: &mut Connection, command: ClientCommand) -> bool {
    match command.to_json() {
        Ok(frame) => connection.send(&frame).await,
        Err(e) => {
            log::warn!("[cable-link] Failed to encode {:?}: {}", command, e);
            false
        }
    }
}

/// Run the close transition and, if it fired, fan `disconnected` out to the
/// handlers and every tracked subscription.
fn finish_close(connection: &mut Connection, registry: &Registry, reason: DisconnectReason) {
    if connection.handle_socket_close() {
        let will_attempt_reconnect = connection.monitor.is_running();
        connection.handlers.emit_disconnect(reason);
        registry.notify_all(|callbacks| {
            callbacks.emit_disconnected(Disconnected {
                will_attempt_reconnect,
            });
        });
    }
}

/// Re-advertise every tracked subscription, in insertion order. Runs on
/// every `welcome`; this is how subscriptions survive a reconnect.
async fn reload_subscriptions(connection: &mut Connection, registry: &Registry) {
    let identifiers = registry.identifiers();
    if identifiers.is_empty() {
        return;
    }
    log::debug!(
        "[cable-link] Re-advertising {} subscription(s)",
        identifiers.len()
    );
    for identifier in identifiers {
        send_command(connection, ClientCommand::Subscribe { identifier }).await;
    }
}

/// Parse and dispatch one inbound text frame.
async fn dispatch_text(connection: &mut Connection, registry: &mut Registry, raw: &str) {
    if raw.len() > MAX_TEXT_FRAME_BYTES {
        log::warn!(
            "[cable-link] Dropping oversized text frame ({} bytes)",
            raw.len()
        );
        return;
    }
    connection.handlers.emit_receive(raw);
    if !connection.is_protocol_supported() {
        return;
    }
    let message: ServerMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("[cable-link] Failed to parse inbound frame: {}", e);
            return;
        }
    };
    match message.kind {
        Some(MessageType::Welcome) => {
            log::debug!("[cable-link] Welcome received, session is live");
            connection.monitor.record_connect();
            connection.handlers.emit_connect();
            reload_subscriptions(connection, registry).await;
        }
        Some(MessageType::Disconnect) => {
            let reconnect = message.reconnect.unwrap_or(false);
            log::info!(
                "[cable-link] Disconnect received: reason={:?}, reconnect={}",
                message.reason,
                reconnect
            );
            connection.close(reconnect).await;
        }
        Some(MessageType::Ping) => {
            connection.monitor.record_ping();
        }
        Some(MessageType::ConfirmSubscription) => match message.identifier {
            Some(identifier) => {
                log::debug!("[cable-link] Subscription confirmed: {}", identifier);
                registry.notify(&identifier, |callbacks| callbacks.emit_connected());
            }
            None => log::warn!("[cable-link] confirm_subscription frame without an identifier"),
        },
        Some(MessageType::RejectSubscription) => match message.identifier {
            Some(identifier) => {
                let removed = registry.reject(&identifier);
                log::info!(
                    "[cable-link] Subscription rejected: {} ({} entries dropped)",
                    identifier,
                    removed.len()
                );
                for entry in removed {
                    entry.callbacks.emit_rejected();
                }
            }
            None => log::warn!("[cable-link] reject_subscription frame without an identifier"),
        },
        // No recognized type: an application payload addressed to
        // `identifier`.
        Some(MessageType::Unknown) | None => match message.identifier {
            Some(identifier) => {
                let payload = message.message.unwrap_or(JsonValue::Null);
                registry.notify(&identifier, |callbacks| {
                    callbacks.emit_received(payload.clone())
                });
            }
            None => log::debug!("[cable-link] Dropping frame with no identifier"),
        },
    }
}

/// The background task owning the connection, the monitor, and the
/// registry.
pub(crate) async fn connection_task(
    mut cmd_rx: mpsc::UnboundedReceiver<Cmd>,
    url: UrlSource,
    handlers: EventHandlers,
    connected_flag: Arc<AtomicBool>,
) {
    let mut connection = Connection::new(url, handlers, connected_flag);
    let mut registry = Registry::default();

    // At most one of each timer is armed at a time.
    let mut poll_deadline: Option<Instant> = None;
    let mut reopen_deadline: Option<Instant> = None;
    let mut visibility_deadline: Option<Instant> = None;

    loop {
        // Keep the staleness poll armed exactly while the monitor runs.
        if connection.monitor.is_running() {
            if poll_deadline.is_none() {
                poll_deadline = Some(Instant::now() + connection.monitor.poll_interval());
            }
        } else {
            poll_deadline = None;
        }

        let has_socket = connection.has_socket();
        let poll_armed = poll_deadline.is_some();
        let reopen_armed = reopen_deadline.is_some();
        let visibility_armed = visibility_deadline.is_some();

        let poll_sleep = sleep_until(deadline_or_far(poll_deadline));
        let reopen_sleep = sleep_until(deadline_or_far(reopen_deadline));
        let visibility_sleep = sleep_until(deadline_or_far(visibility_deadline));
        tokio::pin!(poll_sleep, reopen_sleep, visibility_sleep);

        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Cmd::Create { identifier, callbacks, result_tx }) => {
                        let entry_id = registry.add(identifier.clone(), callbacks);
                        if !connection.is_active() {
                            connection.open().await;
                        }
                        registry.notify_entry(entry_id, |callbacks| callbacks.emit_initialized());
                        send_command(&mut connection, ClientCommand::Subscribe { identifier }).await;
                        let _ = result_tx.send(entry_id);
                    }
                    Some(Cmd::Remove { entry_id }) => {
                        if let Some(removed) = registry.remove(entry_id) {
                            if removed.send_unsubscribe {
                                send_command(
                                    &mut connection,
                                    ClientCommand::Unsubscribe {
                                        identifier: removed.entry.identifier,
                                    },
                                )
                                .await;
                            }
                        }
                    }
                    Some(Cmd::Transmit { frame, result_tx }) => {
                        let _ = result_tx.send(connection.send(&frame).await);
                    }
                    Some(Cmd::Connect { result_tx }) => {
                        let _ = result_tx.send(connection.open().await);
                    }
                    Some(Cmd::EnsureActive { result_tx }) => {
                        let active = if connection.is_active() {
                            true
                        } else {
                            connection.open().await
                        };
                        let _ = result_tx.send(active);
                    }
                    Some(Cmd::Disconnect) => {
                        connection.close(false).await;
                    }
                    Some(Cmd::VisibilityChanged(visibility)) => {
                        if visibility == Visibility::Visible && connection.monitor.is_running() {
                            // Re-arming replaces any pending check, so rapid
                            // tab toggling collapses into one.
                            visibility_deadline = Some(Instant::now() + VISIBILITY_DEBOUNCE);
                        }
                    }
                    Some(Cmd::Shutdown) | None => {
                        log::debug!("[cable-link] Connection task shutting down");
                        connection.close(false).await;
                        finish_close(
                            &mut connection,
                            &registry,
                            DisconnectReason::new("Consumer shut down"),
                        );
                        return;
                    }
                }
            }

            frame = connection.next_frame(), if has_socket => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_text(&mut connection, &mut registry, text.as_str()).await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        connection.pong(payload).await;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Binary(data))) => {
                        log::debug!(
                            "[cable-link] Ignoring {}-byte binary frame (not part of the v1-json grammar)",
                            data.len()
                        );
                    }
                    Some(Ok(Message::Close(close_frame))) => {
                        let reason = match close_frame {
                            Some(f) => DisconnectReason::with_code(f.reason.to_string(), f.code.into()),
                            None => DisconnectReason::new("Server closed connection"),
                        };
                        finish_close(&mut connection, &registry, reason);
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        // Log and report; the close transition right after
                        // does the real work.
                        log::warn!("[cable-link] WebSocket error: {}", e);
                        connection
                            .handlers
                            .emit_error(ConnectionError::new(e.to_string(), true));
                        finish_close(
                            &mut connection,
                            &registry,
                            DisconnectReason::new(format!("WebSocket error: {}", e)),
                        );
                    }
                    None => {
                        finish_close(
                            &mut connection,
                            &registry,
                            DisconnectReason::new("WebSocket stream ended"),
                        );
                    }
                }
            }

            _ = &mut poll_sleep, if poll_armed => {
                poll_deadline = None;
                match connection.monitor.reconnect_if_stale() {
                    StaleCheck::Fresh => {}
                    StaleCheck::SkipReopen => {
                        log::debug!(
                            "[cable-link] Connection is stale but the socket just closed on its own, skipping reopen"
                        );
                    }
                    StaleCheck::Reopen => {
                        log::info!(
                            "[cable-link] Connection is stale, reopening (attempt {})",
                            connection.monitor.reconnect_attempts
                        );
                        reopen_deadline = connection.reopen().await;
                    }
                }
            }

            _ = &mut reopen_sleep, if reopen_armed => {
                reopen_deadline = None;
                connection.open().await;
            }

            _ = &mut visibility_sleep, if visibility_armed => {
                visibility_deadline = None;
                if connection.monitor.is_running()
                    && (connection.monitor.connection_stale() || !connection.is_open())
                {
                    log::debug!(
                        "[cable-link] Page became visible with a stale or closed socket, reopening"
                    );
                    if let Some(deadline) = connection.reopen().await {
                        reopen_deadline = Some(deadline);
                    }
                }
            }
        }
    }
}
