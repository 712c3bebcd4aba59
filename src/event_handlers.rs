//! Connection-level event hooks.
//!
//! Subscription callbacks ([`ChannelCallbacks`](crate::ChannelCallbacks))
//! cover per-channel lifecycle; these hooks watch the connection itself:
//!
//! - [`on_connect`](EventHandlers::on_connect): the server's `welcome` arrived, the session is live
//! - [`on_disconnect`](EventHandlers::on_disconnect): the socket closed
//! - [`on_error`](EventHandlers::on_error): a dial or socket error occurred
//! - [`on_receive`](EventHandlers::on_receive) / [`on_send`](EventHandlers::on_send): raw-frame debug taps
//!
//! # Example
//!
//! ```rust
//! use cable_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("cable session live"))
//!     .on_disconnect(|reason| println!("cable closed: {}", reason));
//! ```

use std::fmt;
use std::sync::Arc;

/// Why the socket closed, as far as the client can tell.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description.
    pub message: String,
    /// WebSocket close code, when the peer sent a close frame.
    pub code: Option<u16>,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code: {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Error information passed to the `on_error` hook.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether the monitor may still recover the connection.
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

type ConnectCallback = Arc<dyn Fn() + Send + Sync>;
type DisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;
type FrameCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Connection lifecycle hooks. All optional.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) connect: Option<ConnectCallback>,
    pub(crate) disconnect: Option<DisconnectCallback>,
    pub(crate) error: Option<ErrorCallback>,
    pub(crate) receive: Option<FrameCallback>,
    pub(crate) send: Option<FrameCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("connect", &self.connect.is_some())
            .field("disconnect", &self.disconnect.is_some())
            .field("error", &self.error.is_some())
            .field("receive", &self.receive.is_some())
            .field("send", &self.send.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no hooks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook invoked on every server `welcome`.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connect = Some(Arc::new(f));
        self
    }

    /// Register a hook invoked when the socket closes.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.disconnect = Some(Arc::new(f));
        self
    }

    /// Register a hook invoked on dial and socket errors.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(f));
        self
    }

    /// Register a debug tap for every raw inbound text frame.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.receive = Some(Arc::new(f));
        self
    }

    /// Register a debug tap for every raw outbound text frame.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.send = Some(Arc::new(f));
        self
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.connect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.error {
            cb(error);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.receive {
            cb(raw);
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.send {
            cb(raw);
        }
    }
}
