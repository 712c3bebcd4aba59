//! Per-subscription lifecycle callbacks.
//!
//! Every callback is optional; register only what the channel cares about:
//!
//! - [`on_initialized`](ChannelCallbacks::on_initialized): the subscription was added to the registry
//! - [`on_connected`](ChannelCallbacks::on_connected): the server confirmed the subscription
//! - [`on_disconnected`](ChannelCallbacks::on_disconnected): the socket closed underneath the subscription
//! - [`on_rejected`](ChannelCallbacks::on_rejected): the server refused the subscription
//! - [`on_received`](ChannelCallbacks::on_received): an application payload arrived
//!
//! Callbacks run on the connection task. They must not block; to call async
//! APIs from inside one, clone the relevant handle and `tokio::spawn`.
//! [`Subscription::unsubscribe`](crate::Subscription::unsubscribe) is
//! synchronous and safe to call directly from any callback.
//!
//! # Example
//!
//! ```rust
//! use cable_link::ChannelCallbacks;
//!
//! let callbacks = ChannelCallbacks::new()
//!     .on_connected(|| println!("subscription confirmed"))
//!     .on_received(|message| println!("got {}", message))
//!     .on_disconnected(|info| {
//!         println!("socket closed, reconnecting: {}", info.will_attempt_reconnect);
//!     });
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

/// Payload delivered to the `disconnected` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected {
    /// Whether the monitor is still running and will try to reopen the
    /// socket.
    pub will_attempt_reconnect: bool,
}

/// Type alias for the initialized callback.
pub type InitializedCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the connected callback.
pub type ConnectedCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the disconnected callback.
pub type DisconnectedCallback = Arc<dyn Fn(Disconnected) + Send + Sync>;

/// Type alias for the rejected callback.
pub type RejectedCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the received callback.
pub type ReceivedCallback = Arc<dyn Fn(JsonValue) + Send + Sync>;

/// Optional lifecycle callbacks attached to a subscription at creation.
#[derive(Clone, Default)]
pub struct ChannelCallbacks {
    pub(crate) initialized: Option<InitializedCallback>,
    pub(crate) connected: Option<ConnectedCallback>,
    pub(crate) disconnected: Option<DisconnectedCallback>,
    pub(crate) rejected: Option<RejectedCallback>,
    pub(crate) received: Option<ReceivedCallback>,
}

impl fmt::Debug for ChannelCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCallbacks")
            .field("initialized", &self.initialized.is_some())
            .field("connected", &self.connected.is_some())
            .field("disconnected", &self.disconnected.is_some())
            .field("rejected", &self.rejected.is_some())
            .field("received", &self.received.is_some())
            .finish()
    }
}

impl ChannelCallbacks {
    /// Create an empty callback record (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when the subscription is added to the
    /// registry, before the `subscribe` command goes out.
    pub fn on_initialized(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.initialized = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the server confirms the
    /// subscription. Fires again after every reconnect-and-reload cycle the
    /// server re-confirms.
    pub fn on_connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connected = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the socket closes underneath the
    /// subscription.
    pub fn on_disconnected(mut self, f: impl Fn(Disconnected) + Send + Sync + 'static) -> Self {
        self.disconnected = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the server rejects the
    /// subscription. The subscription is removed from the registry first.
    pub fn on_rejected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.rejected = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every application payload addressed
    /// to this subscription's identifier.
    pub fn on_received(mut self, f: impl Fn(JsonValue) + Send + Sync + 'static) -> Self {
        self.received = Some(Arc::new(f));
        self
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_initialized(&self) {
        if let Some(cb) = &self.initialized {
            cb();
        }
    }

    pub(crate) fn emit_connected(&self) {
        if let Some(cb) = &self.connected {
            cb();
        }
    }

    pub(crate) fn emit_disconnected(&self, info: Disconnected) {
        if let Some(cb) = &self.disconnected {
            cb(info);
        }
    }

    pub(crate) fn emit_rejected(&self) {
        if let Some(cb) = &self.rejected {
            cb();
        }
    }

    pub(crate) fn emit_received(&self, message: JsonValue) {
        if let Some(cb) = &self.received {
            cb(message);
        }
    }
}
