//! The consumer facade: one connection, one subscription registry.
//!
//! A [`Consumer`] is created once per endpoint and lives for the life of
//! the host process. It does not dial eagerly; the socket opens on
//! [`connect`](Consumer::connect) or on the first subscription.
//!
//! # Example
//!
//! ```rust,no_run
//! use cable_link::{create_consumer_with_url, ChannelCallbacks};
//! use serde_json::json;
//!
//! # async fn example() -> cable_link::Result<()> {
//! let consumer = create_consumer_with_url("wss://example.com/cable");
//! let subscription = consumer
//!     .subscriptions()
//!     .create("ChatChannel", ChannelCallbacks::new().on_connected(|| println!("live")))
//!     .await?;
//! subscription.perform("speak", json!({"body": "hello"})).await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::get_config;
use crate::connection::{connection_task, Cmd};
use crate::event_handlers::EventHandlers;
use crate::monitor::Visibility;
use crate::protocol::DEFAULT_MOUNT_PATH;
use crate::subscriptions::Subscriptions;
use crate::url::create_websocket_url;

/// Where the cable URL comes from: a fixed string or a factory resolved on
/// every access (e.g. to refresh a signed token in the query string).
#[derive(Clone)]
pub enum UrlSource {
    Static(String),
    Factory(Arc<dyn Fn() -> String + Send + Sync>),
}

impl UrlSource {
    /// Resolve the source and normalize it to a `ws(s)` URL.
    pub(crate) fn resolve(&self) -> String {
        let raw = match self {
            Self::Static(url) => url.clone(),
            Self::Factory(factory) => factory(),
        };
        create_websocket_url(&raw)
    }
}

impl fmt::Debug for UrlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(url) => f.debug_tuple("Static").field(url).finish(),
            Self::Factory(_) => f.debug_tuple("Factory").field(&"<closure>").finish(),
        }
    }
}

/// Create a consumer against the configured URL: the `url` config entry if
/// set (see [`set_config`](crate::config::set_config)), otherwise the
/// default `/cable` mount path.
///
/// Must be called from within a Tokio runtime.
pub fn create_consumer() -> Consumer {
    Consumer::builder().build()
}

/// Create a consumer against an explicit URL.
///
/// Must be called from within a Tokio runtime.
pub fn create_consumer_with_url(url: impl Into<String>) -> Consumer {
    Consumer::builder().url(url).build()
}

struct ConsumerInner {
    url: UrlSource,
    cmd_tx: mpsc::UnboundedSender<Cmd>,
    connected: Arc<AtomicBool>,
    _task: JoinHandle<()>,
}

impl Drop for ConsumerInner {
    fn drop(&mut self) {
        // Best-effort shutdown signal.
        let _ = self.cmd_tx.send(Cmd::Shutdown);
    }
}

/// The top-level client object. Cheap to clone; the connection task shuts
/// down when the last clone is dropped.
#[derive(Clone)]
pub struct Consumer {
    inner: Arc<ConsumerInner>,
}

impl Consumer {
    /// Create a new builder for configuring the consumer.
    pub fn builder() -> ConsumerBuilder {
        ConsumerBuilder::new()
    }

    /// The resolved `ws(s)` URL. Factory sources are re-resolved on every
    /// access.
    pub fn url(&self) -> String {
        self.inner.url.resolve()
    }

    /// Handle for creating channel subscriptions.
    pub fn subscriptions(&self) -> Subscriptions {
        Subscriptions {
            cmd_tx: self.inner.cmd_tx.clone(),
        }
    }

    /// Open the WebSocket. Returns `false` when a connection is already
    /// active; `true` once a dial was initiated (the dial outcome itself is
    /// reported through event handlers and, on failure, retried by the
    /// monitor).
    pub async fn connect(&self) -> bool {
        let (result_tx, result_rx) = oneshot::channel();
        if self.inner.cmd_tx.send(Cmd::Connect { result_tx }).is_err() {
            return false;
        }
        result_rx.await.unwrap_or(false)
    }

    /// Close the WebSocket and stop the monitor; no reconnect will be
    /// attempted until [`connect`](Self::connect) is called again.
    /// Synchronous and safe to call from inside a callback.
    pub fn disconnect(&self) {
        let _ = self.inner.cmd_tx.send(Cmd::Disconnect);
    }

    /// Open the WebSocket unless one is already active. Returns whether a
    /// connection is active or was just initiated.
    pub async fn ensure_active_connection(&self) -> bool {
        let (result_tx, result_rx) = oneshot::channel();
        if self
            .inner
            .cmd_tx
            .send(Cmd::EnsureActive { result_tx })
            .is_err()
        {
            return false;
        }
        result_rx.await.unwrap_or(false)
    }

    /// Transmit an arbitrary JSON frame. Returns `false` without raising
    /// when the socket is not open.
    pub async fn send(&self, data: JsonValue) -> bool {
        let frame = match serde_json::to_string(&data) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[cable-link] Failed to encode frame: {}", e);
                return false;
            }
        };
        let (result_tx, result_rx) = oneshot::channel();
        if self
            .inner
            .cmd_tx
            .send(Cmd::Transmit { frame, result_tx })
            .is_err()
        {
            return false;
        }
        result_rx.await.unwrap_or(false)
    }

    /// Whether the WebSocket is currently open.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Feed a host page-visibility transition into the monitor. Shortly
    /// after the page becomes visible, a stale or closed socket is
    /// reopened.
    pub fn visibility_changed(&self, visibility: Visibility) {
        let _ = self
            .inner
            .cmd_tx
            .send(Cmd::VisibilityChanged(visibility));
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("url", &self.inner.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Builder for configuring [`Consumer`] instances.
pub struct ConsumerBuilder {
    url: Option<UrlSource>,
    event_handlers: EventHandlers,
}

impl ConsumerBuilder {
    fn new() -> Self {
        Self {
            url: None,
            event_handlers: EventHandlers::new(),
        }
    }

    /// Set the cable URL. Accepts `ws(s)`, `http(s)` (rewritten), or a
    /// mount path resolved against the configured origin.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(UrlSource::Static(url.into()));
        self
    }

    /// Set a URL factory, re-resolved on every dial.
    pub fn url_fn(mut self, factory: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.url = Some(UrlSource::Factory(Arc::new(factory)));
        self
    }

    /// Attach connection-level event handlers.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Build the consumer and spawn its connection task.
    ///
    /// Must be called from within a Tokio runtime. The socket is not
    /// dialed until `connect` or the first subscription.
    pub fn build(self) -> Consumer {
        let url = self.url.unwrap_or_else(|| {
            UrlSource::Static(get_config("url").unwrap_or_else(|| DEFAULT_MOUNT_PATH.to_string()))
        });
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(connection_task(
            cmd_rx,
            url.clone(),
            self.event_handlers,
            connected.clone(),
        ));
        Consumer {
            inner: Arc::new(ConsumerInner {
                url,
                cmd_tx,
                connected,
                _task: task,
            }),
        }
    }
}
