//! Client for the Action Cable v1 JSON protocol: many logical channel
//! subscriptions multiplexed over a single WebSocket.
//!
//! A [`Consumer`] owns one connection and one subscription registry.
//! Application code subscribes to named channels, sends commands, and
//! receives asynchronous payloads through per-subscription callbacks:
//!
//! - Single shared WebSocket for all subscriptions
//! - Payload routing by canonical-JSON identifier
//! - Staleness detection from server pings, with logarithmic reconnect
//!   backoff and page-visibility-aware reopens
//! - Automatic re-subscription of every tracked channel after a reconnect
//! - Fire-and-forget sends: a payload sent while disconnected is dropped
//!   and reported via a `false` return, never an error
//!
//! # Example
//!
//! ```rust,no_run
//! use cable_link::{create_consumer_with_url, ChannelCallbacks};
//! use serde_json::json;
//!
//! # async fn example() -> cable_link::Result<()> {
//! let consumer = create_consumer_with_url("wss://chat.example.com/cable");
//!
//! let room = consumer
//!     .subscriptions()
//!     .create(
//!         json!({"channel": "ChatChannel", "room": "ops"}),
//!         ChannelCallbacks::new()
//!             .on_connected(|| println!("subscribed"))
//!             .on_received(|message| println!("<- {}", message)),
//!     )
//!     .await?;
//!
//! room.perform("speak", json!({"body": "deploy finished"})).await;
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod config;
mod connection;
pub mod consumer;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod monitor;
pub mod protocol;
pub mod subscriptions;
mod url;

pub use callbacks::{ChannelCallbacks, Disconnected};
pub use connection::{SocketState, REOPEN_DELAY};
pub use consumer::{create_consumer, create_consumer_with_url, Consumer, ConsumerBuilder, UrlSource};
pub use error::{CableLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{ChannelParams, ClientCommand, MessageType, ServerMessage};
pub use monitor::{Visibility, STALE_THRESHOLD, VISIBILITY_DEBOUNCE};
pub use subscriptions::{Subscription, Subscriptions};
