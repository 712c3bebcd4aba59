//! The channel-subscription registry and its application-facing handles.
//!
//! The registry itself lives on the connection task and owns every
//! subscription; application code holds [`Subscription`] back-references
//! that route operations through the task's command channel. Duplicate
//! subscriptions to the same params are permitted and tracked separately:
//! callbacks fan out to all of them, while the wire-level `unsubscribe` is
//! only sent once the last entry for an identifier is gone.

use serde_json::{Map, Value as JsonValue};
use tokio::sync::{mpsc, oneshot};

use crate::callbacks::ChannelCallbacks;
use crate::connection::Cmd;
use crate::error::{CableLinkError, Result};
use crate::models::{ChannelParams, ClientCommand};

// ── Registry (owned by the connection task) ─────────────────────────────────

/// One tracked subscription.
pub(crate) struct Entry {
    /// Unique tag distinguishing duplicate subscriptions to equal params.
    pub(crate) entry_id: u64,
    pub(crate) identifier: String,
    pub(crate) callbacks: ChannelCallbacks,
}

/// Result of removing a single entry.
pub(crate) struct Removed {
    pub(crate) entry: Entry,
    /// True when no remaining entry shares the identifier, i.e. the server
    /// should be told to drop it.
    pub(crate) send_unsubscribe: bool,
}

/// Insertion-ordered subscription registry.
#[derive(Default)]
pub(crate) struct Registry {
    entries: Vec<Entry>,
    next_entry_id: u64,
}

impl Registry {
    /// Append a subscription and return its entry id.
    pub(crate) fn add(&mut self, identifier: String, callbacks: ChannelCallbacks) -> u64 {
        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;
        self.entries.push(Entry {
            entry_id,
            identifier,
            callbacks,
        });
        entry_id
    }

    /// Remove one entry. The wire-level unsubscribe is deduplicated: it is
    /// only requested when the removed entry was the identifier's last.
    pub(crate) fn remove(&mut self, entry_id: u64) -> Option<Removed> {
        let index = self.entries.iter().position(|e| e.entry_id == entry_id)?;
        let entry = self.entries.remove(index);
        let send_unsubscribe = !self
            .entries
            .iter()
            .any(|e| e.identifier == entry.identifier);
        log::debug!(
            "[cable-link] Removed subscription {} ({} tracked)",
            entry.identifier,
            self.entries.len()
        );
        Some(Removed {
            entry,
            send_unsubscribe,
        })
    }

    /// Remove every entry sharing `identifier` (server-side rejection).
    /// No unsubscribe goes out; the server never registered it.
    pub(crate) fn reject(&mut self, identifier: &str) -> Vec<Entry> {
        let (removed, kept): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.identifier == identifier);
        self.entries = kept;
        removed
    }

    /// All tracked identifiers in insertion order, duplicates included.
    /// This is the `welcome`-driven reload set.
    pub(crate) fn identifiers(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.identifier.clone()).collect()
    }

    /// Invoke `f` on the callbacks of every entry matching `identifier`.
    ///
    /// Iterates over a snapshot: callbacks may reentrantly enqueue
    /// registry mutations without corrupting the walk.
    pub(crate) fn notify(&self, identifier: &str, f: impl Fn(&ChannelCallbacks)) {
        let snapshot: Vec<ChannelCallbacks> = self
            .entries
            .iter()
            .filter(|e| e.identifier == identifier)
            .map(|e| e.callbacks.clone())
            .collect();
        for callbacks in &snapshot {
            f(callbacks);
        }
    }

    /// Invoke `f` on the callbacks of a single entry, by entry id.
    pub(crate) fn notify_entry(&self, entry_id: u64, f: impl FnOnce(&ChannelCallbacks)) {
        if let Some(entry) = self.entries.iter().find(|e| e.entry_id == entry_id) {
            let callbacks = entry.callbacks.clone();
            f(&callbacks);
        }
    }

    /// Invoke `f` on every tracked entry's callbacks (snapshot semantics as
    /// [`notify`](Self::notify)).
    pub(crate) fn notify_all(&self, f: impl Fn(&ChannelCallbacks)) {
        let snapshot: Vec<ChannelCallbacks> =
            self.entries.iter().map(|e| e.callbacks.clone()).collect();
        for callbacks in &snapshot {
            f(callbacks);
        }
    }
}

// ── Application-facing handles ──────────────────────────────────────────────

/// Handle for creating channel subscriptions on a consumer.
///
/// Obtained from [`Consumer::subscriptions`](crate::Consumer::subscriptions);
/// cheap to clone and safe to hand to other tasks.
#[derive(Clone)]
pub struct Subscriptions {
    pub(crate) cmd_tx: mpsc::UnboundedSender<Cmd>,
}

impl Subscriptions {
    /// Subscribe to a channel.
    ///
    /// Accepts a bare channel name or a full params object (see
    /// [`ChannelParams`]). Opens the WebSocket if it is not already active,
    /// fires the `initialized` callback, and sends the `subscribe` command.
    /// Returns once the subscription is tracked; the server's confirmation
    /// arrives later through the `connected` callback.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use cable_link::{create_consumer, ChannelCallbacks};
    /// use serde_json::json;
    ///
    /// # async fn example() -> cable_link::Result<()> {
    /// let consumer = create_consumer();
    /// let subscription = consumer
    ///     .subscriptions()
    ///     .create(
    ///         json!({"channel": "ChatChannel", "room": 5}),
    ///         ChannelCallbacks::new().on_received(|msg| println!("{}", msg)),
    ///     )
    ///     .await?;
    /// subscription.perform("speak", json!({"body": "hello"})).await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create(
        &self,
        channel: impl Into<ChannelParams>,
        callbacks: ChannelCallbacks,
    ) -> Result<Subscription> {
        let params = channel.into();
        let identifier = params.identifier()?;
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(Cmd::Create {
                identifier: identifier.clone(),
                callbacks,
                result_tx,
            })
            .map_err(|_| {
                CableLinkError::WebSocketError("Connection task is not running".to_string())
            })?;
        let entry_id = result_rx.await.map_err(|_| {
            CableLinkError::InternalError(
                "Connection task exited before confirming the subscription".to_string(),
            )
        })?;
        Ok(Subscription {
            identifier,
            entry_id,
            cmd_tx: self.cmd_tx.clone(),
        })
    }
}

/// Application back-reference to one tracked subscription.
///
/// The registry owns the subscription: dropping this handle does nothing,
/// and [`unsubscribe`](Self::unsubscribe) is the only way to tear it down
/// from the client side.
#[derive(Clone)]
pub struct Subscription {
    identifier: String,
    entry_id: u64,
    cmd_tx: mpsc::UnboundedSender<Cmd>,
}

impl Subscription {
    /// The canonical JSON identifier this subscription is keyed by.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Invoke a named action on the server-side channel: sets the `action`
    /// key on `data` and sends it. `data` must be a JSON object (`null` is
    /// accepted as shorthand for an empty one).
    pub async fn perform(&self, action: &str, data: JsonValue) -> bool {
        let mut data = match data {
            JsonValue::Object(map) => map,
            JsonValue::Null => Map::new(),
            other => {
                log::warn!(
                    "[cable-link] perform payload must be a JSON object, replacing {}",
                    other
                );
                Map::new()
            }
        };
        data.insert("action".to_string(), JsonValue::String(action.to_string()));
        self.send(JsonValue::Object(data)).await
    }

    /// Send an application payload to the channel. Returns `false` without
    /// raising when the socket is not open: the payload is dropped, and
    /// replaying it is the application's business.
    pub async fn send(&self, data: JsonValue) -> bool {
        let encoded = match serde_json::to_string(&data) {
            Ok(encoded) => encoded,
            Err(e) => {
                log::warn!("[cable-link] Failed to encode payload: {}", e);
                return false;
            }
        };
        let command = ClientCommand::Message {
            identifier: self.identifier.clone(),
            data: encoded,
        };
        let frame = match command.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[cable-link] Failed to encode message command: {}", e);
                return false;
            }
        };
        let (result_tx, result_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Cmd::Transmit { frame, result_tx })
            .is_err()
        {
            return false;
        }
        result_rx.await.unwrap_or(false)
    }

    /// Remove this subscription from the registry. The wire-level
    /// `unsubscribe` goes out only if no duplicate subscription to the same
    /// params remains.
    ///
    /// Synchronous and safe to call from inside a callback.
    pub fn unsubscribe(&self) {
        let _ = self.cmd_tx.send(Cmd::Remove {
            entry_id: self.entry_id,
        });
    }
}
