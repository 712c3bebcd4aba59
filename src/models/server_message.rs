use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// A frame received from the server.
///
/// Control frames carry a `type`; a frame without one (or with a type this
/// client does not recognize) is an application payload addressed to
/// `identifier`, carrying `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Control frame type, absent for application payloads.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageType>,

    /// The subscription identifier this frame is addressed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Application payload (or the server clock on `ping` frames).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<JsonValue>,

    /// Human-readable reason on `disconnect` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Whether the server wants the client to reconnect after a `disconnect`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<bool>,
}

/// Recognized control frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// First post-handshake frame; the session is live.
    Welcome,
    /// The server is closing the session, optionally inviting a reconnect.
    Disconnect,
    /// Periodic liveness beacon.
    Ping,
    /// The subscription named by `identifier` was accepted.
    ConfirmSubscription,
    /// The subscription named by `identifier` was refused.
    RejectSubscription,
    /// A `type` value this client does not know; dispatched like an
    /// application payload.
    Unknown,
}

// Unrecognized type strings must not fail the whole frame, so the mapping
// to `Unknown` is spelled out instead of derived.
impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "welcome" => Self::Welcome,
            "disconnect" => Self::Disconnect,
            "ping" => Self::Ping,
            "confirm_subscription" => Self::ConfirmSubscription,
            "reject_subscription" => Self::RejectSubscription,
            _ => Self::Unknown,
        })
    }
}
