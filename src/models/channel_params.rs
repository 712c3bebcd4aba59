use serde_json::{json, Value as JsonValue};

use crate::error::Result;

/// What a subscription is created against: a bare channel name or a full
/// params object.
///
/// A bare name is shorthand for `{"channel": name}`. The canonical JSON
/// encoding of the params is the subscription's wire identifier; because
/// `serde_json` keeps object keys sorted, params that differ only in key
/// order canonicalize to the same identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelParams {
    /// A channel class name, e.g. `"ChatChannel"`.
    Name(String),
    /// A params object, e.g. `{"channel": "ChatChannel", "room": 5}`.
    Params(JsonValue),
}

impl ChannelParams {
    /// Canonical JSON identifier for these params.
    pub fn identifier(&self) -> Result<String> {
        let params = match self {
            Self::Name(name) => json!({ "channel": name }),
            Self::Params(value) => value.clone(),
        };
        serde_json::to_string(&params).map_err(Into::into)
    }
}

impl From<&str> for ChannelParams {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ChannelParams {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<JsonValue> for ChannelParams {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::String(name) => Self::Name(name),
            other => Self::Params(other),
        }
    }
}
