use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Commands sent from client to server, tagged by the `command` field.
///
/// The `data` payload of a `message` command is a JSON-encoded string, so it
/// is encoded twice on the wire. The server hands it to the channel verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Register interest in the channel named by `identifier`.
    Subscribe { identifier: String },

    /// Drop the registration for `identifier`.
    Unsubscribe { identifier: String },

    /// Deliver an application payload to the channel behind `identifier`.
    Message { identifier: String, data: String },
}

impl ClientCommand {
    /// Encode the command as a wire frame.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }

    /// The identifier this command targets.
    pub fn identifier(&self) -> &str {
        match self {
            Self::Subscribe { identifier }
            | Self::Unsubscribe { identifier }
            | Self::Message { identifier, .. } => identifier,
        }
    }
}
