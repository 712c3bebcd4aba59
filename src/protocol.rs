//! Wire protocol constants for the Action Cable v1 JSON grammar.

/// The message grammar this client speaks.
pub const SUPPORTED_PROTOCOL: &str = "actioncable-v1-json";

/// Sentinel subprotocol a server negotiates when it supports none of the
/// grammars the client offered.
pub const UNSUPPORTED_PROTOCOL: &str = "actioncable-unsupported";

/// Subprotocols announced during the WebSocket handshake, preferred first.
/// The sentinel is always last.
pub const PROTOCOLS: [&str; 2] = [SUPPORTED_PROTOCOL, UNSUPPORTED_PROTOCOL];

/// Mount path used when neither an explicit URL nor a `url` config entry is
/// present.
pub const DEFAULT_MOUNT_PATH: &str = "/cable";

/// Informational reasons carried by server `disconnect` frames.
pub mod disconnect_reasons {
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const SERVER_RESTART: &str = "server_restart";
}

/// Whether a negotiated subprotocol is one the client can speak: any entry
/// of [`PROTOCOLS`] except the trailing sentinel.
pub(crate) fn is_protocol_supported(protocol: Option<&str>) -> bool {
    match protocol {
        Some(p) => PROTOCOLS[..PROTOCOLS.len() - 1].contains(&p),
        None => false,
    }
}
