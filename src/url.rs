//! WebSocket URL normalization.
//!
//! Consumer URLs may arrive as `ws(s)` URLs, as `http(s)` URLs, or as bare
//! mount paths like `/cable`. Everything is rewritten to a `ws(s)` URL
//! before dialing; relative paths are resolved against the configured
//! `origin` (see [`crate::config`]).

use crate::config::get_config;

/// Rewrite a URL to the `ws(s)` scheme.
///
/// - `ws://` / `wss://` URLs pass through untouched (scheme match is
///   case-insensitive).
/// - `http://` becomes `ws://`, `https://` becomes `wss://`.
/// - Anything else is treated as a path and resolved against the `origin`
///   config value when one is set; without an origin it is returned as-is
///   and the dial will fail, which the monitor treats like any other
///   unreachable endpoint.
pub(crate) fn create_websocket_url(url: &str) -> String {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("ws:") || lower.starts_with("wss:") {
        return url.to_string();
    }
    if let Some(rewritten) = strip_http_scheme(url, &lower) {
        return rewritten;
    }
    match get_config("origin") {
        Some(origin) => {
            let base = normalize_origin(origin.trim_end_matches('/'));
            if url.starts_with('/') {
                format!("{}{}", base, url)
            } else {
                format!("{}/{}", base, url)
            }
        }
        None => url.to_string(),
    }
}

/// Coerce an origin to a `ws(s)` base. A schemeless origin is taken as a
/// bare host and gets `ws://`.
fn normalize_origin(origin: &str) -> String {
    let lower = origin.to_ascii_lowercase();
    if lower.starts_with("ws:") || lower.starts_with("wss:") {
        return origin.to_string();
    }
    match strip_http_scheme(origin, &lower) {
        Some(rewritten) => rewritten,
        None => format!("ws://{}", origin),
    }
}

fn strip_http_scheme(url: &str, lower: &str) -> Option<String> {
    if lower.starts_with("https://") {
        Some(format!("wss://{}", &url["https://".len()..]))
    } else if lower.starts_with("http://") {
        Some(format!("ws://{}", &url["http://".len()..]))
    } else {
        None
    }
}
