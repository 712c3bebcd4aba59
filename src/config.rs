//! Process-wide named configuration for the consumer factory.
//!
//! The browser client reads its settings from `action-cable-*` document meta
//! tags. This module is the host-side equivalent: a small named registry the
//! embedding application populates before calling
//! [`create_consumer`](crate::create_consumer). Recognized names:
//!
//! - `url`: the cable endpoint used when no explicit URL is given
//! - `origin`: the base origin used to resolve relative mount paths

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

fn store() -> &'static RwLock<HashMap<String, String>> {
    static STORE: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();
    STORE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Look up a named configuration value.
pub fn get_config(name: &str) -> Option<String> {
    store().read().ok()?.get(name).cloned()
}

/// Set a named configuration value, replacing any previous one.
pub fn set_config(name: impl Into<String>, value: impl Into<String>) {
    if let Ok(mut map) = store().write() {
        map.insert(name.into(), value.into());
    }
}

/// Remove a named configuration value.
pub fn remove_config(name: &str) {
    if let Ok(mut map) = store().write() {
        map.remove(name);
    }
}
