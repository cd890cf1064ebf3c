//! Durable storage for the session key.
//!
//! The browser client keeps the `akey` in a cookie so a page reload can
//! resume the session. [`SessionStore`] abstracts that concern: the client
//! only ever calls `load` at startup, `save` after a successful registration
//! and `clear` on quit. Storage failures are not interesting to the client,
//! so the API is infallible; implementations should swallow and log their own
//! errors.

use std::sync::Mutex;

/// Durable storage of the session key across client restarts.
pub trait SessionStore: Send + Sync + 'static {
    /// Previously saved session key, if any.
    fn load(&self) -> Option<String>;

    /// Persist the session key.
    fn save(&self, akey: &str);

    /// Forget the stored session key.
    fn clear(&self);
}

/// In-memory [`SessionStore`], for tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    akey: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded with a session key, as if a previous run had saved one.
    pub fn with_key(akey: impl Into<String>) -> Self {
        Self {
            akey: Mutex::new(Some(akey.into())),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<String> {
        match self.akey.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn save(&self, akey: &str) {
        match self.akey.lock() {
            Ok(mut guard) => *guard = Some(akey.to_string()),
            Err(poisoned) => *poisoned.into_inner() = Some(akey.to_string()),
        }
    }

    fn clear(&self) {
        match self.akey.lock() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear_cycle() {
        let store = MemorySessionStore::new();
        assert_eq!(store.load(), None);

        store.save("abc123");
        assert_eq!(store.load().as_deref(), Some("abc123"));

        store.clear();
        assert_eq!(store.load(), None);
        // Clearing twice is fine.
        store.clear();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn preseeded_store() {
        let store = MemorySessionStore::with_key("resume-me");
        assert_eq!(store.load().as_deref(), Some("resume-me"));
    }
}
