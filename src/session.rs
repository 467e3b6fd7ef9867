//! Pluggable, token-scoped session storage.
//!
//! The core only depends on the [`Session`] contract: keyed values with a
//! per-key expiry, scoped to a per-client token the implementation resolves
//! through the [`Context`] (here: a cookie). One implementation ships —
//! [`MemoryStore`] — and the server injects whichever store it is given into
//! every context at construction. No global state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::context::Context;

/// Default name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "STRANDSESSION";

/// Token-scoped key/value storage with per-key expiry.
///
/// Implementations receive the [`Context`] so they can resolve (and, on
/// first write, issue) the caller's identifying token — typically through
/// the context's cookie accessors.
///
/// Shared process-wide across all in-flight requests: implementations must
/// make concurrent access to the same token's entries safe, and a `get`
/// must observe any `set` that completed before the read began.
pub trait Session: Send + Sync {
    /// Reads `key` for the caller's scope. Absent or expired keys are `None`.
    fn get(&self, ctx: &Context, key: &str) -> Option<Value>;

    /// Writes `key` for the caller's scope, expiring after `ttl`.
    /// Creates the scope (and the caller's token) on first write.
    fn set(&self, ctx: &Context, key: &str, value: Value, ttl: Duration);

    /// Removes the caller's entire scope.
    fn destroy(&self, ctx: &Context);
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

struct Entry {
    value: Value,
    deadline: Instant,
}

/// In-memory [`Session`] store keyed by a session cookie.
///
/// Scopes are created lazily on first write: a v4 UUID token is issued and
/// staged as a `Path=/; HttpOnly` cookie on the response. Expiry is enforced
/// lazily on read. Process-local — restarts drop all sessions.
pub struct MemoryStore {
    cookie_name: String,
    scopes: Mutex<HashMap<String, HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_cookie_name(SESSION_COOKIE)
    }

    /// A store reading and issuing its token under a custom cookie name.
    pub fn with_cookie_name(name: impl Into<String>) -> Self {
        Self { cookie_name: name.into(), scopes: Mutex::new(HashMap::new()) }
    }

    /// The caller's existing token, if any.
    fn token(&self, ctx: &Context) -> Option<String> {
        ctx.cookie(&self.cookie_name)
    }

    /// The caller's token, issuing and staging a fresh one if absent.
    fn token_or_issue(&self, ctx: &Context) -> String {
        if let Some(token) = self.token(ctx) {
            return token;
        }
        let token = Uuid::new_v4().simple().to_string();
        ctx.set_cookie(&self.cookie_name, &token, None, "/", true);
        debug!(cookie = %self.cookie_name, "issued session token");
        token
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<String, Entry>>> {
        match self.scopes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Session for MemoryStore {
    fn get(&self, ctx: &Context, key: &str) -> Option<Value> {
        let token = self.token(ctx)?;
        let mut scopes = self.lock();
        let scope = scopes.get_mut(&token)?;
        match scope.get(key) {
            Some(entry) if entry.deadline > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                // Lazy expiry: reap on the read that finds it stale.
                scope.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, ctx: &Context, key: &str, value: Value, ttl: Duration) {
        let token = self.token_or_issue(ctx);
        let entry = Entry { value, deadline: Instant::now() + ttl };
        self.lock().entry(token).or_default().insert(key.to_owned(), entry);
    }

    fn destroy(&self, ctx: &Context) {
        if let Some(token) = self.token(ctx) {
            self.lock().remove(&token);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;
    use std::sync::Arc;

    use bytes::Bytes;
    use http::header::{HeaderValue, COOKIE};
    use http::{HeaderMap, Method};
    use serde_json::json;

    use super::*;

    fn ctx_for(store: &Arc<MemoryStore>, cookie: Option<&str>) -> Context {
        let mut headers = HeaderMap::new();
        if let Some(c) = cookie {
            headers.insert(COOKIE, HeaderValue::from_str(c).unwrap());
        }
        Context::new(
            Method::GET,
            "/".parse().unwrap(),
            headers,
            Bytes::new(),
            StdHashMap::new(),
            Arc::clone(store) as Arc<dyn Session>,
        )
    }

    #[test]
    fn set_then_get_within_one_request() {
        let store = Arc::new(MemoryStore::new());
        let c = ctx_for(&store, None);

        c.session_set("user", json!("ada"), Duration::from_secs(60));
        // the issued token is staged on the response, so the read resolves it
        assert_eq!(c.session_get("user"), Some(json!("ada")));
    }

    #[test]
    fn tokens_are_isolated() {
        let store = Arc::new(MemoryStore::new());
        let a = ctx_for(&store, Some("STRANDSESSION=token-a"));
        let b = ctx_for(&store, Some("STRANDSESSION=token-b"));

        a.session_set("k", json!(1), Duration::from_secs(60));
        assert_eq!(a.session_get("k"), Some(json!(1)));
        assert_eq!(b.session_get("k"), None);
    }

    #[test]
    fn completed_set_is_visible_to_later_requests() {
        let store = Arc::new(MemoryStore::new());
        let first = ctx_for(&store, Some("STRANDSESSION=tok"));
        first.session_set("k", json!("v"), Duration::from_secs(60));

        let second = ctx_for(&store, Some("STRANDSESSION=tok"));
        assert_eq!(second.session_get("k"), Some(json!("v")));
    }

    #[test]
    fn entries_expire_independently() {
        let store = Arc::new(MemoryStore::new());
        let c = ctx_for(&store, Some("STRANDSESSION=tok"));

        c.session_set("gone", json!(1), Duration::from_secs(0));
        c.session_set("kept", json!(2), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(c.session_get("gone"), None);
        assert_eq!(c.session_get("kept"), Some(json!(2)));
    }

    #[test]
    fn destroy_drops_the_whole_scope() {
        let store = Arc::new(MemoryStore::new());
        let c = ctx_for(&store, Some("STRANDSESSION=tok"));

        c.session_set("a", json!(1), Duration::from_secs(60));
        c.session_set("b", json!(2), Duration::from_secs(60));
        c.session_destroy();

        assert_eq!(c.session_get("a"), None);
        assert_eq!(c.session_get("b"), None);
    }

    #[test]
    fn reads_without_a_token_do_not_create_scopes() {
        let store = Arc::new(MemoryStore::new());
        let c = ctx_for(&store, None);
        assert_eq!(c.session_get("k"), None);
        assert!(store.lock().is_empty());
    }

    #[test]
    fn custom_cookie_name() {
        let store = Arc::new(MemoryStore::with_cookie_name("sid"));
        let c = ctx_for(&store, Some("sid=tok"));
        c.session_set("k", json!(true), Duration::from_secs(60));
        assert_eq!(c.session_get("k"), Some(json!(true)));
    }
}
