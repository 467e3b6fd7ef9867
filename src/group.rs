//! Route grouping: pattern prefixes and per-method registration.

use http::Method;

use crate::handler::Chain;
use crate::registry::Registry;

/// A namespaced view over a [`Registry`].
///
/// Every sub-route registered through a group gets its pattern prefixed and
/// runs the group's shared chain before its own handlers — under the normal
/// early-exit rule, so a shared handler that closes the context (an auth
/// gate, say) stops the route-specific handlers from running at all.
///
/// ```rust,no_run
/// # use strand::{chain, Context, Registry};
/// # async fn auth(_: Context) {}
/// # async fn list(_: Context) {}
/// # async fn create(_: Context) {}
/// let mut app = Registry::new();
/// let mut api = app.group("/api", chain![auth]);
/// api.get("/users", chain![list]);
/// api.post("/users", chain![create]);
/// ```
pub struct Group<'a> {
    registry: &'a mut Registry,
    prefix: String,
    shared: Chain,
}

impl<'a> Group<'a> {
    pub(crate) fn new(registry: &'a mut Registry, prefix: &str, shared: Chain) -> Self {
        let mut prefix = prefix.trim_end_matches('/').to_owned();
        if !prefix.starts_with('/') {
            prefix.insert(0, '/');
        }
        Self { registry, prefix, shared }
    }

    /// Registers a method-agnostic chain at the prefixed pattern.
    pub fn handle(&mut self, pattern: &str, handlers: Chain) {
        let pattern = self.prefixed(pattern);
        let chain = self.composed(handlers);
        self.registry.handle(&pattern, chain);
    }

    /// Registers a chain bound to one HTTP method at the prefixed pattern.
    pub fn on(&mut self, method: Method, pattern: &str, handlers: Chain) {
        let pattern = self.prefixed(pattern);
        let chain = self.composed(handlers);
        self.registry.handle_method(method, &pattern, chain);
    }

    pub fn get(&mut self, pattern: &str, handlers: Chain) {
        self.on(Method::GET, pattern, handlers);
    }

    pub fn post(&mut self, pattern: &str, handlers: Chain) {
        self.on(Method::POST, pattern, handlers);
    }

    pub fn put(&mut self, pattern: &str, handlers: Chain) {
        self.on(Method::PUT, pattern, handlers);
    }

    pub fn delete(&mut self, pattern: &str, handlers: Chain) {
        self.on(Method::DELETE, pattern, handlers);
    }

    pub fn patch(&mut self, pattern: &str, handlers: Chain) {
        self.on(Method::PATCH, pattern, handlers);
    }

    pub fn head(&mut self, pattern: &str, handlers: Chain) {
        self.on(Method::HEAD, pattern, handlers);
    }

    pub fn options(&mut self, pattern: &str, handlers: Chain) {
        self.on(Method::OPTIONS, pattern, handlers);
    }

    fn prefixed(&self, pattern: &str) -> String {
        format!("{}/{}", self.prefix, pattern.trim_start_matches('/'))
    }

    /// Shared chain first, then the route's own handlers. Handlers are
    /// `Arc`s, so sharing across sub-routes is a refcount bump.
    fn composed(&self, handlers: Chain) -> Chain {
        self.shared.iter().cloned().chain(handlers).collect()
    }
}
