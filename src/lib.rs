//! # strand
//!
//! A handler-chain HTTP dispatch layer. Nothing more. Nothing less.
//!
//! ## The contract
//!
//! strand wraps an HTTP listener with the part that actually changes
//! between applications:
//!
//! - **Ordered, early-terminating chains per route** — each route owns a
//!   sequence of handlers run in registration order; any handler can call
//!   [`Context::close`] and stop the rest of its chain.
//! - **Route grouping** — prefix namespacing with per-HTTP-method
//!   sub-registration and an optional shared chain (auth gates, logging).
//! - **A per-request [`Context`]** — one object carrying the request, the
//!   buffered response, and the response-encoding contract: JSON with
//!   automatic JSONP wrapping and size-gated gzip, HTML, and
//!   delimiter-configurable template rendering.
//! - **Pluggable sessions** — a token-scoped key/value contract addressed
//!   through the context; bring your own store or use the in-memory one.
//!
//! Transport stays where it belongs: tokio + hyper accept and parse,
//! [`matchit`] matches, strand sequences handlers and encodes responses.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use strand::{chain, Context, Registry, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = Registry::new();
//!     app.favicon();
//!     app.handle("/hello", chain![hello]);
//!
//!     let mut api = app.group("/api", chain![audit]);
//!     api.get("/users/{id}", chain![get_user]);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn audit(c: Context) {
//!     tracing::info!(path = c.path(), "request");
//! }
//!
//! async fn hello(c: Context) {
//!     c.html("<h1>hello</h1>");
//! }
//!
//! async fn get_user(c: Context) {
//!     let id = c.param("id").unwrap_or("unknown").to_owned();
//!     let _ = c.json(&serde_json::json!({ "id": id }));
//! }
//! ```

mod context;
mod error;
mod group;
mod handler;
mod registry;
mod server;
mod session;

pub mod certgen;
pub mod client;
pub mod health;

pub use context::Context;
pub use error::Error;
pub use group::Group;
pub use handler::{Chain, Handler};
pub use registry::Registry;
pub use server::{Server, Shutdown};
pub use session::{MemoryStore, Session, SESSION_COOKIE};

// Re-exported so registrations and status handling need no direct `http`
// dependency downstream.
pub use http::{Method, StatusCode};
