//! Route registry: pattern → handler-chain bindings.
//!
//! The registry is the build-time side of dispatch. Patterns follow the
//! multiplexer's ([`matchit`]) rules — literal segments, `{name}`
//! parameters, `{*rest}` trailing catch-alls. Registration is plain map
//! insertion; [`Server::serve`](crate::Server::serve) freezes the map into
//! the radix tree once, so the hot path never touches this type.
//!
//! Registering the same pattern slot twice is a configuration error and
//! panics at registration time, matching the tree's own duplicate policy.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use http::{Method, StatusCode};

use crate::chain;
use crate::context::Context;
use crate::group::Group;
use crate::handler::Chain;

/// Maps URL patterns to ordered handler chains.
///
/// A pattern owns one method-agnostic chain ([`handle`](Registry::handle))
/// and/or one chain per HTTP method ([`handle_method`](Registry::handle_method),
/// usually via [`Group`]). At dispatch time the method-specific chain wins;
/// a request matching the pattern but no chain gets `405`.
pub struct Registry {
    routes: HashMap<String, RouteEntry>,
}

#[derive(Default)]
pub(crate) struct RouteEntry {
    pub(crate) all: Option<Chain>,
    pub(crate) by_method: HashMap<Method, Chain>,
}

impl Registry {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Registers a chain for every HTTP method at `pattern`.
    ///
    /// ```rust,no_run
    /// # use strand::{chain, Context, Registry};
    /// # async fn log(_: Context) {}
    /// # async fn page(_: Context) {}
    /// let mut app = Registry::new();
    /// app.handle("/", chain![log, page]);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `pattern` already has a method-agnostic chain.
    pub fn handle(&mut self, pattern: &str, handlers: Chain) {
        let entry = self.routes.entry(pattern.to_owned()).or_default();
        if entry.all.is_some() {
            panic!("duplicate route `{pattern}`");
        }
        entry.all = Some(handlers);
    }

    /// Registers a chain that only runs when the request method matches.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` already has a chain for `method`.
    pub fn handle_method(&mut self, method: Method, pattern: &str, handlers: Chain) {
        let entry = self.routes.entry(pattern.to_owned()).or_default();
        if entry.by_method.insert(method.clone(), handlers).is_some() {
            panic!("duplicate route `{method} {pattern}`");
        }
    }

    /// A namespaced view over this registry: every sub-route is prefixed
    /// with `prefix` and runs `shared` before its own chain.
    pub fn group(&mut self, prefix: &str, shared: Chain) -> Group<'_> {
        Group::new(self, prefix, shared)
    }

    /// Serves the built-in icon at `/favicon.ico` (`image/x-icon`).
    pub fn favicon(&mut self) {
        self.handle(
            "/favicon.ico",
            chain![|c: Context| async move {
                c.set_header("content-type", "image/x-icon");
                c.write(FAVICON);
            }],
        );
    }

    /// Serves files under `dir` at `prefix/{*path}`.
    ///
    /// Traversal outside `dir` and unreadable files answer `404`. Content
    /// type is derived from the file extension, falling back to
    /// `application/octet-stream`.
    pub fn static_dir(&mut self, prefix: &str, dir: impl Into<PathBuf>) {
        let root = dir.into();
        let pattern = format!("{}/{{*path}}", prefix.trim_end_matches('/'));
        self.handle(
            &pattern,
            chain![move |c: Context| {
                let root = root.clone();
                async move { serve_file(c, root).await }
            }],
        );
    }

    /// Streams a certificate bundle (e.g. a `.pfx` for browser install) at
    /// `pattern` with `application/x-x509-ca-cert`; `404` if unreadable.
    pub fn handle_pfx(&mut self, pattern: &str, file: impl Into<PathBuf>) {
        let file = file.into();
        self.handle(
            pattern,
            chain![move |c: Context| {
                let file = file.clone();
                async move {
                    match tokio::fs::read(&file).await {
                        Ok(bytes) => {
                            c.set_header("content-type", "application/x-x509-ca-cert");
                            c.write(bytes);
                        }
                        Err(_) => not_found(&c),
                    }
                }
            }],
        );
    }

    pub(crate) fn into_routes(self) -> HashMap<String, RouteEntry> {
        self.routes
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ── File serving ──────────────────────────────────────────────────────────────

fn not_found(c: &Context) {
    c.set_status(StatusCode::NOT_FOUND);
    c.write("404 page not found\n");
}

async fn serve_file(c: Context, root: PathBuf) {
    let rel = c.param("path").unwrap_or("").to_owned();
    let Some(rel) = clean_relative(&rel) else {
        not_found(&c);
        return;
    };
    let full = root.join(rel);
    match tokio::fs::read(&full).await {
        Ok(bytes) => {
            c.set_header("content-type", content_type_for(&full));
            c.write(bytes);
        }
        Err(_) => not_found(&c),
    }
}

/// Normalizes a request-supplied relative path, refusing anything that
/// could step outside the served directory.
fn clean_relative(rel: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for comp in Path::new(rel).components() {
        match comp {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("css") => "text/css",
        Some("gif") => "image/gif",
        Some("htm" | "html") => "text/html; charset=utf-8",
        Some("ico") => "image/x-icon",
        Some("jpeg" | "jpg") => "image/jpeg",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// 16×16 monochrome ICO served by [`Registry::favicon`].
const FAVICON: [u8; 198] = [
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x10, 0x10, 0x02, 0x00, 0x01, 0x00, 0x01, 0x00, 0xb0, 0x00,
    0x00, 0x00, 0x16, 0x00, 0x00, 0x00, 0x28, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x20, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x12, 0x0b,
    0x00, 0x00, 0x12, 0x0b, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x5d, 0x5d,
    0x5d, 0x00, 0xff, 0xff, 0xff, 0x00, 0xff, 0xfb, 0x00, 0x00, 0xff, 0xfb, 0x00, 0x00, 0xff, 0xfb,
    0x00, 0x00, 0xff, 0xfb, 0x00, 0x00, 0xff, 0xe0, 0x00, 0x00, 0xf8, 0x3f, 0x00, 0x00, 0xff, 0xbf,
    0x00, 0x00, 0xf8, 0x3f, 0x00, 0x00, 0xfb, 0xff, 0x00, 0x00, 0xf8, 0x3f, 0x00, 0x00, 0x6f, 0xff,
    0x00, 0x00, 0x6f, 0xff, 0x00, 0x00, 0x6f, 0xff, 0x00, 0x00, 0x0f, 0xff, 0x00, 0x00, 0x6f, 0xff,
    0x00, 0x00, 0x6f, 0xff, 0x00, 0x00, 0xff, 0xfb, 0x00, 0x00, 0xff, 0xfb, 0x00, 0x00, 0xff, 0xfb,
    0x00, 0x00, 0xff, 0xfb, 0x00, 0x00, 0xff, 0xe0, 0x00, 0x00, 0xf8, 0x3f, 0x00, 0x00, 0xff, 0xbf,
    0x00, 0x00, 0xf8, 0x3f, 0x00, 0x00, 0xfb, 0xff, 0x00, 0x00, 0xf8, 0x3f, 0x00, 0x00, 0x6f, 0xff,
    0x00, 0x00, 0x6f, 0xff, 0x00, 0x00, 0x6f, 0xff, 0x00, 0x00, 0x0f, 0xff, 0x00, 0x00, 0x6f, 0xff,
    0x00, 0x00, 0x6f, 0xff, 0x00, 0x00,
];
