//! Per-request context: response encoding, cookies, and session access.
//!
//! One [`Context`] is allocated per matched request and handed to every
//! handler in the route's chain. It is a cheap clone-able handle over shared
//! per-request state: the parsed request, a buffered response, the injected
//! session store, and the monotonic early-exit flag that stops the chain.
//!
//! Handlers never build a response value — they write *into* the context
//! (`json`, `html`, `render_*`, `write`) and the server flushes the buffer
//! once the chain ends.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::header::{HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE, COOKIE, SET_COOKIE};
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::Error;
use crate::session::Session;

/// JSON bodies above this many serialized bytes are gzip-compressed.
const GZIP_THRESHOLD: usize = 1024;

fn html_utf8() -> HeaderValue {
    HeaderValue::from_static("text/html; charset=utf-8")
}

// ── Request / response state ──────────────────────────────────────────────────

pub(crate) struct RequestParts {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

/// The buffered outbound response. Flushed by the server after the chain.
pub(crate) struct ResponseParts {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Vec<u8>,
}

impl Default for ResponseParts {
    fn default() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: Vec::new() }
    }
}

struct ContextInner {
    request: RequestParts,
    response: Mutex<ResponseParts>,
    session: Arc<dyn Session>,
    closed: AtomicBool,
}

// ── Context ───────────────────────────────────────────────────────────────────

/// The per-request carrier of request data, the response buffer, the session
/// reference, and the chain's early-exit state.
///
/// Cloning is cheap (one `Arc`); all clones observe the same state. Exactly
/// one context exists per in-flight request and it is discarded after the
/// chain completes.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        params: HashMap<String, String>,
        session: Arc<dyn Session>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                request: RequestParts { method, uri, headers, body, params },
                response: Mutex::new(ResponseParts::default()),
                session,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// A poisoned lock only means a handler panicked mid-write; the buffer
    /// itself is still usable, so recover it instead of propagating the panic.
    fn response(&self) -> MutexGuard<'_, ResponseParts> {
        match self.inner.response.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Takes the buffered response out of the context for flushing.
    pub(crate) fn finish(&self) -> ResponseParts {
        std::mem::take(&mut *self.response())
    }

    // ── Early exit ───────────────────────────────────────────────────────────

    /// Marks the chain as finished: no later handler in this route's chain
    /// runs for this request. Idempotent; the flag is never reset.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    /// Whether [`close`](Context::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    // ── Request accessors ────────────────────────────────────────────────────

    pub fn method(&self) -> &Method {
        &self.inner.request.method
    }

    pub fn path(&self) -> &str {
        self.inner.request.uri.path()
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.request.body
    }

    /// First value of a request header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.request.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named route parameter.
    ///
    /// For a route `/users/{id}`, `c.param("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.inner.request.params.get(key).map(String::as_str)
    }

    /// Looks up a form value by name: query string first, then an
    /// urlencoded request body.
    pub fn form_value(&self, name: &str) -> Option<String> {
        let query = self.inner.request.uri.query().unwrap_or("");
        if let Some((_, v)) =
            url::form_urlencoded::parse(query.as_bytes()).find(|(k, _)| k.as_ref() == name)
        {
            return Some(v.into_owned());
        }
        let urlencoded = self
            .header("content-type")
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if urlencoded {
            return url::form_urlencoded::parse(&self.inner.request.body)
                .find(|(k, _)| k.as_ref() == name)
                .map(|(_, v)| v.into_owned());
        }
        None
    }

    // ── Response plumbing ────────────────────────────────────────────────────

    pub fn set_status(&self, status: StatusCode) {
        self.response().status = status;
    }

    pub fn set_header(&self, name: &str, value: &str) {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(n), Ok(v)) => {
                self.response().headers.insert(n, v);
            }
            _ => warn!(name, "dropping invalid response header"),
        }
    }

    /// Appends raw bytes to the response body.
    pub fn write(&self, bytes: impl AsRef<[u8]>) {
        self.response().body.extend_from_slice(bytes.as_ref());
    }

    // ── Cookies ──────────────────────────────────────────────────────────────

    /// Returns a cookie value by name.
    ///
    /// Cookies staged on the response earlier in this request are checked
    /// first, so a freshly issued session token is visible to later reads
    /// within the same chain.
    pub fn cookie(&self, name: &str) -> Option<String> {
        {
            let resp = self.response();
            for v in resp.headers.get_all(SET_COOKIE) {
                if let Some(val) = v.to_str().ok().and_then(|s| cookie_value(s, name)) {
                    return Some(val);
                }
            }
        }
        for v in self.inner.request.headers.get_all(COOKIE) {
            if let Some(val) = v.to_str().ok().and_then(|s| cookie_value(s, name)) {
                return Some(val);
            }
        }
        None
    }

    /// Stages a `Set-Cookie` header on the response.
    pub fn set_cookie(
        &self,
        name: &str,
        value: &str,
        max_age: Option<Duration>,
        path: &str,
        http_only: bool,
    ) {
        let mut s = format!("{name}={value}");
        if !path.is_empty() {
            s.push_str("; Path=");
            s.push_str(path);
        }
        if let Some(age) = max_age {
            s.push_str(&format!("; Max-Age={}", age.as_secs()));
        }
        if http_only {
            s.push_str("; HttpOnly");
        }
        match HeaderValue::from_str(&s) {
            Ok(v) => {
                self.response().headers.append(SET_COOKIE, v);
            }
            Err(_) => warn!(name, "dropping invalid cookie"),
        }
    }

    // ── JSON / JSONP ─────────────────────────────────────────────────────────

    /// Serializes `data` as the JSON response body and closes the chain.
    ///
    /// - A non-empty `callback` form/query parameter turns the body into
    ///   JSONP: `callback(<json>)`.
    /// - Serialized JSON larger than 1024 bytes is written through a
    ///   best-compression gzip stream with `content-encoding: gzip`.
    /// - On serialization failure nothing is written and the error is
    ///   returned — but the chain is still closed: `json` is always the
    ///   terminal handler of its route.
    pub fn json<T: Serialize + ?Sized>(&self, data: &T) -> Result<(), Error> {
        self.close();
        let bs = serde_json::to_vec(data)?;
        let oversized = bs.len() > GZIP_THRESHOLD;

        let payload = match self.form_value("callback") {
            Some(cb) if !cb.is_empty() => {
                let mut p = Vec::with_capacity(cb.len() + bs.len() + 2);
                p.extend_from_slice(cb.as_bytes());
                p.push(b'(');
                p.extend_from_slice(&bs);
                p.push(b')');
                p
            }
            _ => bs,
        };

        let mut resp = self.response();
        resp.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if oversized {
            resp.headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            let mut enc = GzEncoder::new(Vec::new(), Compression::best());
            enc.write_all(&payload)?;
            let gz = enc.finish()?;
            resp.body.extend_from_slice(&gz);
        } else {
            resp.body.extend_from_slice(&payload);
        }
        Ok(())
    }

    /// Writes the `{"no": no, "data": data}` envelope via [`json`](Context::json).
    pub fn json2<T: Serialize>(&self, no: i64, data: &T) -> Result<(), Error> {
        #[derive(Serialize)]
        struct Envelope<'a, T> {
            no: i64,
            data: &'a T,
        }
        self.json(&Envelope { no, data })
    }

    // ── HTML / templates ─────────────────────────────────────────────────────

    /// Writes `body` verbatim as `text/html; charset=utf-8`.
    ///
    /// Does not close the chain — later handlers may still run.
    pub fn html(&self, body: impl AsRef<str>) {
        let mut resp = self.response();
        resp.headers.insert(CONTENT_TYPE, html_utf8());
        resp.body.extend_from_slice(body.as_ref().as_bytes());
    }

    /// Loads and renders template files under a custom delimiter pair.
    ///
    /// All files are parsed into one template set named by base name; the
    /// *last* file's template is executed against `data`. Load, parse, and
    /// render failures degrade to the error's text in the response body —
    /// no status change, no propagation.
    pub async fn render_files<T: Serialize>(
        &self,
        delim_left: &str,
        delim_right: &str,
        data: &T,
        files: &[&str],
    ) {
        {
            self.response().headers.insert(CONTENT_TYPE, html_utf8());
        }
        let mut sources = Vec::with_capacity(files.len());
        for file in files {
            match tokio::fs::read_to_string(file).await {
                Ok(src) => sources.push((base_name(file), src)),
                Err(e) => {
                    self.write(e.to_string());
                    return;
                }
            }
        }
        let entry = sources.last().map(|(name, _)| name.clone()).unwrap_or_default();
        match render(delim_left, delim_right, data, sources, &entry) {
            Ok(out) => self.write(out),
            Err(e) => self.write(e.to_string()),
        }
    }

    /// Renders inline template fragments under a custom delimiter pair.
    ///
    /// Fragments become templates named `"0"`, `"1"`, …; the last one is
    /// executed against `data`. Same inline-error policy as
    /// [`render_files`](Context::render_files).
    pub fn render_content<T: Serialize>(
        &self,
        delim_left: &str,
        delim_right: &str,
        data: &T,
        fragments: &[&str],
    ) {
        {
            self.response().headers.insert(CONTENT_TYPE, html_utf8());
        }
        let sources: Vec<(String, String)> = fragments
            .iter()
            .enumerate()
            .map(|(i, src)| (i.to_string(), (*src).to_owned()))
            .collect();
        let entry = sources.last().map(|(name, _)| name.clone()).unwrap_or_default();
        match render(delim_left, delim_right, data, sources, &entry) {
            Ok(out) => self.write(out),
            Err(e) => self.write(e.to_string()),
        }
    }

    // ── Session ──────────────────────────────────────────────────────────────

    /// Stores `value` under `key` in the caller's session scope.
    pub fn session_set(&self, key: &str, value: Value, expire: Duration) {
        self.inner.session.set(self, key, value, expire);
    }

    /// Reads a session value for the caller's scope. Absent or expired keys
    /// return `None`.
    pub fn session_get(&self, key: &str) -> Option<Value> {
        self.inner.session.get(self, key)
    }

    /// Drops the caller's entire session scope.
    pub fn session_destroy(&self) {
        self.inner.session.destroy(self);
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Builds a template set under the given delimiters and renders `entry`.
fn render<T: Serialize>(
    delim_left: &str,
    delim_right: &str,
    data: &T,
    sources: Vec<(String, String)>,
    entry: &str,
) -> Result<String, minijinja::Error> {
    let mut env = minijinja::Environment::new();
    let syntax = minijinja::syntax::SyntaxConfig::builder()
        .variable_delimiters(delim_left.to_owned(), delim_right.to_owned())
        .build()?;
    env.set_syntax(syntax);
    for (name, source) in sources {
        env.add_template_owned(name, source)?;
    }
    env.get_template(entry)?.render(data)
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_owned())
}

/// Picks `name`'s value out of a `Cookie`/`Set-Cookie` style header value.
pub(crate) fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_owned())
}
