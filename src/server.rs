//! HTTP server: accept loop, request dispatch, graceful shutdown.
//!
//! # Shutdown
//!
//! Two triggers, one path:
//!
//! 1. A signal — SIGTERM (Kubernetes, `kill`) or Ctrl-C — with a 30 s
//!    default grace window.
//! 2. [`Shutdown::shutdown`] with an explicit wait.
//!
//! Either way the listener stops accepting immediately, in-flight requests
//! get up to the grace window to finish, and whatever is still running when
//! the window closes is aborted.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::context::Context;
use crate::error::Error;
use crate::registry::{Registry, RouteEntry};
use crate::session::{MemoryStore, Session};

/// Grace window used when shutdown comes from a signal rather than an
/// explicit [`Shutdown::shutdown`] call.
const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// The HTTP server: owns the listening address and the injected session
/// store, and drives chain execution per request.
pub struct Server {
    addr: SocketAddr,
    session: Arc<dyn Session>,
    shutdown_tx: watch::Sender<Option<Duration>>,
    shutdown_rx: watch::Receiver<Option<Duration>>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called. Sessions default to an in-process [`MemoryStore`].
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        Self { addr, session: Arc::new(MemoryStore::new()), shutdown_tx, shutdown_rx }
    }

    /// Replaces the session store handed to every request context.
    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = session;
        self
    }

    /// A cloneable handle that can stop this server from anywhere.
    pub fn shutdown_handle(&self) -> Shutdown {
        Shutdown { tx: self.shutdown_tx.clone() }
    }

    /// Starts accepting connections and dispatching them through the
    /// registry's chains.
    ///
    /// Freezes the registry into the radix tree first — invalid patterns
    /// panic here, at startup, not per request. Returns only after a full
    /// graceful shutdown.
    pub async fn serve(self, registry: Registry) -> Result<(), Error> {
        let Server { addr, session, shutdown_tx, shutdown_rx: mut shutdown_requested } = self;
        // Keep the sender alive for the whole serve, otherwise handles
        // created earlier would observe a closed channel.
        let _shutdown_tx = shutdown_tx;

        let listener = TcpListener::bind(addr).await?;
        let routes = Arc::new(freeze(registry));

        info!(addr = %addr, "strand listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        // Pin the signal future so we can poll it in a loop.
        let signal = shutdown_signal();
        tokio::pin!(signal);

        let grace;
        loop {
            tokio::select! {
                // `biased` makes select! check arms top-to-bottom instead of
                // randomly. Shutdown is checked first so a trigger stops the
                // accepting even if more connections are queued.
                biased;

                () = &mut signal => {
                    grace = DEFAULT_GRACE;
                    break;
                }

                changed = shutdown_requested.changed() => {
                    grace = match changed {
                        Ok(()) => (*shutdown_requested.borrow_and_update()).unwrap_or(DEFAULT_GRACE),
                        Err(_) => DEFAULT_GRACE,
                    };
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let routes = Arc::clone(&routes);
                    let session = Arc::clone(&session);
                    // TokioIo adapts tokio's AsyncRead/AsyncWrite to the hyper
                    // IO traits.
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // `service_fn` turns a plain async function into a
                        // hyper `Service`. The closure is called once per
                        // request on the connection, not once per connection.
                        let svc = service_fn(move |req| {
                            let routes = Arc::clone(&routes);
                            let session = Arc::clone(&session);
                            async move { dispatch(routes, session, req).await }
                        });

                        // `auto::Builder` transparently handles both HTTP/1.1
                        // and HTTP/2 — whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        info!(in_flight = tasks.len(), grace_secs = grace.as_secs(), "shutting down, draining connections");

        // Drain within the grace window; abort whatever outlives it.
        let drained =
            tokio::time::timeout(grace, async { while tasks.join_next().await.is_some() {} }).await;
        if drained.is_err() {
            error!(stragglers = tasks.len(), "grace window elapsed, aborting in-flight requests");
            tasks.shutdown().await;
        }

        info!("strand stopped");
        Ok(())
    }
}

/// Cloneable shutdown trigger for a [`Server`].
#[derive(Clone)]
pub struct Shutdown {
    tx: watch::Sender<Option<Duration>>,
}

impl Shutdown {
    /// Stops accepting new connections and grants in-flight requests up to
    /// `wait` to complete; stragglers are forcibly terminated.
    pub fn shutdown(&self, wait: Duration) {
        let _ = self.tx.send(Some(wait));
    }
}

// ── Route freeze ──────────────────────────────────────────────────────────────

/// Builds the radix tree from the registry, once, at startup.
fn freeze(registry: Registry) -> matchit::Router<RouteEntry> {
    let mut tree = matchit::Router::new();
    for (pattern, entry) in registry.into_routes() {
        tree.insert(pattern.clone(), entry)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
    }
    tree
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Core hot path: allocates one [`Context`] and runs the matched chain.
///
/// The error type is [`Infallible`] — all failures are expressed as HTTP
/// responses (400, 404, 405) so hyper never sees an error. The early-exit
/// flag is checked only at handler boundaries: a handler always runs to
/// completion before the chain stops.
async fn dispatch(
    routes: Arc<matchit::Router<RouteEntry>>,
    session: Arc<dyn Session>,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("failed to read request body: {e}");
            return Ok(empty_status(StatusCode::BAD_REQUEST));
        }
    };

    let path = parts.uri.path().to_owned();
    let matched = match routes.at(&path) {
        Ok(m) => m,
        Err(_) => return Ok(empty_status(StatusCode::NOT_FOUND)),
    };
    let params: HashMap<String, String> = matched
        .params
        .iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

    // Method-specific chain wins; the method-agnostic chain is the fallback.
    let chain = match matched.value.by_method.get(&parts.method).or(matched.value.all.as_ref()) {
        Some(chain) => chain,
        None => return Ok(empty_status(StatusCode::METHOD_NOT_ALLOWED)),
    };

    let ctx = Context::new(parts.method, parts.uri, parts.headers, body, params, session);
    for handler in chain {
        handler.call(ctx.clone()).await;
        if ctx.is_closed() {
            break;
        }
    }

    let resp = ctx.finish();
    let mut out = http::Response::new(Full::new(Bytes::from(resp.body)));
    *out.status_mut() = resp.status;
    *out.headers_mut() = resp.headers;
    Ok(out)
}

fn empty_status(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut out = http::Response::new(Full::new(Bytes::new()));
    *out.status_mut() = status;
    out
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by service managers and
/// the Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // `pending()` is a future that never resolves — on non-Unix platforms
    // the SIGTERM arm is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
