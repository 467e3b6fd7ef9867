//! Minimal strand example — chains, groups, sessions, JSON.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/
//!   curl 'http://localhost:3000/api/users/42?callback=render'
//!   curl -c /tmp/cj -b /tmp/cj http://localhost:3000/visits
//!   curl -X POST http://localhost:3000/api/echo -d 'hi'

use std::time::Duration;

use serde_json::json;
use strand::{chain, health, Context, Registry, Server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut app = Registry::new();
    app.favicon();
    app.handle("/healthz", chain![health::liveness]);
    app.handle("/", chain![index]);
    app.handle("/visits", chain![visits]);

    // Every /api route runs `audit` first; it could close the context to
    // reject the request before the route handler runs.
    let mut api = app.group("/api", chain![audit]);
    api.get("/users/{id}", chain![get_user]);
    api.post("/echo", chain![echo]);

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

async fn audit(c: Context) {
    tracing::info!(method = %c.method(), path = c.path(), "api request");
}

async fn index(c: Context) {
    c.render_content(
        "{[{",
        "}]}",
        &json!({ "name": "strand" }),
        &["<h1>{[{ name }]}</h1>"],
    );
}

// Session round-trip: counts visits per client cookie.
async fn visits(c: Context) {
    let n = c.session_get("visits").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
    c.session_set("visits", json!(n), Duration::from_secs(3600));
    let _ = c.json(&json!({ "visits": n }));
}

// GET /api/users/{id} — add ?callback=f for JSONP.
async fn get_user(c: Context) {
    let id = c.param("id").unwrap_or("unknown").to_owned();
    let _ = c.json(&json!({ "id": id, "name": "alice" }));
}

async fn echo(c: Context) {
    let body = String::from_utf8_lossy(c.body()).into_owned();
    let _ = c.json2(0, &body);
}
