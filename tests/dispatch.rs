//! End-to-end dispatch tests: real listener, real client.
//!
//! Each test builds its own registry, serves it on an ephemeral loopback
//! port, and drives it with reqwest. The client is built without automatic
//! decompression so gzip assertions see the wire bytes.

use std::io::Read as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use strand::{chain, Context, Registry, Server, Shutdown};

// ── Harness ───────────────────────────────────────────────────────────────────

fn free_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    addr.to_string()
}

async fn start(registry: Registry) -> (String, Shutdown) {
    let addr = free_addr();
    let server = Server::bind(&addr);
    let shutdown = server.shutdown_handle();
    tokio::spawn(server.serve(registry));

    for _ in 0..100 {
        if tokio::net::TcpStream::connect(&addr).await.is_ok() {
            return (format!("http://{addr}"), shutdown);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server did not come up on {addr}");
}

fn gunzip(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .expect("gzip body");
    out
}

type BoxFut = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// A handler that bumps a counter, optionally closing the context.
fn counting(counter: &Arc<AtomicUsize>, close: bool) -> impl Fn(Context) -> BoxFut {
    let counter = Arc::clone(counter);
    move |c: Context| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if close {
                c.close();
            }
        }) as BoxFut
    }
}

// ── Chain execution ───────────────────────────────────────────────────────────

#[tokio::test]
async fn close_stops_the_rest_of_the_chain() {
    let counters: Vec<_> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();

    let mut app = Registry::new();
    app.handle(
        "/x",
        chain![
            counting(&counters[0], true),
            counting(&counters[1], false),
            counting(&counters[2], false),
        ],
    );
    let (base, _shutdown) = start(app).await;

    let res = reqwest::get(format!("{base}/x")).await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(counters[0].load(Ordering::SeqCst), 1);
    assert_eq!(counters[1].load(Ordering::SeqCst), 0);
    assert_eq!(counters[2].load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn open_chain_runs_every_handler_in_order() {
    let counters: Vec<_> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();

    let mut app = Registry::new();
    app.handle(
        "/x",
        chain![
            counting(&counters[0], false),
            counting(&counters[1], false),
            counting(&counters[2], true),
        ],
    );
    let (base, _shutdown) = start(app).await;

    reqwest::get(format!("{base}/x")).await.unwrap();
    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

// ── JSON / JSONP / compression ────────────────────────────────────────────────

#[tokio::test]
async fn small_json_is_uncompressed_and_exact() {
    let mut app = Registry::new();
    app.handle(
        "/j",
        chain![|c: Context| async move {
            let _ = c.json(&json!({"a": 1}));
        }],
    );
    let (base, _shutdown) = start(app).await;

    let res = reqwest::get(format!("{base}/j")).await.unwrap();
    assert_eq!(res.headers()["content-type"], "application/json");
    assert!(res.headers().get("content-encoding").is_none());
    assert_eq!(res.bytes().await.unwrap().as_ref(), br#"{"a":1}"#);
}

#[tokio::test]
async fn large_json_round_trips_through_gzip() {
    let payload = json!({ "blob": "x".repeat(4096) });
    let expected = serde_json::to_vec(&payload).unwrap();

    let mut app = Registry::new();
    app.handle(
        "/j",
        chain![move |c: Context| {
            let payload = payload.clone();
            async move {
                let _ = c.json(&payload);
            }
        }],
    );
    let (base, _shutdown) = start(app).await;

    let res = reqwest::get(format!("{base}/j")).await.unwrap();
    assert_eq!(res.headers()["content-encoding"], "gzip");
    let body = res.bytes().await.unwrap();
    assert_eq!(gunzip(&body), expected);
}

#[tokio::test]
async fn jsonp_wraps_the_body_in_the_callback() {
    let mut app = Registry::new();
    app.handle(
        "/j",
        chain![|c: Context| async move {
            let _ = c.json(&json!({"a": 1}));
        }],
    );
    let (base, _shutdown) = start(app).await;

    let res = reqwest::get(format!("{base}/j?callback=foo")).await.unwrap();
    assert_eq!(res.bytes().await.unwrap().as_ref(), br#"foo({"a":1})"#);
}

#[tokio::test]
async fn large_jsonp_decompresses_to_the_wrapped_form() {
    let blob = "y".repeat(2048);
    let expected = format!(r#"foo({{"blob":"{blob}"}})"#);

    let mut app = Registry::new();
    app.handle(
        "/j",
        chain![move |c: Context| {
            let blob = blob.clone();
            async move {
                let _ = c.json(&json!({ "blob": blob }));
            }
        }],
    );
    let (base, _shutdown) = start(app).await;

    let res = reqwest::get(format!("{base}/j?callback=foo")).await.unwrap();
    assert_eq!(res.headers()["content-encoding"], "gzip");
    let body = res.bytes().await.unwrap();
    assert_eq!(gunzip(&body), expected.as_bytes());
}

#[tokio::test]
async fn json2_produces_the_envelope() {
    let mut app = Registry::new();
    app.handle(
        "/j2",
        chain![|c: Context| async move {
            let _ = c.json2(5, &"x");
        }],
    );
    let (base, _shutdown) = start(app).await;

    let res = reqwest::get(format!("{base}/j2")).await.unwrap();
    let v: Value = serde_json::from_slice(&res.bytes().await.unwrap()).unwrap();
    assert_eq!(v, json!({"no": 5, "data": "x"}));
}

// ── Groups and method routing ─────────────────────────────────────────────────

#[tokio::test]
async fn group_routes_are_reachable_only_under_the_prefix() {
    let mut app = Registry::new();
    let mut g = app.group("/g", chain![]);
    g.handle(
        "/s",
        chain![|c: Context| async move {
            c.write("grouped");
        }],
    );
    let (base, _shutdown) = start(app).await;

    let ok = reqwest::get(format!("{base}/g/s")).await.unwrap();
    assert_eq!(ok.status(), 200);
    assert_eq!(ok.text().await.unwrap(), "grouped");

    assert_eq!(reqwest::get(format!("{base}/s")).await.unwrap().status(), 404);
    assert_eq!(reqwest::get(format!("{base}/g")).await.unwrap().status(), 404);
}

#[tokio::test]
async fn shared_chain_can_reject_before_the_route_handler() {
    let reached = Arc::new(AtomicUsize::new(0));

    let mut app = Registry::new();
    let mut g = app.group(
        "/admin",
        chain![|c: Context| async move {
            c.set_status(strand::StatusCode::UNAUTHORIZED);
            c.close();
        }],
    );
    g.get("/panel", chain![counting(&reached, false)]);
    let (base, _shutdown) = start(app).await;

    let res = reqwest::get(format!("{base}/admin/panel")).await.unwrap();
    assert_eq!(res.status(), 401);
    assert_eq!(reached.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn methods_dispatch_to_their_own_chains() {
    let mut app = Registry::new();
    let mut g = app.group("/r", chain![]);
    g.get(
        "/m",
        chain![|c: Context| async move {
            c.write("get");
        }],
    );
    g.post(
        "/m",
        chain![|c: Context| async move {
            c.write("post");
        }],
    );
    let (base, _shutdown) = start(app).await;

    let client = reqwest::Client::new();
    let get = client.get(format!("{base}/r/m")).send().await.unwrap();
    assert_eq!(get.text().await.unwrap(), "get");

    let post = client.post(format!("{base}/r/m")).send().await.unwrap();
    assert_eq!(post.text().await.unwrap(), "post");

    let delete = client.delete(format!("{base}/r/m")).send().await.unwrap();
    assert_eq!(delete.status(), 405);
}

// ── Sessions ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_values_are_scoped_to_the_token() {
    let mut app = Registry::new();
    app.handle(
        "/set",
        chain![|c: Context| async move {
            c.session_set("user", json!("ada"), Duration::from_secs(60));
            let _ = c.json(&json!("ok"));
        }],
    );
    app.handle(
        "/get",
        chain![|c: Context| async move {
            let _ = c.json(&c.session_get("user"));
        }],
    );
    let (base, _shutdown) = start(app).await;

    let client = reqwest::Client::new();
    client
        .get(format!("{base}/set"))
        .header("cookie", "STRANDSESSION=token-a")
        .send()
        .await
        .unwrap();

    let same = client
        .get(format!("{base}/get"))
        .header("cookie", "STRANDSESSION=token-a")
        .send()
        .await
        .unwrap();
    assert_eq!(same.text().await.unwrap(), r#""ada""#);

    let other = client
        .get(format!("{base}/get"))
        .header("cookie", "STRANDSESSION=token-b")
        .send()
        .await
        .unwrap();
    assert_eq!(other.text().await.unwrap(), "null");
}

#[tokio::test]
async fn first_write_issues_a_session_cookie() {
    let mut app = Registry::new();
    app.handle(
        "/set",
        chain![|c: Context| async move {
            c.session_set("k", json!(1), Duration::from_secs(60));
            let _ = c.json(&json!("ok"));
        }],
    );
    let (base, _shutdown) = start(app).await;

    let res = reqwest::get(format!("{base}/set")).await.unwrap();
    let cookie = res
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .expect("session cookie issued");
    assert!(cookie.starts_with("STRANDSESSION="));
    assert!(cookie.contains("HttpOnly"));
}

// ── Templates ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_template_degrades_to_inline_error_text() {
    let mut app = Registry::new();
    app.handle(
        "/t",
        chain![|c: Context| async move {
            c.render_content("{{", "}}", &json!({}), &["oops {{ "]);
        }],
    );
    let (base, _shutdown) = start(app).await;

    let res = reqwest::get(format!("{base}/t")).await.unwrap();
    assert_eq!(res.status(), 200, "template failure must not change the status");
    assert!(!res.bytes().await.unwrap().is_empty(), "error text expected in body");
}

// ── Pass-through endpoints ────────────────────────────────────────────────────

#[tokio::test]
async fn favicon_serves_the_fixed_icon() {
    let mut app = Registry::new();
    app.favicon();
    let (base, _shutdown) = start(app).await;

    let res = reqwest::get(format!("{base}/favicon.ico")).await.unwrap();
    assert_eq!(res.headers()["content-type"], "image/x-icon");
    assert_eq!(res.bytes().await.unwrap().len(), 198);
}

#[tokio::test]
async fn static_files_are_served_with_content_types() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "static body").unwrap();

    let mut app = Registry::new();
    app.static_dir("/assets", dir.path());
    let (base, _shutdown) = start(app).await;

    let res = reqwest::get(format!("{base}/assets/hello.txt")).await.unwrap();
    assert_eq!(res.headers()["content-type"], "text/plain; charset=utf-8");
    assert_eq!(res.text().await.unwrap(), "static body");

    let missing = reqwest::get(format!("{base}/assets/nope.txt")).await.unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn pfx_delivery_streams_the_file_or_404s() {
    let dir = tempfile::tempdir().unwrap();
    let pfx = dir.path().join("ssl.pfx");
    std::fs::write(&pfx, b"not really pkcs12").unwrap();

    let mut app = Registry::new();
    app.handle_pfx("/ssl.pfx", &pfx);
    app.handle_pfx("/missing.pfx", dir.path().join("absent.pfx"));
    let (base, _shutdown) = start(app).await;

    let ok = reqwest::get(format!("{base}/ssl.pfx")).await.unwrap();
    assert_eq!(ok.headers()["content-type"], "application/x-x509-ca-cert");
    assert_eq!(ok.bytes().await.unwrap().as_ref(), b"not really pkcs12");

    let missing = reqwest::get(format!("{base}/missing.pfx")).await.unwrap();
    assert_eq!(missing.status(), 404);
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_stops_accepting_and_returns() {
    let mut app = Registry::new();
    app.handle(
        "/x",
        chain![|c: Context| async move {
            c.write("hi");
        }],
    );

    let addr = free_addr();
    let server = Server::bind(&addr);
    let shutdown = server.shutdown_handle();
    let serving = tokio::spawn(server.serve(app));

    for _ in 0..100 {
        if tokio::net::TcpStream::connect(&addr).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.shutdown(Duration::from_secs(1));
    let joined = tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("serve returned within the grace window")
        .expect("serve task did not panic");
    assert!(joined.is_ok());

    assert!(tokio::net::TcpStream::connect(&addr).await.is_err());
}
