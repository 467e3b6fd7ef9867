//! Built-in health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can it serve traffic? Failure → pulled from the pool. |
//!
//! Register them like any other chain:
//!
//! ```rust,no_run
//! use strand::{chain, health, Registry};
//!
//! let mut app = Registry::new();
//! app.handle("/healthz", chain![health::liveness]);
//! app.handle("/readyz", chain![health::readiness]);
//! ```
//!
//! Replace `readiness` with your own handler if you need to gate on
//! dependency availability (database connections, downstream services).

use crate::context::Context;

/// Liveness probe handler.
///
/// Always answers `200 OK` with body `"ok"`. If the process can respond to
/// HTTP at all, it is alive — this handler intentionally has no dependencies.
pub async fn liveness(c: Context) {
    c.write("ok");
    c.close();
}

/// Readiness probe handler (default implementation).
///
/// Answers `200 OK` with body `"ready"`. Replace it if your application
/// needs a warm-up period or must verify dependency health first.
pub async fn readiness(c: Context) {
    c.write("ready");
    c.close();
}
