//! Handler trait, type erasure, and chains.
//!
//! # How async handlers are stored
//!
//! A route owns an *ordered* list of handlers of *different* concrete types.
//! Rust collections can only hold one concrete type, so we use **trait
//! objects** (`dyn ErasedHandler`) to hide the concrete handler type behind
//! a common interface and store everything uniformly.
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! async fn hello(c: Context) { … }                 ← user writes this
//!        ↓ chain![hello]
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                       ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(c)  at request time                 ← one vtable dispatch
//!        ↓
//! Box::pin(hello(c))                               ← BoxFuture
//! ```
//!
//! The only runtime cost per request is **one Arc clone** (atomic inc) +
//! **one virtual call** per handler in the chain — negligible compared to
//! network I/O.
//!
//! Handlers produce output through the [`Context`] they receive (side
//! effects on the response buffer), not through a return value. A handler
//! that calls [`Context::close`](crate::Context::close) stops the rest of
//! its chain.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` is required because the async runtime must be able to poll
/// the future in-place — it cannot move it in memory after the first poll.
/// `Send + 'static` let tokio move the future across threads safely.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
/// External crates cannot usefully interact with this trait.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture;
}

/// A heap-allocated, type-erased handler shared across concurrent requests.
///
/// `#[doc(hidden)] pub` for the same reason as `ErasedHandler`.
/// `Arc` gives us cheap, thread-safe shared ownership (one atomic reference
/// count increment per request) without copying the handler.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// An ordered handler sequence bound to one route.
///
/// Execution order is registration order; the sequence stops early after
/// any handler that closed its [`Context`]. Build one with [`chain!`].
pub type Chain = Vec<BoxedHandler>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid chain member.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(c: Context)
/// ```
///
/// The trait is **sealed** (via the private `Sealed` supertrait): only the
/// blanket impl below can satisfy it. This prevents accidental misuse and
/// keeps the API surface stable across versions.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// The sealing module. Because `Sealed` is private, external crates cannot
/// name it and therefore cannot implement `Handler` on their own types.
mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

/// Implement the sealing trait for any function with the right signature.
///
/// `Fn(Context) -> Fut` covers:
///   - named `async fn` items
///   - closures returning `async move` blocks
///   - any struct that implements `Fn`
impl<F, Fut> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
}

/// Implement `Handler` for any function with the right signature.
impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        // Call the wrapped function — this returns the concrete `Fut`.
        // Boxing makes the return type match the trait signature.
        Box::pin((self.0)(ctx))
    }
}

// ── chain! ────────────────────────────────────────────────────────────────────

/// Builds a [`Chain`] from zero or more handlers, in execution order.
///
/// ```rust,no_run
/// # use strand::{chain, Context, Registry};
/// # async fn auth(_: Context) {}
/// # async fn page(_: Context) {}
/// let mut app = Registry::new();
/// app.handle("/admin", chain![auth, page]);
/// ```
#[macro_export]
macro_rules! chain {
    () => { $crate::Chain::new() };
    ($($h:expr),+ $(,)?) => {
        vec![$($crate::Handler::into_boxed_handler($h)),+]
    };
}
