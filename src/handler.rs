//! Handlers, and the type-erased form routers and plugins pass around.
//!
//! Every route ends up holding a [`BoxedHandler`]: an `Arc` to something
//! implementing [`ErasedHandler`]. A plain `async fn` gets there through the
//! [`Handler`] blanket impl; a plugin gets there by building its own
//! `ErasedHandler` around the `BoxedHandler` it was given.
//!
//! ```text
//! async fn show(req: Request) -> Result<Response, Abort>
//!        │ Route::get("/items/{name}", show)
//!        ▼
//! Arc<FnHandler<show>>                 what the route stores
//!        │ Router::build, once per installed plugin
//!        ▼
//! Arc<Wrapper { inner, … }>            what the tree stores
//!        │ per request
//!        ▼
//! wrapper.call(req) → inner.call(req) → show(req).into_outcome()
//! ```
//!
//! Because the handler result is an [`Outcome`] rather than a finished
//! response, a wrapper can tell a redirect from a 404 from a database
//! failure and act on each.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::abort::{IntoOutcome, Outcome};
use crate::request::Request;

/// The future every erased handler returns.
pub type BoxFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// Object-safe handler interface; implement it to wrap another handler.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler, shared by every request to its route.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Anything that can be registered as a route handler.
///
/// Satisfied by every `Fn(Request) -> impl Future<Output = impl IntoOutcome>`,
/// which includes `async fn`s returning a [`Response`](crate::Response), a
/// string, a status code, or `Result<_, impl Into<Abort>>`. Sealed; you never
/// implement it yourself.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

/// Adapts a typed handler function to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}
