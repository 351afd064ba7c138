//! Plugin extension points.

use std::any::Any;
use std::sync::Arc;

use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::route::RouteContext;

/// A build-time handler decorator.
///
/// The router calls [`setup`](Plugin::setup) once, when the plugin is
/// installed, and [`apply`](Plugin::apply) once per route, when the router is
/// built. Nothing a plugin decides is re-evaluated per request.
pub trait Plugin: Send + Sync + 'static {
    /// The name routes use to [`skip`](crate::Route::skip) this plugin.
    fn name(&self) -> &str;

    /// Checks this plugin against the ones installed before it.
    ///
    /// Returning an error aborts the installation; the plugin may also adjust
    /// itself (e.g. its name) to coexist with the others.
    fn setup(&mut self, installed: &[Arc<dyn Plugin>]) -> Result<(), Error> {
        let _ = installed;
        Ok(())
    }

    /// Returns the handler to register for `route`: `handler` itself when the
    /// plugin has nothing to do there, or a new handler composed around it.
    fn apply(&self, handler: BoxedHandler, route: &RouteContext<'_>) -> Result<BoxedHandler, Error>;

    /// Lets plugins recognise other instances of their own kind during `setup`.
    fn as_any(&self) -> &dyn Any;
}
