//! Route registration, plugin application and the compiled [`App`].
//!
//! [`Router`] collects plugins and routes. [`Router::build`] applies every
//! plugin to every route exactly once and compiles one radix tree per method
//! into an [`App`]. O(path-length) lookup; no reflection, no per-request
//! plugin work beyond what the wrapped handlers themselves do.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::{debug, error, info};

use crate::abort::{Abort, HttpError, Outcome};
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::plugin::Plugin;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::route::Route;

/// The application builder.
///
/// Owns the installed plugins, in installation order, and the registered
/// routes. Each builder method returns `self` so registrations chain
/// naturally; [`install`](Router::install) is fallible because plugins may
/// refuse to coexist.
pub struct Router {
    plugins: Vec<Arc<dyn Plugin>>,
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { plugins: Vec::new(), routes: Vec::new() }
    }

    /// Installs `plugin` after running its [`setup`](Plugin::setup) against
    /// the plugins already installed.
    ///
    /// Plugins apply to every route, including routes registered before
    /// the plugin was installed.
    pub fn install(mut self, mut plugin: impl Plugin) -> Result<Self, Error> {
        plugin.setup(&self.plugins)?;
        info!(plugin = plugin.name(), "plugin installed");
        self.plugins.push(Arc::new(plugin));
        Ok(self)
    }

    /// Shorthand for `route(Route::new(method, path, handler))`.
    ///
    /// Path parameters use `{name}` syntax and come back through
    /// `req.param("name")`. Routes that take injected arguments or carry
    /// configuration go through [`Router::route`].
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.route(Route::new(method, path, handler))
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn plugins(&self) -> impl Iterator<Item = &dyn Plugin> {
        self.plugins.iter().map(|p| p.as_ref())
    }

    /// Applies the plugins and compiles the routing trees.
    ///
    /// The first installed plugin ends up outermost. Fails on a malformed or
    /// duplicate path and on any error a plugin raises for a route.
    pub fn build(self) -> Result<App, Error> {
        let mut trees: HashMap<Method, MatchitRouter<BoxedHandler>> = HashMap::new();

        for route in self.routes {
            let mut handler = Arc::clone(&route.handler);
            let ctx = route.context();
            for plugin in self.plugins.iter().rev() {
                if route.skips(plugin.name()) {
                    debug!(plugin = plugin.name(), path = %route.path, "plugin skipped by route");
                    continue;
                }
                handler = plugin.apply(handler, &ctx)?;
            }

            trees
                .entry(route.method.clone())
                .or_default()
                .insert(route.path.clone(), handler)
                .map_err(|e| Error::route(&route.path, e.to_string()))?;
        }

        Ok(App { trees })
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

// ── App ───────────────────────────────────────────────────────────────────────

/// A built router: immutable, shareable, ready to serve.
pub struct App {
    trees: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl App {
    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.trees.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Whether any method has a route matching `path`.
    fn matches_any(&self, path: &str) -> bool {
        self.trees.values().any(|tree| tree.at(path).is_ok())
    }

    /// Routes `req` and returns the handler's tagged outcome.
    ///
    /// An unmatched path is `Abort::Http(404)`; a path registered only for
    /// other methods is `Abort::Http(405)`.
    pub async fn call(&self, mut req: Request) -> Outcome {
        match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.set_params(params);
                handler.call(req).await
            }
            None if self.matches_any(req.path()) => {
                Err(HttpError::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into())
            }
            None => Err(HttpError::not_found("Not Found").into()),
        }
    }

    /// Routes `req` and renders whatever happened as a response.
    ///
    /// Unhandled failures are logged and become a bare `500`; their details
    /// never reach the client.
    pub async fn dispatch(&self, req: Request) -> Response {
        let method = req.method().clone();
        let path = req.path().to_owned();

        match self.call(req).await {
            Ok(resp) | Err(Abort::Response(resp)) => resp,
            Err(Abort::Http(e)) => e.into_response(),
            Err(Abort::Failure(e)) => {
                error!(%method, %path, error = %e, "unhandled failure");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::route::RouteContext;

    async fn hello(req: Request) -> String {
        format!("hello {}", req.param("name").unwrap_or("nobody"))
    }

    async fn moved(_req: Request) -> Result<Response, Abort> {
        Err(Abort::redirect("/new"))
    }

    async fn broken(_req: Request) -> Result<Response, Abort> {
        Err(crate::db::DbError::Closed.into())
    }

    /// Records the order in which it is applied and leaves handlers alone.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str { self.name }

        fn apply(&self, handler: BoxedHandler, route: &RouteContext<'_>) -> Result<BoxedHandler, Error> {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, route.path()));
            Ok(handler)
        }

        fn as_any(&self) -> &dyn std::any::Any { self }
    }

    #[tokio::test]
    async fn dispatch_routes_by_method_and_path() {
        let app = Router::new()
            .on(Method::GET, "/hello/{name}", hello)
            .build()
            .unwrap();

        let resp = app.dispatch(Request::new(Method::GET, "/hello/ada")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"hello ada");

        let resp = app.dispatch(Request::new(Method::POST, "/hello/ada")).await;
        assert_eq!(resp.status_code(), StatusCode::METHOD_NOT_ALLOWED);

        let resp = app.dispatch(Request::new(Method::GET, "/bye")).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signals_render_as_their_response_and_failures_as_500() {
        let app = Router::new()
            .on(Method::POST, "/old", moved)
            .on(Method::GET, "/broken", broken)
            .build()
            .unwrap();

        let resp = app.dispatch(Request::new(Method::POST, "/old")).await;
        assert_eq!(resp.status_code(), StatusCode::SEE_OTHER);

        let resp = app.dispatch(Request::new(Method::GET, "/broken")).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.body().is_empty());
    }

    #[test]
    fn plugins_apply_once_per_route_first_installed_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        Router::new()
            .on(Method::GET, "/a", hello)
            .install(Recorder { name: "outer", log: Arc::clone(&log) })
            .unwrap()
            .install(Recorder { name: "inner", log: Arc::clone(&log) })
            .unwrap()
            .route(Route::get("/b", hello).skip("inner"))
            .build()
            .unwrap();

        assert_eq!(*log.lock().unwrap(), ["inner:/a", "outer:/a", "outer:/b"]);
    }

    #[test]
    fn conflicting_paths_fail_the_build() {
        let result = Router::new()
            .on(Method::GET, "/items/{id}", hello)
            .on(Method::GET, "/items/{name}", hello)
            .build();
        assert!(matches!(result, Err(Error::Route { .. })));
    }
}
