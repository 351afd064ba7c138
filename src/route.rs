//! Route declarations and what plugins get to see of them.

use std::collections::BTreeSet;

use http::Method;
use serde_json::{Map, Value};

use crate::handler::{BoxedHandler, Handler};

/// One route: method, path, handler, and everything plugins read at build time.
///
/// Rust cannot list a function's parameter names, so a route *declares* the
/// arguments its handler expects. Path parameters (`{name}`) are declared
/// automatically; anything a plugin injects is declared with [`Route::arg`].
///
/// ```rust
/// use serde_json::json;
/// use tsu_mysql::{Request, Response, Route};
///
/// # async fn show(_: Request) -> Response { Response::text("") }
/// let route = Route::get("/items/{name}", show)
///     .arg("db")
///     .config("mysql.autocommit", false)
///     .config("mysql", json!({ "database": "catalog" }));
/// ```
pub struct Route {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) handler: BoxedHandler,
    args: BTreeSet<String>,
    config: Map<String, Value>,
    skip: Vec<String>,
}

impl Route {
    pub fn new(method: Method, path: &str, handler: impl Handler) -> Self {
        Self {
            method,
            path: path.to_owned(),
            handler: handler.into_boxed_handler(),
            args: path_params(path),
            config: Map::new(),
            skip: Vec::new(),
        }
    }

    pub fn get(path: &str, handler: impl Handler) -> Self {
        Self::new(Method::GET, path, handler)
    }

    pub fn post(path: &str, handler: impl Handler) -> Self {
        Self::new(Method::POST, path, handler)
    }

    pub fn put(path: &str, handler: impl Handler) -> Self {
        Self::new(Method::PUT, path, handler)
    }

    pub fn delete(path: &str, handler: impl Handler) -> Self {
        Self::new(Method::DELETE, path, handler)
    }

    /// Declares that the handler takes the injected argument `name`.
    pub fn arg(mut self, name: &str) -> Self {
        self.args.insert(name.to_owned());
        self
    }

    /// Sets a route-level configuration value.
    ///
    /// `key` is either a plugin namespace holding an object (`"mysql"`) or a
    /// dotted key inside one (`"mysql.autocommit"`). Dotted keys win over
    /// the same field set through the namespace object.
    pub fn config(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.config.insert(key.to_owned(), value.into());
        self
    }

    /// Excludes the plugin called `name` from this route.
    pub fn skip(mut self, name: &str) -> Self {
        self.skip.push(name.to_owned());
        self
    }

    pub(crate) fn skips(&self, plugin: &str) -> bool {
        self.skip.iter().any(|s| s == plugin)
    }

    pub(crate) fn context(&self) -> RouteContext<'_> {
        RouteContext {
            method: &self.method,
            path: &self.path,
            args: &self.args,
            config: &self.config,
        }
    }
}

/// Names inside `{…}` segments, without the catch-all `*` marker.
fn path_params(path: &str) -> BTreeSet<String> {
    path.split('/')
        .filter_map(|seg| seg.strip_prefix('{')?.strip_suffix('}'))
        .map(|name| name.trim_start_matches('*').to_owned())
        .filter(|name| !name.is_empty())
        .collect()
}

// ── RouteContext ──────────────────────────────────────────────────────────────

/// Read-only view of a [`Route`] handed to [`Plugin::apply`](crate::Plugin::apply).
///
/// It describes the *original* handler, before any plugin wrapped it.
#[derive(Clone, Copy, Debug)]
pub struct RouteContext<'a> {
    method: &'a Method,
    path: &'a str,
    args: &'a BTreeSet<String>,
    config: &'a Map<String, Value>,
}

impl<'a> RouteContext<'a> {
    pub fn method(&self) -> &'a Method {
        self.method
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    /// Whether the handler declared the argument `name`.
    pub fn declares(&self, name: &str) -> bool {
        self.args.contains(name)
    }

    pub fn args(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.args.iter().map(String::as_str)
    }

    /// The route configuration under `namespace`, flattened into one object.
    ///
    /// Fields of a `namespace` object come first; `namespace.field` keys are
    /// applied on top.
    pub fn overlay(&self, namespace: &str) -> Map<String, Value> {
        let mut merged = match self.config.get(namespace) {
            Some(Value::Object(fields)) => fields.clone(),
            _ => Map::new(),
        };
        let prefix = format!("{namespace}.");
        for (key, value) in self.config {
            if let Some(field) = key.strip_prefix(&prefix) {
                merged.insert(field.to_owned(), value.clone());
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Request, Response};

    async fn noop(_req: Request) -> Response {
        Response::text("")
    }

    #[test]
    fn path_parameters_are_declared() {
        let route = Route::get("/shops/{shop}/items/{name}", noop);
        let ctx = route.context();
        assert!(ctx.declares("shop"));
        assert!(ctx.declares("name"));
        assert!(!ctx.declares("db"));
        assert_eq!(ctx.args().collect::<Vec<_>>(), ["name", "shop"]);
    }

    #[test]
    fn catch_all_parameter_is_declared_without_marker() {
        let route = Route::get("/static/{*rest}", noop);
        assert!(route.context().declares("rest"));
    }

    #[test]
    fn explicit_args_join_path_parameters() {
        let route = Route::post("/items", noop).arg("db");
        assert!(route.context().declares("db"));
        assert_eq!(route.context().method(), &Method::POST);
    }

    #[test]
    fn overlay_merges_nested_and_dotted_keys() {
        let route = Route::get("/", noop)
            .config("mysql", json!({ "database": "shop", "autocommit": true }))
            .config("mysql.autocommit", false)
            .config("mysqlx.host", "elsewhere")
            .config("cache.ttl", 30);

        let overlay = route.context().overlay("mysql");
        assert_eq!(overlay.get("database"), Some(&json!("shop")));
        assert_eq!(overlay.get("autocommit"), Some(&json!(false)));
        assert_eq!(overlay.len(), 2);
    }

    #[test]
    fn overlay_is_empty_without_configuration() {
        let route = Route::get("/", noop);
        assert!(route.context().overlay("mysql").is_empty());
    }

    #[test]
    fn skip_list_is_matched_by_name() {
        let route = Route::get("/", noop).skip("mysql");
        assert!(route.skips("mysql"));
        assert!(!route.skips("mysql_audit"));
    }
}
