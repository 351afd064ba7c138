//! Incoming HTTP request type.

use std::any::Any;
use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method};

/// An incoming HTTP request.
///
/// Besides the HTTP parts it carries the route's path parameters and the
/// *injected arguments*: values that plugins bind to a name before the
/// handler runs, such as the database cursor bound to `"db"`.
pub struct Request {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    args: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Request {
    /// A bodiless request. The server builds requests from the wire; this
    /// constructor is for driving an [`App`](crate::App) directly.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            args: HashMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/items/{name}`, `req.param("name")` on `/items/pear` returns `Some("pear")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// Binds `value` to the argument `name`, replacing any earlier value.
    pub fn insert_arg<T: Any + Send + Sync>(&mut self, name: &str, value: T) {
        self.args.insert(name.to_owned(), Box::new(value));
    }

    /// Takes the argument bound to `name` out of the request.
    ///
    /// Returns `None` when nothing is bound under that name or the bound
    /// value is not a `T`; in the latter case the value stays in place.
    pub fn take_arg<T: Any>(&mut self, name: &str) -> Option<T> {
        if !self.args.get(name)?.is::<T>() {
            return None;
        }
        let value = self.args.remove(name)?;
        value.downcast::<T>().ok().map(|v| *v)
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_are_typed_and_taken_once() {
        let mut req = Request::new(Method::GET, "/");
        req.insert_arg("db", 42_u32);

        assert!(req.has_arg("db"));
        assert_eq!(req.take_arg::<String>("db"), None);
        assert!(req.has_arg("db"), "a type mismatch must not consume the value");

        assert_eq!(req.take_arg::<u32>("db"), Some(42));
        assert_eq!(req.take_arg::<u32>("db"), None);
        assert!(!req.has_arg("db"));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/plain".parse().unwrap());
        let req = Request::new(Method::POST, "/items").with_headers(headers).with_body("x");

        assert_eq!(req.header("Content-Type"), Some("text/plain"));
        assert_eq!(req.body(), b"x");
    }
}
