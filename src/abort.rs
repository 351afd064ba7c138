//! How a handler finishes: the [`Outcome`] of one invocation.
//!
//! A handler either returns a response or aborts. Aborting comes in three
//! flavours, and middleware treats each differently:
//!
//! | Variant | Meaning | Example |
//! |---|---|---|
//! | [`Abort::Response`] | control flow, **not** an error | redirect after a POST |
//! | [`Abort::Http`] | an error the framework renders as-is | `404 Not Found` |
//! | [`Abort::Failure`] | something went wrong underneath | constraint violation, lost connection |
//!
//! Handlers return `Result<T, Abort>` and use `?`: every [`DbError`],
//! [`Error`] and [`HttpError`] converts into an `Abort`.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;

use crate::db::DbError;
use crate::error::Error;
use crate::response::{IntoResponse, Response};

/// The tagged result of one handler invocation.
pub type Outcome = Result<Response, Abort>;

// ── Abort ─────────────────────────────────────────────────────────────────────

/// A handler's early exit. See the [module docs](self).
#[derive(Debug)]
pub enum Abort {
    /// A response raised as control flow. Middleware treats it as success.
    Response(Response),
    /// A framework error response, passed through untouched.
    Http(HttpError),
    /// An error the handler did not handle.
    Failure(Error),
}

impl Abort {
    /// Ends the request with a `303 See Other` redirect.
    pub fn redirect(location: &str) -> Self {
        Self::Response(Response::redirect(location))
    }

    /// Ends the request with `response`, as a successful early exit.
    pub fn with(response: impl IntoResponse) -> Self {
        Self::Response(response.into_response())
    }

    /// A `500` for a route that expected an injected argument and did not
    /// receive one, i.e. a registration mistake.
    pub fn missing_arg(name: &str) -> Self {
        Self::Http(HttpError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("argument `{name}` was not injected"),
        ))
    }
}

impl From<HttpError> for Abort {
    fn from(e: HttpError) -> Self {
        Self::Http(e)
    }
}

impl From<Error> for Abort {
    fn from(e: Error) -> Self {
        Self::Failure(e)
    }
}

impl From<DbError> for Abort {
    fn from(e: DbError) -> Self {
        Self::Failure(Error::Database(e))
    }
}

// ── HttpError ─────────────────────────────────────────────────────────────────

/// An error response: status, message, and optionally the error behind it.
///
/// Clones share the same `source`.
#[derive(Clone, Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), source: None }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// `500 Database Error`, the response for a request whose database work
    /// failed and was rolled back.
    pub fn database(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Database Error").with_source(source)
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        Response::builder().status(self.status).text(self.message)
    }
}

// ── IntoOutcome ───────────────────────────────────────────────────────────────

/// Conversion of a handler's return value into an [`Outcome`].
///
/// Plain responses are successful returns. `Result<T, E>` lets handlers use
/// `?` with any error that converts into [`Abort`].
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for Response {
    fn into_outcome(self) -> Outcome { Ok(self) }
}

impl IntoOutcome for &'static str {
    fn into_outcome(self) -> Outcome { Ok(self.into_response()) }
}

impl IntoOutcome for String {
    fn into_outcome(self) -> Outcome { Ok(self.into_response()) }
}

impl IntoOutcome for StatusCode {
    fn into_outcome(self) -> Outcome { Ok(self.into_response()) }
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: Into<Abort>,
{
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(value) => value.into_outcome(),
            Err(abort) => Err(abort.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_error_keeps_its_cause() {
        let cause = DbError::integrity(Some("23000".into()), "Duplicate entry");
        let err = HttpError::database(cause);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Database Error");

        let source = StdError::source(&err).unwrap();
        assert!(source.to_string().contains("Duplicate entry"));
    }

    #[test]
    fn question_mark_conversions() {
        assert!(matches!(Abort::from(DbError::Closed), Abort::Failure(Error::Database(_))));
        assert!(matches!(Abort::from(HttpError::not_found("nope")), Abort::Http(_)));
    }

    #[test]
    fn results_flatten_into_outcomes() {
        let ok: Result<&'static str, HttpError> = Ok("fine");
        assert_eq!(ok.into_outcome().unwrap().status_code(), StatusCode::OK);

        let err: Result<Response, HttpError> = Err(HttpError::not_found("gone"));
        match err.into_outcome() {
            Err(Abort::Http(e)) => assert_eq!(e.status(), StatusCode::NOT_FOUND),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn redirect_is_a_response_signal() {
        match Abort::redirect("/items") {
            Abort::Response(r) => {
                assert_eq!(r.status_code(), StatusCode::SEE_OTHER);
                assert_eq!(r.header("location"), Some("/items"));
            }
            other => panic!("unexpected abort: {other:?}"),
        }
    }
}
