//! Request-scoped MySQL connections.
//!
//! [`MySqlPlugin`] wraps every route that declares its keyword argument
//! (`"db"` by default). Each request to such a route gets its own connection
//! and a [`Cursor`] bound to that argument. How the handler finishes decides
//! what happens to the work it did:
//!
//! | Handler finished with | Transaction | Caller sees |
//! |---|---|---|
//! | a response | commit (if `autocommit`) | the response |
//! | [`Abort::Response`] (redirect, ...) | commit (if `autocommit`) | the signal, unchanged |
//! | an integrity violation | rollback | `500 Database Error` wrapping the violation |
//! | [`Abort::Http`] | nothing | the error, unchanged |
//! | any other failure, or a panic | nothing | the failure, unchanged |
//!
//! The connection is closed on every path. Routes that don't declare the
//! keyword are returned untouched when the router is built and never open a
//! connection.
//!
//! Route-level settings live under the `mysql` namespace:
//!
//! ```rust
//! use tsu_mysql::middleware::mysql::{ConnectionConfig, MySqlPlugin};
//! use tsu_mysql::{Abort, Request, Response, Route, Router};
//!
//! async fn audit(_req: Request) -> Result<Response, Abort> {
//!     Ok(Response::text("ok"))
//! }
//!
//! # fn main() -> Result<(), tsu_mysql::Error> {
//! let router = Router::new()
//!     .install(MySqlPlugin::new(ConnectionConfig::new().user("shop").database("shop")))?
//!     .route(Route::post("/audit", audit).arg("db").config("mysql.autocommit", false));
//! # Ok(())
//! # }
//! ```

mod config;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use http::StatusCode;
use serde_json::Value;
use tracing::{debug, debug_span, error, warn, Instrument};

use crate::abort::{Abort, HttpError, Outcome};
use crate::db::{ConnectionHandle, Connector, Cursor, MySqlConnector};
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::plugin::Plugin;
use crate::request::Request;
use crate::route::RouteContext;

pub use config::{ConnectionConfig, ConnectionOverlay, Target};

/// Route configuration namespace read by the plugin.
pub const NAMESPACE: &str = "mysql";

// ── Plugin ────────────────────────────────────────────────────────────────────

pub struct MySqlPlugin {
    name: String,
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
}

impl MySqlPlugin {
    /// A plugin that connects with the `sqlx` MySQL driver.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, MySqlConnector::new())
    }

    /// A plugin that opens its connections through `connector`.
    pub fn with_connector(config: ConnectionConfig, connector: impl Connector) -> Self {
        Self {
            name: NAMESPACE.to_string(),
            config,
            connector: Arc::new(connector),
        }
    }

    /// Instance defaults, before any route overlay.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn keyword(&self) -> &str {
        &self.config.keyword
    }
}

impl Plugin for MySqlPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    /// Refuses to share a keyword with another MySQL plugin. A plugin that
    /// only shares the name is renamed to `mysql_<keyword>` so routes can
    /// still skip each one individually.
    fn setup(&mut self, installed: &[Arc<dyn Plugin>]) -> Result<(), Error> {
        for other in installed {
            let Some(other) = other.as_any().downcast_ref::<MySqlPlugin>() else {
                continue;
            };
            if other.keyword() == self.keyword() {
                return Err(Error::Conflict(format!(
                    "another mysql plugin already binds the `{}` argument",
                    self.keyword()
                )));
            }
        }

        if installed.iter().any(|p| p.name() == self.name) {
            let renamed = format!("{}_{}", self.name, self.config.keyword);
            debug!(from = %self.name, to = %renamed, "plugin name taken, renaming");
            self.name = renamed;
        }
        Ok(())
    }

    fn apply(&self, handler: BoxedHandler, route: &RouteContext<'_>) -> Result<BoxedHandler, Error> {
        let overlay = ConnectionOverlay::from_map(route.overlay(NAMESPACE))
            .map_err(|e| Error::route(route.path(), format!("{NAMESPACE} configuration: {e}")))?;
        let config = self.config.merge(&overlay);

        if !route.declares(&config.keyword) {
            debug!(path = route.path(), keyword = %config.keyword, "route takes no cursor, left unwrapped");
            return Ok(handler);
        }

        debug!(
            path = route.path(),
            keyword = %config.keyword,
            target = %config.target(),
            autocommit = config.autocommit,
            overridden = !overlay.is_empty(),
            "wrapping route",
        );

        Ok(Arc::new(Wrapper {
            inner: handler,
            route: format!("{} {}", route.method(), route.path()),
            config: Arc::new(config),
            connector: Arc::clone(&self.connector),
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ── Wrapper ───────────────────────────────────────────────────────────────────

/// The handler registered in place of a route that takes a cursor.
struct Wrapper {
    inner: BoxedHandler,
    route: String,
    config: Arc<ConnectionConfig>,
    connector: Arc<dyn Connector>,
}

impl ErasedHandler for Wrapper {
    fn call(&self, req: Request) -> BoxFuture {
        let span = debug_span!("mysql", keyword = %self.config.keyword, route = %self.route);
        let fut = run(
            Arc::clone(&self.inner),
            Arc::clone(&self.config),
            Arc::clone(&self.connector),
            req,
        );
        Box::pin(fut.instrument(span))
    }
}

/// A response a connector produced instead of a connection.
#[derive(Debug, thiserror::Error)]
#[error("connector answered with {0} instead of a connection")]
struct ConnectRejected(StatusCode);

/// One request's unit of work: connect, run the handler, settle, close.
async fn run(
    inner: BoxedHandler,
    config: Arc<ConnectionConfig>,
    connector: Arc<dyn Connector>,
    mut req: Request,
) -> Outcome {
    let conn = match connector.connect(&config).await {
        Ok(conn) => conn,
        Err(Abort::Failure(e)) => {
            debug!(error = %e, "connect failed");
            return Err(Abort::Failure(e));
        }
        Err(Abort::Http(e)) => {
            error!(error = %e, "connector raised an http error");
            return Err(HttpError::database(e).into());
        }
        Err(Abort::Response(resp)) => {
            error!(status = %resp.status_code(), "connector raised a response");
            return Err(HttpError::database(ConnectRejected(resp.status_code())).into());
        }
    };
    let handle = ConnectionHandle::new(conn);
    debug!("connected");

    if let Some(tz) = &config.timezone {
        if let Err(e) = handle.execute("SET time_zone = ?", &[Value::from(tz.as_str())]).await {
            close(&handle).await;
            return Err(e.into());
        }
        debug!(timezone = %tz, "session time zone set");
    }

    let cursor = Cursor::new(handle.clone(), config.result_as_mapping, config.converters.clone());
    req.insert_arg(&config.keyword, cursor);

    let outcome = match AssertUnwindSafe(inner.call(req)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            warn!("handler panicked, closing connection without commit");
            close(&handle).await;
            std::panic::resume_unwind(panic);
        }
    };

    let outcome = settle(&handle, config.autocommit, outcome).await;
    close(&handle).await;
    outcome
}

/// Commits or rolls back according to how the handler finished.
///
/// A failing commit or rollback replaces the handler's outcome.
async fn settle(handle: &ConnectionHandle, autocommit: bool, outcome: Outcome) -> Outcome {
    match outcome {
        Ok(resp) => {
            if autocommit {
                handle.commit().await?;
                debug!("committed");
            }
            Ok(resp)
        }
        Err(Abort::Response(resp)) => {
            if autocommit {
                handle.commit().await?;
                debug!(status = %resp.status_code(), "committed before response signal");
            }
            Err(Abort::Response(resp))
        }
        Err(Abort::Failure(e)) if e.is_integrity_violation() => {
            warn!(error = %e, "integrity violation, rolling back");
            handle.rollback().await?;
            Err(HttpError::database(e).into())
        }
        passthrough => passthrough,
    }
}

/// Closes the connection. The work is already committed or abandoned at
/// this point, so a failing close is logged and otherwise ignored.
async fn close(handle: &ConnectionHandle) {
    match handle.close().await {
        Ok(()) => debug!("closed"),
        Err(e) => warn!(error = %e, "closing connection failed"),
    }
}
