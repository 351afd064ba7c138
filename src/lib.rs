//! # tsu-mysql
//!
//! Request-scoped MySQL connections for a small async HTTP framework.
//!
//! ## The contract
//!
//! A handler that wants the database says so: its route declares the `db`
//! argument. For every request to that route the [`MySqlPlugin`] opens one
//! connection, hands the handler a [`Cursor`], and then settles the work by
//! how the handler finished:
//!
//! - returned a response or raised a redirect → **commit** (with `autocommit`)
//! - hit a constraint violation → **rollback**, answer `500 Database Error`
//! - raised an HTTP error such as `404` → leave it alone, pass it through
//!
//! and closes the connection, always. Routes that don't declare the argument
//! are left exactly as they were, with no connection and no overhead.
//!
//! This is not a connection pool, a query builder, or a transaction manager.
//! One request, one connection, one decision.
//!
//! What the framework underneath provides:
//!
//! - Radix-tree routing — O(path-length) lookup via [`matchit`]
//! - HTTP/1.1 and HTTP/2 via hyper, one tokio task per connection
//! - Graceful shutdown — SIGTERM / Ctrl-C, drains in-flight requests
//! - Plugins applied once, when the router is built
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use tsu_mysql::db::Cursor;
//! use tsu_mysql::middleware::mysql::{ConnectionConfig, MySqlPlugin};
//! use tsu_mysql::{Abort, HttpError, Request, Response, Route, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tsu_mysql::Error> {
//!     let config = ConnectionConfig::load("MYSQL")?;
//!
//!     let app = Router::new()
//!         .install(MySqlPlugin::new(config))?
//!         .route(Route::get("/items/{name}", show).arg("db"))
//!         .route(Route::get("/healthz", tsu_mysql::health::liveness));
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn show(mut req: Request) -> Result<Response, Abort> {
//!     let name = req.param("name").unwrap_or_default().to_owned();
//!     let mut db: Cursor = req.take_arg("db").ok_or_else(|| Abort::missing_arg("db"))?;
//!
//!     db.execute("SELECT * FROM items WHERE name = ?", &[json!(name)]).await?;
//!     match db.fetch_one() {
//!         Some(row) => Ok(Response::json(serde_json::to_vec(&row).unwrap_or_default())),
//!         None => Err(HttpError::not_found("Page not found").into()),
//!     }
//! }
//! ```

mod abort;
mod error;
mod handler;
mod plugin;
mod request;
mod response;
mod route;
mod router;
mod server;

pub mod db;
pub mod health;
pub mod middleware;

pub use abort::{Abort, HttpError, IntoOutcome, Outcome};
pub use error::Error;
pub use handler::Handler;
pub use plugin::Plugin;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use route::{Route, RouteContext};
pub use router::{App, Router};
pub use server::{MAX_BODY_BYTES, Server};

pub use db::{Cursor, Row};
pub use middleware::mysql::{ConnectionConfig, MySqlPlugin};

pub use http::{Method, StatusCode};

/// Building blocks for plugins that wrap handlers.
#[doc(hidden)]
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler};
