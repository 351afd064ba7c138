//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod reach its database? Failure → pulled from load-balancer. |
//!
//! Register them on your router. Readiness declares the cursor argument so
//! the MySQL plugin opens a connection for it:
//!
//! ```rust,no_run
//! use tsu_mysql::{health, Route, Router};
//!
//! let app = Router::new()
//!     .route(Route::get("/healthz", health::liveness))
//!     .route(Route::get("/readyz", health::readiness("db")).arg("db"));
//! ```

use http::StatusCode;
use tracing::warn;

use crate::db::Cursor;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::Response;

/// Kubernetes liveness probe handler.
///
/// Always returns `200 OK` with body `"ok"`. It declares no cursor, so the
/// MySQL plugin leaves it alone and it never touches the database.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// Kubernetes readiness probe handler.
///
/// Runs `SELECT 1` on the cursor bound to `keyword`: `200 ready` when it
/// succeeds, `503` when it fails or no cursor was injected. A connection
/// that cannot be opened at all fails the request before this handler runs.
pub fn readiness(keyword: &str) -> impl Handler {
    let keyword = keyword.to_owned();
    move |mut req: Request| {
        let cursor = req.take_arg::<Cursor>(&keyword);
        async move {
            let Some(mut db) = cursor else {
                warn!("readiness probe has no cursor; is the route missing `.arg`?");
                return Response::status(StatusCode::SERVICE_UNAVAILABLE);
            };
            match db.execute("SELECT 1", &[]).await {
                Ok(_) => Response::text("ready"),
                Err(e) => {
                    warn!(error = %e, "readiness query failed");
                    Response::status(StatusCode::SERVICE_UNAVAILABLE)
                }
            }
        }
    }
}
