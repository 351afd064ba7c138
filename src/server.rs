//! The HTTP server.
//!
//! One tokio task per accepted connection; hyper-util's `auto` builder speaks
//! HTTP/1.1 or HTTP/2, whichever the client picks.
//!
//! # Shutdown
//!
//! On SIGTERM or Ctrl-C the accept loop stops at once, then the server waits
//! for every connection task to finish. A request that is mid-transaction
//! therefore still commits or rolls back and closes its database connection
//! before [`Server::serve`] returns.
//!
//! # Request bodies
//!
//! Bodies are read into memory before routing, up to [`MAX_BODY_BYTES`].
//! A larger body is answered with `413 Payload Too Large` and never reaches a
//! handler.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::{App, Router};

/// Largest request body the server will buffer, in bytes.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Remembers `addr`; nothing is bound until [`serve`](Server::serve).
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use tsu_mysql::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Builds `router` and serves it until a shutdown signal arrives and
    /// every in-flight connection has drained.
    ///
    /// Plugin and route errors are returned before the socket is bound.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let app = Arc::new(router.build()?);
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "listening");

        let mut connections = JoinSet::new();
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown wins over queued connections.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = connections.len(), "shutting down, draining connections");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(Arc::clone(&app), stream, peer));
                    }
                    Err(e) => error!("accept error: {e}"),
                },

                // Reap finished tasks so the set stays small.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}

        info!("stopped");
        Ok(())
    }
}

async fn serve_connection(app: Arc<App>, stream: TcpStream, peer: SocketAddr) {
    let svc = service_fn(move |req| dispatch(Arc::clone(&app), req));

    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), svc)
        .await
    {
        error!(%peer, "connection error: {e}");
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads one request off the wire and answers it.
///
/// Never fails: every problem is already a status code by the time hyper
/// gets the response.
async fn dispatch(
    app: Arc<App>,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_owned();

    let body = match read_body(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(status) => {
            warn!(%path, status = status.as_u16(), "request body rejected");
            return Ok(Response::status(status).into_http());
        }
    };

    let method = parts.method.clone();
    let req = Request::new(parts.method, path.as_str())
        .with_headers(parts.headers)
        .with_body(body);

    let resp = app.dispatch(req).await;
    debug!(
        %method,
        %path,
        status = resp.status_code().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request finished",
    );
    Ok(resp.into_http())
}

/// Buffers `body`, stopping as soon as it grows past `limit` bytes.
///
/// Fails with `413` for an oversized body and `400` for one that could not be
/// read.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, StatusCode>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(StatusCode::PAYLOAD_TOO_LARGE)
        }
        Err(e) => {
            debug!("failed to read request body: {e}");
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Completes on SIGTERM or Ctrl-C (only Ctrl-C off Unix). A signal that
/// cannot be listened for is logged and simply never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
