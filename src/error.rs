//! Unified error type.

use thiserror::Error;

use crate::db::DbError;

/// The error type returned by tsu's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as
/// [`HttpError`](crate::HttpError) values, not as `Error`s. This type surfaces
/// infrastructure failures: binding a port, a plugin conflict found while the
/// application is assembled, or a database failure nobody handled.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Two installed plugins claim the same resource (e.g. the same
    /// injected argument name). Raised by [`Router::install`](crate::Router::install),
    /// never while serving requests.
    #[error("plugin conflict: {0}")]
    Conflict(String),

    /// A route could not be registered: malformed path or invalid
    /// route-level configuration.
    #[error("invalid route `{path}`: {message}")]
    Route { path: String, message: String },

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    pub(crate) fn route(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Route { path: path.into(), message: message.into() }
    }

    /// True when this is a database constraint violation (unique key,
    /// foreign key, NOT NULL, CHECK).
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::Database(e) if e.is_integrity_violation())
    }
}
