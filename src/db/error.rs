//! Database error type.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum DbError {
    /// The connection could not be established (bad host, missing socket,
    /// refused credentials). Surfaced unchanged to the caller.
    #[error("cannot connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: BoxError,
    },

    /// A constraint rejected the statement: duplicate key, foreign key,
    /// NOT NULL or CHECK. Triggers a rollback.
    #[error("integrity violation: {message}")]
    Integrity {
        /// SQLSTATE, e.g. "23000"
        code: Option<String>,
        message: String,
    },

    #[error("database error: {message}")]
    Query { code: Option<String>, message: String },

    /// The cursor outlived the request that created it.
    #[error("connection is closed")]
    Closed,

    #[error("driver error: {0}")]
    Driver(String),
}

impl DbError {
    pub fn connect(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connect { target: target.into(), source: source.into() }
    }

    pub fn integrity(code: Option<String>, message: impl Into<String>) -> Self {
        Self::Integrity { code, message: message.into() }
    }

    pub fn query(code: Option<String>, message: impl Into<String>) -> Self {
        Self::Query { code, message: message.into() }
    }

    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }

    /// The SQLSTATE reported by the server, when there is one.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Integrity { code, .. } | Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// SQLSTATE class 23 is "integrity constraint violation".
fn is_integrity_state(code: Option<&str>) -> bool {
    code.is_some_and(|c| c.starts_with("23"))
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                let message = db_err.message().to_owned();
                let constraint = matches!(
                    db_err.kind(),
                    sqlx::error::ErrorKind::UniqueViolation
                        | sqlx::error::ErrorKind::ForeignKeyViolation
                        | sqlx::error::ErrorKind::NotNullViolation
                        | sqlx::error::ErrorKind::CheckViolation
                );
                if constraint || is_integrity_state(code.as_deref()) {
                    Self::Integrity { code, message }
                } else {
                    Self::Query { code, message }
                }
            }
            other => Self::Driver(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_class_23_is_integrity() {
        assert!(is_integrity_state(Some("23000")));
        assert!(is_integrity_state(Some("23505")));
        assert!(!is_integrity_state(Some("42S02")));
        assert!(!is_integrity_state(None));
    }

    #[test]
    fn connect_error_names_its_target() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = DbError::connect("/not_exists.sock", io);
        assert!(err.to_string().contains("/not_exists.sock"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn non_database_sqlx_errors_become_driver_errors() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::Driver(_)));
        assert!(!err.is_integrity_violation());
    }

    #[test]
    fn sql_state_is_exposed() {
        let err = DbError::integrity(Some("23000".into()), "Duplicate entry 'a' for key 'name'");
        assert_eq!(err.sql_state(), Some("23000"));
        assert_eq!(DbError::Closed.sql_state(), None);
    }
}
