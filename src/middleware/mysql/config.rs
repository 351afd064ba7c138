//! Connection settings: plugin defaults, environment loading and per-route
//! overlays.

use std::fmt;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::Converters;

/// Everything needed to open a connection and run one request's unit of work.
///
/// The option names of the classic Bottle plugin (`dbhost`, `dbuser`,
/// `dbpass`, `dbname`, `dbunixsocket`, `dictrows`, ...) are accepted as
/// aliases wherever a config is deserialized.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    #[serde(alias = "dbhost")]
    pub host: String,
    #[serde(alias = "dbport")]
    pub port: u16,
    /// Unix socket path. When set, `host` and `port` are ignored.
    #[serde(alias = "dbunixsocket")]
    pub socket: Option<PathBuf>,
    #[serde(alias = "dbuser")]
    pub user: Option<String>,
    #[serde(alias = "dbpass", skip_serializing)]
    pub password: Option<SecretString>,
    #[serde(alias = "dbname")]
    pub database: Option<String>,
    #[serde(alias = "dbcharset")]
    pub charset: String,
    /// Session time zone, e.g. `"+00:00"`, set right after connecting.
    pub timezone: Option<String>,
    /// Commit after the handler succeeds (or raises a response signal).
    pub autocommit: bool,
    /// Rows as column-name maps instead of positional sequences.
    #[serde(alias = "dictrows")]
    pub result_as_mapping: bool,
    /// Name of the handler argument the cursor is bound to.
    pub keyword: String,
    #[serde(skip)]
    pub converters: Option<Converters>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            socket: None,
            user: None,
            password: None,
            database: None,
            charset: "utf8mb4".to_string(),
            timezone: None,
            autocommit: true,
            result_as_mapping: true,
            keyword: "db".to_string(),
            converters: None,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from the environment, on top of the defaults.
    ///
    /// A `.env` file is read first when present. Variables are named
    /// `{PREFIX}__{FIELD}`, e.g. `MYSQL__HOST` or `MYSQL__AUTOCOMMIT=false`.
    pub fn load(prefix: &str) -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_environment(environment(prefix))
    }

    fn from_environment(env: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket = Some(path.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn autocommit(mut self, on: bool) -> Self {
        self.autocommit = on;
        self
    }

    pub fn result_as_mapping(mut self, on: bool) -> Self {
        self.result_as_mapping = on;
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }

    pub fn converters(mut self, converters: Converters) -> Self {
        self.converters = Some(converters);
        self
    }

    /// Where connections go: the socket if one is set, TCP otherwise.
    pub fn target(&self) -> Target<'_> {
        match &self.socket {
            Some(path) => Target::Socket(path),
            None => Target::Tcp { host: &self.host, port: self.port },
        }
    }

    /// A copy of `self` with every field set in `overlay` replaced.
    pub fn merge(&self, overlay: &ConnectionOverlay) -> Self {
        let mut merged = self.clone();
        let o = overlay.clone();

        if let Some(v) = o.host { merged.host = v; }
        if let Some(v) = o.port { merged.port = v; }
        if let Some(v) = o.socket { merged.socket = Some(v); }
        if let Some(v) = o.user { merged.user = Some(v); }
        if let Some(v) = o.password { merged.password = Some(v); }
        if let Some(v) = o.database { merged.database = Some(v); }
        if let Some(v) = o.charset { merged.charset = v; }
        if let Some(v) = o.timezone { merged.timezone = Some(v); }
        if let Some(v) = o.autocommit { merged.autocommit = v; }
        if let Some(v) = o.result_as_mapping { merged.result_as_mapping = v; }
        if let Some(v) = o.keyword { merged.keyword = v; }

        merged
    }
}

/// `{PREFIX}__{FIELD}` variables, read from the process environment.
fn environment(prefix: &str) -> config::Environment {
    config::Environment::with_prefix(prefix)
        .prefix_separator("__")
        .separator("__")
}

// ── Target ────────────────────────────────────────────────────────────────────

/// The endpoint a config connects to. Displays as the socket path or
/// `host:port`, which is what connection errors report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target<'a> {
    Socket(&'a Path),
    Tcp { host: &'a str, port: u16 },
}

impl fmt::Display for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket(path) => write!(f, "{}", path.display()),
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

// ── ConnectionOverlay ─────────────────────────────────────────────────────────

/// Route-level overrides, read from the route's `mysql` configuration.
///
/// Every field is optional; unknown fields are rejected so a typo fails the
/// build instead of silently using the default. Converters cannot be set
/// here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionOverlay {
    #[serde(alias = "dbhost")]
    pub host: Option<String>,
    #[serde(alias = "dbport")]
    pub port: Option<u16>,
    #[serde(alias = "dbunixsocket")]
    pub socket: Option<PathBuf>,
    #[serde(alias = "dbuser")]
    pub user: Option<String>,
    #[serde(alias = "dbpass")]
    pub password: Option<SecretString>,
    #[serde(alias = "dbname")]
    pub database: Option<String>,
    #[serde(alias = "dbcharset")]
    pub charset: Option<String>,
    pub timezone: Option<String>,
    pub autocommit: Option<bool>,
    #[serde(alias = "dictrows")]
    pub result_as_mapping: Option<bool>,
    pub keyword: Option<String>,
}

impl ConnectionOverlay {
    pub fn from_map(fields: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(fields))
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.port.is_none()
            && self.socket.is_none()
            && self.user.is_none()
            && self.password.is_none()
            && self.database.is_none()
            && self.charset.is_none()
            && self.timezone.is_none()
            && self.autocommit.is_none()
            && self.result_as_mapping.is_none()
            && self.keyword.is_none()
    }
}
