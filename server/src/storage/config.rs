use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{Result, StoreError};

/// The storage engines a config store can live in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "postgresql")]
    Postgres,
    #[serde(rename = "mongodb")]
    MongoDb,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgresql",
            Self::MongoDb => "mongodb",
        }
    }

    pub fn is_relational(self) -> bool {
        matches!(self, Self::MySql | Self::Postgres)
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
            Self::MongoDb => 27017,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mysql" => Ok(Self::MySql),
            "postgresql" => Ok(Self::Postgres),
            "mongodb" => Ok(Self::MongoDb),
            other => Err(StoreError::validation(format!(
                "unsupported database type: {other}"
            ))),
        }
    }
}

/// Connection descriptor for one backend instance
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    #[serde(rename = "type")]
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub database: String,
    #[serde(default)]
    pub ssl_mode: Option<String>,
}

// Hand-written so the password never reaches a log line
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn new(
        kind: BackendKind,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
            username: None,
            password: None,
            database: database.into(),
            ssl_mode: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_ssl_mode(mut self, ssl_mode: impl Into<String>) -> Self {
        self.ssl_mode = Some(ssl_mode.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(StoreError::validation("host is required"));
        }
        if self.port == 0 {
            return Err(StoreError::validation("port must be between 1 and 65535"));
        }
        if self.database.trim().is_empty() {
            return Err(StoreError::validation("database name is required"));
        }
        if self.kind.is_relational() {
            if self.username.as_deref().is_none_or(str::is_empty) {
                return Err(StoreError::validation(format!(
                    "username is required for {}",
                    self.kind
                )));
            }
            if self.password.is_none() {
                return Err(StoreError::validation(format!(
                    "password is required for {}",
                    self.kind
                )));
            }
        }
        Ok(())
    }

    /// SSL mode for the second relational variant; the first ignores it
    pub fn effective_ssl_mode(&self) -> &str {
        match self.ssl_mode.as_deref() {
            Some(mode) if !mode.is_empty() => mode,
            _ => "disable",
        }
    }

    /// Deterministic connection string in the backend's conventional form
    pub fn connection_string(&self) -> String {
        let username = self.username.as_deref().unwrap_or_default();
        let password = self.password.as_deref().unwrap_or_default();
        match self.kind {
            BackendKind::MySql => format!(
                "{username}:{password}@tcp({}:{})/{}",
                self.host, self.port, self.database
            ),
            BackendKind::Postgres => format!(
                "host={} port={} user={username} password={password} dbname={} sslmode={}",
                self.host,
                self.port,
                self.database,
                self.effective_ssl_mode()
            ),
            BackendKind::MongoDb => match (username.is_empty(), password.is_empty()) {
                (false, false) => format!(
                    "mongodb://{username}:{password}@{}:{}/{}",
                    self.host, self.port, self.database
                ),
                (false, true) => format!(
                    "mongodb://{username}@{}:{}/{}",
                    self.host, self.port, self.database
                ),
                _ => format!("mongodb://{}:{}/{}", self.host, self.port, self.database),
            },
        }
    }
}
