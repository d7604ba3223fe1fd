//! Process configuration read from the environment.
//!
//! Parsing goes through a lookup function so callers decide where values
//! come from; `from_env` reads the process environment after `.env` has been
//! loaded by `main`.

use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::net::SocketAddr;

use crate::storage::{BackendKind, ConnectionConfig};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_APP_NAME: &str = "config-governor";
pub const DEFAULT_TABLE: &str = "allconfig";
pub const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub log_level: String,
    pub app_name: String,
    pub default_table: String,
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = non_empty(&lookup, "BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        let bind_address = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid BIND_ADDRESS: {bind}"))?;

        let config = Self {
            bind_address,
            log_level: non_empty(&lookup, "LOG_LEVEL")
                .unwrap_or_else(|| "info".to_string())
                .to_lowercase(),
            app_name: non_empty(&lookup, "APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            default_table: non_empty(&lookup, "DEFAULT_TABLE")
                .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            bail!("app name cannot be empty");
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            bail!(
                "invalid log level: {}, must be one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            );
        }
        crate::storage::dialect::validate_identifier(&self.default_table)
            .context("invalid DEFAULT_TABLE")?;
        Ok(())
    }
}

/// Named backend descriptors configured for this process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorDirectory {
    descriptors: BTreeMap<String, ConnectionConfig>,
}

impl ConnectorDirectory {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// A descriptor is present when its `<PREFIX>_HOST` is set
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut directory = Self::default();
        for (name, prefix, kind) in [
            ("mysql", "MYSQL", BackendKind::MySql),
            ("postgresql", "POSTGRES", BackendKind::Postgres),
            ("mongodb", "MONGO", BackendKind::MongoDb),
        ] {
            let Some(host) = non_empty(&lookup, &format!("{prefix}_HOST")) else {
                continue;
            };
            let port = match non_empty(&lookup, &format!("{prefix}_PORT")) {
                Some(raw) => raw
                    .parse::<u16>()
                    .with_context(|| format!("invalid {prefix}_PORT: {raw}"))?,
                None => kind.default_port(),
            };
            let database = non_empty(&lookup, &format!("{prefix}_DATABASE")).unwrap_or_default();
            let mut config = ConnectionConfig::new(kind, host, port, database);
            config.username = non_empty(&lookup, &format!("{prefix}_USERNAME"));
            config.password = lookup(&format!("{prefix}_PASSWORD"));
            if kind == BackendKind::Postgres {
                config.ssl_mode = Some(
                    non_empty(&lookup, "POSTGRES_SSLMODE").unwrap_or_else(|| "disable".to_string()),
                );
            }
            directory.insert(name, config);
        }
        Ok(directory)
    }

    pub fn insert(&mut self, name: impl Into<String>, config: ConnectionConfig) {
        self.descriptors.insert(name.into(), config);
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionConfig> {
        self.descriptors.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConnectionConfig)> {
        self.descriptors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }
}
