use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use server::config::{ConnectorDirectory, ServerConfig};
use server::http::{self, AppState};
use server::storage::{Connector, ConnectorFactory, DriverConnectorFactory, StoreError, deadline};
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Run the HTTP API
    Serve,
    /// Probe every configured backend and exit
    Check,
}

/// Config store with maker-checker governance over MySQL, PostgreSQL and MongoDB
#[derive(Parser, Debug)]
#[command(name = "config-governor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Address to listen on, overrides BIND_ADDRESS
    #[arg(long)]
    bind: Option<SocketAddr>,

    #[arg(long, value_enum, default_value_t = Mode::Serve)]
    mode: Mode,
}

async fn check_backends(factory: &dyn ConnectorFactory) -> Result<()> {
    let directory = ConnectorDirectory::from_env()?;
    if directory.is_empty() {
        warn!("No backends configured; set MYSQL_HOST, POSTGRES_HOST or MONGO_HOST");
        return Ok(());
    }

    let mut failed = Vec::new();
    for (name, config) in directory.iter() {
        let result = async {
            let mut connector = factory.create(config)?;
            deadline::within(deadline::READ, connector.connect()).await?;
            let alive = connector.is_connected().await;
            connector.close().await?;
            Ok::<_, StoreError>(alive)
        }
        .await;

        match result {
            Ok(true) => info!(backend = name, host = %config.host, "Backend reachable"),
            Ok(false) => {
                warn!(backend = name, host = %config.host, "Backend connected but did not answer ping");
                failed.push(name.to_string());
            }
            Err(err) => {
                error!(backend = name, host = %config.host, error = %err, "Backend unreachable");
                failed.push(name.to_string());
            }
        }
    }

    if !failed.is_empty() {
        bail!("unreachable backends: {}", failed.join(", "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = ServerConfig::from_env()?;
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }

    // RUST_LOG wins over LOG_LEVEL
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(app = %config.app_name, mode = ?cli.mode, "Starting");

    let factory = Arc::new(DriverConnectorFactory);
    match cli.mode {
        Mode::Check => check_backends(factory.as_ref()).await,
        Mode::Serve => {
            let state = AppState::new(factory, config.app_name, config.default_table);
            http::start_server(state, config.bind_address).await
        }
    }
}
