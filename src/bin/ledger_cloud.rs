use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use encrypted_ledger::config::{load_config, Config, ConfigFormat};
use encrypted_ledger::logging::{self, LogFormat};
use encrypted_ledger::storage::SqliteStore;
use encrypted_ledger::{http, CloudLedgerServer};

/// Untrusted aggregator: stores ciphertexts and sums them under encryption.
#[derive(Parser, Debug)]
#[command(name = "ledger-cloud")]
struct Args {
    /// TOML or YAML configuration file; built-in defaults when omitted.
    #[arg(long, env = "LEDGER_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ConfigFormat::Auto)]
    config_format: ConfigFormat,

    /// Overrides `cloud.listen`.
    #[arg(long, env = "LEDGER_CLOUD_LISTEN")]
    listen: Option<SocketAddr>,

    /// Overrides `cloud.database`.
    #[arg(long, env = "LEDGER_CLOUD_DATABASE")]
    database: Option<PathBuf>,

    /// Overrides `logging.format`.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config(path, args.config_format)?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.cloud.listen = listen;
    }
    if let Some(database) = args.database {
        config.cloud.database = database;
    }
    config.validate()?;
    logging::init(
        &config.logging.filter,
        args.log_format.unwrap_or(config.logging.format),
    )?;

    let store = Arc::new(
        SqliteStore::open(&config.cloud.database)
            .with_context(|| format!("open {}", config.cloud.database.display()))?,
    );
    let server = Arc::new(CloudLedgerServer::new(store.clone(), store));

    let listener = tokio::net::TcpListener::bind(config.cloud.listen)
        .await
        .with_context(|| format!("bind {}", config.cloud.listen))?;
    tracing::info!(listen = %config.cloud.listen, database = %config.cloud.database.display(), "cloud ledger starting");
    http::serve(listener, http::cloud_router(server)).await?;
    tracing::info!("cloud ledger stopped");
    Ok(())
}
