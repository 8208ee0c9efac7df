use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use encrypted_ledger::config::{load_config, Config, ConfigFormat};
use encrypted_ledger::logging::{self, LogFormat};
use encrypted_ledger::storage::{FsKeyStore, SqliteStore};
use encrypted_ledger::transport::HttpTransport;
use encrypted_ledger::{http, ContextDirectory, KeyCustodian, LocalLedgerClient};

/// Trusted custodian: holds the secret key, encrypts deposits and decrypts
/// balances returned by the cloud aggregator.
#[derive(Parser, Debug)]
#[command(name = "ledger-local")]
struct Args {
    /// TOML or YAML configuration file; built-in defaults when omitted.
    #[arg(long, env = "LEDGER_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ConfigFormat::Auto)]
    config_format: ConfigFormat,

    /// Overrides `local.listen`.
    #[arg(long, env = "LEDGER_LOCAL_LISTEN")]
    listen: Option<SocketAddr>,

    /// Overrides `local.cloud-url`.
    #[arg(long, env = "LEDGER_CLOUD_URL")]
    cloud_url: Option<String>,

    /// Overrides `local.key-dir`.
    #[arg(long, env = "LEDGER_KEY_DIR")]
    key_dir: Option<PathBuf>,

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
        config.local.listen = listen;
    }
    if let Some(cloud_url) = args.cloud_url {
        config.local.cloud_url = cloud_url;
    }
    if let Some(key_dir) = args.key_dir {
        config.local.key_dir = key_dir;
    }
    config.validate()?;
    logging::init(
        &config.logging.filter,
        args.log_format.unwrap_or(config.logging.format),
    )?;

    let keys = FsKeyStore::open(&config.local.key_dir)
        .with_context(|| format!("open key dir {}", config.local.key_dir.display()))?;
    let params = config.crypto;
    let custodian = tokio::task::spawn_blocking(move || KeyCustodian::ensure_key_pair(&keys, &params))
        .await
        .context("key custodian task")?
        .context("load or generate key pair")?;

    let contexts = Arc::new(
        SqliteStore::open(&config.local.database)
            .with_context(|| format!("open {}", config.local.database.display()))?,
    );
    let transport = HttpTransport::new(&config.local.cloud_url, config.local.request_timeout())?;
    let client = LocalLedgerClient::new(
        Arc::new(custodian),
        Arc::new(ContextDirectory::new(contexts)),
        Arc::new(transport),
    );

    let listener = tokio::net::TcpListener::bind(config.local.listen)
        .await
        .with_context(|| format!("bind {}", config.local.listen))?;
    tracing::info!(
        listen = %config.local.listen,
        cloud = %config.local.cloud_url,
        "local ledger starting"
    );
    http::serve(listener, http::local_router(client)).await?;
    tracing::info!("local ledger stopped");
    Ok(())
}
