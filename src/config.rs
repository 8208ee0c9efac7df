use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::logging::LogFormat;
use crate::scheme::CryptoParameters;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConfigFormat {
    Auto,
    Toml,
    Yaml,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format:?} config: {details}")]
    Parse {
        format: ConfigFormat,
        details: String,
    },
    #[error("configuration invalid: {0}")]
    Validation(String),
}

/// Shared by both binaries; each reads its own section.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub crypto: CryptoParameters,
    pub local: LocalSection,
    pub cloud: CloudSection,
    pub logging: LoggingSection,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct LocalSection {
    pub listen: SocketAddr,
    pub cloud_url: String,
    pub database: PathBuf,
    pub key_dir: PathBuf,
    pub request_timeout_ms: u64,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 5000)),
            cloud_url: "http://127.0.0.1:5001".into(),
            database: PathBuf::from("local_contexts.db"),
            key_dir: PathBuf::from("keys"),
            request_timeout_ms: 10_000,
        }
    }
}

impl LocalSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CloudSection {
    pub listen: SocketAddr,
    pub database: PathBuf,
}

impl Default for CloudSection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 5001)),
            database: PathBuf::from("transactions.db"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingSection {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.crypto
            .validate()
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        Url::parse(&self.local.cloud_url).map_err(|err| {
            ConfigError::Validation(format!("local.cloud-url {:?}: {err}", self.local.cloud_url))
        })?;
        if self.local.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "local.request-timeout-ms must be greater than zero".into(),
            ));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Validation("logging.filter must not be empty".into()));
        }
        Ok(())
    }

    pub fn sample() -> Self {
        Self {
            crypto: CryptoParameters::default(),
            local: LocalSection {
                key_dir: PathBuf::from("var/keys"),
                database: PathBuf::from("var/local_contexts.db"),
                ..LocalSection::default()
            },
            cloud: CloudSection {
                database: PathBuf::from("var/transactions.db"),
                ..CloudSection::default()
            },
            logging: LoggingSection {
                filter: "encrypted_ledger=debug,tower_http=info".into(),
                format: LogFormat::Pretty,
            },
        }
    }
}

pub fn load_config(path: &Path, format: ConfigFormat) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let format = resolve_format(path, format);
    let config: Config = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&contents).map_err(|err| ConfigError::Parse {
            format,
            details: err.to_string(),
        }),
        ConfigFormat::Toml | ConfigFormat::Auto => {
            toml::from_str(&contents).map_err(|err| ConfigError::Parse {
                format,
                details: err.to_string(),
            })
        }
    }?;
    config.validate()?;
    Ok(config)
}

fn resolve_format(path: &Path, format: ConfigFormat) -> ConfigFormat {
    match format {
        ConfigFormat::Auto => match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        },
        _ => format,
    }
}
