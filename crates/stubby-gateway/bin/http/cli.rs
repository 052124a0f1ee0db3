use clap::{Parser, ValueEnum};
use std::fmt::{Display, Formatter};
use std::time::Duration;
use stubby_shortener::DeletionConfig;

pub const SERVER_ADDRESS_ENV: &str = "SERVER_ADDRESS";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const SECRET_KEY_ENV: &str = "SECRET_KEY";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const STORAGE_BACKEND_ENV: &str = "STUBBY_STORAGE_BACKEND";
pub const DELETE_FLUSH_INTERVAL_ENV: &str = "STUBBY_DELETE_FLUSH_INTERVAL_MS";
pub const DELETE_MAX_BATCH_SIZE_ENV: &str = "STUBBY_DELETE_MAX_BATCH_SIZE";
pub const LOG_FORMAT_ENV: &str = "STUBBY_LOG_FORMAT";

pub const DEFAULT_SERVER_ADDRESS: &str = "localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "stubby")]
pub struct CLI {
    /// Address to listen on. An `http://` prefix is accepted and ignored.
    #[arg(short = 'a', long, env = SERVER_ADDRESS_ENV, default_value = DEFAULT_SERVER_ADDRESS)]
    pub server_address: String,

    /// Prefix of the returned short URLs. Defaults to `http://{server_address}`.
    #[arg(short = 'b', long, env = BASE_URL_ENV)]
    pub base_url: Option<String>,

    /// Session signing secret. Only the first 16 bytes are used.
    #[arg(short = 's', long, env = SECRET_KEY_ENV, hide_env_values = true)]
    pub secret_key: String,

    #[arg(short = 'd', long, env = DATABASE_DSN_ENV, hide_env_values = true)]
    pub database_dsn: Option<String>,

    /// Storage backend. Inferred from `--database-dsn` when omitted.
    #[arg(long, env = STORAGE_BACKEND_ENV, value_enum)]
    pub storage: Option<StorageBackendArg>,

    #[arg(
        long,
        env = DELETE_FLUSH_INTERVAL_ENV,
        default_value_t = 5000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub delete_flush_interval_ms: u64,

    #[arg(
        long,
        env = DELETE_MAX_BATCH_SIZE_ENV,
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub delete_max_batch_size: u64,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl CLI {
    pub fn listen_addr(&self) -> &str {
        let address = self.server_address.as_str();
        address
            .strip_prefix("http://")
            .unwrap_or(address)
            .trim_end_matches('/')
    }

    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(base_url) => base_url.clone(),
            None => format!("http://{}", self.listen_addr()),
        }
    }

    pub fn storage_backend(&self) -> StorageBackendArg {
        match (self.storage, &self.database_dsn) {
            (Some(storage), _) => storage,
            (None, Some(_)) => StorageBackendArg::Postgres,
            (None, None) => StorageBackendArg::InMemory,
        }
    }

    pub fn deletion_config(&self) -> DeletionConfig {
        DeletionConfig::builder()
            .flush_interval(Duration::from_millis(self.delete_flush_interval_ms))
            .max_batch_size(self.delete_max_batch_size as usize)
            .build()
    }
}
