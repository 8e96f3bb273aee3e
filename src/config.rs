use crate::error::TransferError;
use clap::Parser;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Development-only signing secret; startup warns when it is in effect.
pub const DEFAULT_JWT_SECRET: &str = "YOUR_REPLACE_ME_SUPER_SECRET_KEY";

pub const DEFAULT_DATA_ROOT: &str = "data_files";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Address the HTTP server listens on
    #[arg(long, env = "CHBRIDGE_BIND", default_value = "0.0.0.0:5000")]
    pub bind: String,

    /// Shared secret used to verify HS256 bearer tokens
    #[arg(long, env = "JWT_SECRET_KEY", default_value = DEFAULT_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: String,

    /// Directory all caller-supplied file paths are resolved against
    #[arg(long, env = "CHBRIDGE_DATA_ROOT", default_value = DEFAULT_DATA_ROOT)]
    pub data_root: PathBuf,

    /// Seconds to wait for a TCP connection to ClickHouse
    #[arg(long, env = "CHBRIDGE_CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout: u64,
}

/// Immutable process-wide settings, built once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub jwt_secret: String,
    pub data_root: PathBuf,
    pub connect_timeout: Duration,
}

impl ServiceConfig {
    pub fn from_args(args: &CliArgs) -> Result<Self, TransferError> {
        let bind = args.bind.trim().parse::<SocketAddr>().map_err(|e| {
            TransferError::Config(format!("Invalid bind address '{}': {}", args.bind, e))
        })?;

        let config = Self {
            bind,
            jwt_secret: args.jwt_secret.clone(),
            data_root: args.data_root.clone(),
            connect_timeout: Duration::from_secs(args.connect_timeout),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(TransferError::Config(
                "JWT secret must not be empty".to_string(),
            ));
        }
        if self.data_root.as_os_str().is_empty() {
            return Err(TransferError::Config(
                "Data root directory must not be empty".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(TransferError::Config(
                "Connect timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    /// Creates the data root if it does not exist yet.
    pub fn prepare_data_root(&self) -> Result<(), TransferError> {
        fs::create_dir_all(&self.data_root).map_err(|e| {
            TransferError::Config(format!(
                "Failed to create data directory '{}': {}",
                self.data_root.display(),
                e
            ))
        })?;
        log::info!(
            "Allowed base directory for file operations: {}",
            self.data_root.display()
        );
        Ok(())
    }
}
