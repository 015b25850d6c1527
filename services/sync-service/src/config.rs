use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use vs_sync_core::SyncConfig;
use vs_sync_core::config::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_RETRY_INTERVAL};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

/// Startup settings, read once from `VAULTSYNC_*` environment variables.
#[derive(Debug, Clone)]
pub(crate) struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub sync: SyncConfig,
    pub http_timeout: Duration,
    /// RocksDB directory for vault snapshots; snapshots stay in memory when unset.
    pub db_path: Option<String>,
    pub keyring_password: String,
    pub watch_address: Option<String>,
    pub watch_xpub: Option<String>,
}

impl ServiceConfig {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty());

        let bind_addr = var("VAULTSYNC_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned())
            .parse()
            .context("VAULTSYNC_BIND_ADDR must be host:port")?;

        let poll_interval = secs(&var, "VAULTSYNC_POLL_INTERVAL_SECS")?.unwrap_or(DEFAULT_POLL_INTERVAL);
        let poll_retry_interval = secs(&var, "VAULTSYNC_POLL_RETRY_SECS")?.unwrap_or(DEFAULT_POLL_RETRY_INTERVAL);
        let signer_timeout = secs(&var, "VAULTSYNC_SIGNER_TIMEOUT_SECS")?;
        let http_timeout = secs(&var, "VAULTSYNC_HTTP_TIMEOUT_SECS")?
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));

        let keyring_password = var("VAULTSYNC_KEYRING_PASSWORD").context("VAULTSYNC_KEYRING_PASSWORD is required")?;

        Ok(Self {
            bind_addr,
            sync: SyncConfig {
                poll_interval,
                poll_retry_interval,
                signer_timeout,
            },
            http_timeout,
            db_path: var("VAULTSYNC_DB_PATH"),
            keyring_password,
            watch_address: var("VAULTSYNC_WATCH_ADDRESS"),
            watch_xpub: var("VAULTSYNC_WATCH_XPUB"),
        })
    }
}

fn secs(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    var(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("{key} must be a whole number of seconds"))
        })
        .transpose()
}
