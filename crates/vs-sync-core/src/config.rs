use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_POLL_RETRY_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    /// Delay before the next cycle after one that failed.
    pub poll_retry_interval: Duration,
    /// Upper bound on `Keyring::set_signer_network`; unbounded when `None`.
    pub signer_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_retry_interval: DEFAULT_POLL_RETRY_INTERVAL,
            signer_timeout: None,
        }
    }
}
