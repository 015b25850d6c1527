use vs_api_types::{AccountRef, ChainFamily};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{account} cannot sign for {family} network {chain_id}")]
    IncompatibleSigner {
        account: AccountRef,
        family: ChainFamily,
        chain_id: u64,
    },
    #[error("network switch failed: {0}")]
    NetworkSwitchFailed(String),
    #[error("unknown account {0}")]
    UnknownAccount(AccountRef),
    #[error("unknown {family} network {chain_id}")]
    UnknownNetwork { family: ChainFamily, chain_id: u64 },
    #[error("the active network cannot be removed")]
    ActiveNetworkRemoval,
    #[error("the active account cannot be removed")]
    ActiveAccountRemoval,
    #[error("{got} transactions cannot be recorded while a {expected} network is active")]
    FamilyMismatch { expected: ChainFamily, got: ChainFamily },
    #[error("transaction {0} not found for the active account")]
    UnknownTransaction(String),
    #[error("invalid keyring password")]
    InvalidPassword,
    #[error("keyring error: {0}")]
    Keyring(#[from] anyhow::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
