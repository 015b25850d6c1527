use anyhow::{Result, anyhow};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, info};
use vs_api_types::{AccountKeys, AccountRef, ChainFamily, Network};

/// What the signer reports after being pointed at a new network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerNetworkSwitch {
    pub success: bool,
    pub active_chain: ChainFamily,
    /// Account identities re-derived for the new network.
    pub wallet: Vec<AccountKeys>,
}

#[async_trait]
pub trait Keyring: Send + Sync {
    async fn set_signer_network(&self, network: &Network) -> Result<SignerNetworkSwitch>;
    fn set_active_account(&self, account: AccountRef) -> Result<()>;
    /// Returns `false` for a wrong password.
    async fn unlock(&self, password: &str) -> Result<bool>;
    fn lock(&self);
    fn is_unlocked(&self) -> bool;

    fn is_testnet(&self, network: &Network) -> bool {
        network.is_testnet()
    }
}

/// Watch-only identity the local keyring hands out. UTXO networks pick the
/// extended public key registered for their `slip44` coin type.
#[derive(Debug, Clone)]
pub struct WatchOnlyAccount {
    pub account: AccountRef,
    pub address: String,
    pub xpubs: BTreeMap<u32, String>,
}

impl WatchOnlyAccount {
    pub fn new(account: AccountRef, address: impl Into<String>) -> Self {
        Self {
            account,
            address: address.into(),
            xpubs: BTreeMap::new(),
        }
    }

    pub fn with_xpub(mut self, slip44: u32, xpub: impl Into<String>) -> Self {
        self.xpubs.insert(slip44, xpub.into());
        self
    }

    fn keys_for(&self, network: &Network) -> AccountKeys {
        let xpub = match network.slip44 {
            Some(coin) => self.xpubs.get(&coin),
            None => self.xpubs.values().next(),
        };
        AccountKeys {
            account: self.account,
            address: self.address.clone(),
            xpub: xpub.cloned().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default)]
struct LocalState {
    unlocked: bool,
    active_account: Option<AccountRef>,
    signer_network: Option<(ChainFamily, u64)>,
}

/// Development keyring: password-gated lock state over a fixed set of
/// watch-only accounts. No key material is held.
pub struct LocalKeyring {
    password_digest: [u8; 32],
    accounts: Vec<WatchOnlyAccount>,
    state: Mutex<LocalState>,
}

impl LocalKeyring {
    pub fn new(password: &str, accounts: Vec<WatchOnlyAccount>) -> Result<Self> {
        if password.trim().is_empty() {
            return Err(anyhow!("keyring password cannot be empty"));
        }
        Ok(Self {
            password_digest: digest(password),
            accounts,
            state: Mutex::new(LocalState::default()),
        })
    }

    pub fn active_account(&self) -> Option<AccountRef> {
        self.with_state(|state| state.active_account)
    }

    pub fn signer_network(&self) -> Option<(ChainFamily, u64)> {
        self.with_state(|state| state.signer_network)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LocalState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

fn digest(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"vaultsync:keyring:v1:");
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

#[async_trait]
impl Keyring for LocalKeyring {
    async fn set_signer_network(&self, network: &Network) -> Result<SignerNetworkSwitch> {
        let wallet: Vec<AccountKeys> = self
            .accounts
            .iter()
            .map(|account| account.keys_for(network))
            .collect();

        if network.kind.is_bitcoin_based() && wallet.iter().any(|keys| keys.xpub.is_empty()) {
            debug!(chain_id = network.chain_id, "no extended key registered for network coin type");
            return Ok(SignerNetworkSwitch {
                success: false,
                active_chain: network.kind,
                wallet: Vec::new(),
            });
        }

        self.with_state(|state| state.signer_network = Some((network.kind, network.chain_id)));
        info!(chain_id = network.chain_id, family = %network.kind, "signer network set");
        Ok(SignerNetworkSwitch {
            success: true,
            active_chain: network.kind,
            wallet,
        })
    }

    fn set_active_account(&self, account: AccountRef) -> Result<()> {
        if !self.accounts.iter().any(|known| known.account == account) {
            return Err(anyhow!("keyring has no account {account}"));
        }
        self.with_state(|state| state.active_account = Some(account));
        Ok(())
    }

    async fn unlock(&self, password: &str) -> Result<bool> {
        let matches = digest(password) == self.password_digest;
        self.with_state(|state| state.unlocked = matches || state.unlocked);
        Ok(matches)
    }

    fn lock(&self) {
        self.with_state(|state| state.unlocked = false);
    }

    fn is_unlocked(&self) -> bool {
        self.with_state(|state| state.unlocked)
    }
}
