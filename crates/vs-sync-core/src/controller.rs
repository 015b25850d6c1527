use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use vs_api_types::{
    Account, AccountRef, AccountSummary, ChainFamily, Network, TransactionBatch, VaultSummaryResponse,
};
use vs_chain_client::ProviderRegistry;
use vs_keyring::Keyring;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::EventBroadcaster;
use crate::network::{NetworkSwitcher, SwitchOutcome};
use crate::polling::Poller;
use crate::transactions::merge_batch;
use crate::vault::{PendingAccountChange, Vault};
use crate::Synchronizers;

/// Facade over the vault, synchronizers, switcher and poller.
pub struct SyncController {
    vault: Vault,
    keyring: Arc<dyn Keyring>,
    events: EventBroadcaster,
    syncs: Arc<Synchronizers>,
    switcher: NetworkSwitcher,
    poller: Arc<Poller>,
}

impl SyncController {
    pub fn new(
        vault: Vault,
        keyring: Arc<dyn Keyring>,
        providers: ProviderRegistry,
        events: EventBroadcaster,
        config: SyncConfig,
    ) -> Self {
        let syncs = Arc::new(Synchronizers::new(vault.clone(), providers));
        let switcher = NetworkSwitcher::new(
            vault.clone(),
            keyring.clone(),
            syncs.clone(),
            events.clone(),
            config.signer_timeout,
        );
        let poller = Arc::new(Poller::new(vault.clone(), syncs.clone(), config));
        Self {
            vault,
            keyring,
            events,
            syncs,
            switcher,
            poller,
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    pub fn poller(&self) -> Arc<Poller> {
        self.poller.clone()
    }

    pub fn synchronizers(&self) -> &Arc<Synchronizers> {
        &self.syncs
    }

    /// Resolves `(family, chain_id)` against the registry and switches to it.
    pub async fn switch_network(&self, family: ChainFamily, chain_id: u64) -> SyncResult<SwitchOutcome> {
        let network = self
            .vault
            .read(|state| state.networks.get(family, chain_id).cloned())
            .ok_or(SyncError::UnknownNetwork { family, chain_id })?;
        self.switcher.switch_network(network).await
    }

    /// Abandons a pending switch and stays on the committed network.
    pub fn cancel_network_switch(&self) -> bool {
        self.switcher.cancel()
    }

    /// Switches the active account. When a dapp on `host` is connected with a
    /// different address, the change is parked as pending instead and `false`
    /// is returned.
    pub fn set_active_account(
        &self,
        account: AccountRef,
        host: Option<String>,
        connected_address: Option<String>,
    ) -> SyncResult<bool> {
        let address = self
            .vault
            .read(|state| state.account(account).map(|found| found.address.clone()))
            .ok_or(SyncError::UnknownAccount(account))?;

        if let (Some(host), Some(connected)) = (host, connected_address) {
            if !connected.eq_ignore_ascii_case(&address) {
                info!(%host, %account, "connected dapp uses another account; change pending");
                self.vault.commit(|state| {
                    state.changing_connected_account = Some(PendingAccountChange {
                        host,
                        new_account: account,
                    });
                });
                return Ok(false);
            }
        }

        self.keyring.set_active_account(account)?;
        self.vault.commit(|state| {
            state.active_account = account;
            state.changing_connected_account = None;
        });
        self.events.accounts_changed(vec![address]);
        self.refresh_active_account();
        Ok(true)
    }

    pub fn resolve_account_conflict(&self) {
        self.vault.commit(|state| state.changing_connected_account = None);
    }

    /// Kicks the three synchronizers for the active account. Returns `false`
    /// when skipped because a switch is underway or the account has no address.
    pub fn refresh_active_account(&self) -> bool {
        let ready = self.vault.read(|state| {
            !state.is_network_changing && state.active().is_some_and(|active| !active.address.is_empty())
        });
        if !ready {
            debug!("refresh skipped");
            return false;
        }
        self.syncs.spawn_all();
        true
    }

    pub async fn unlock(&self, password: &str) -> SyncResult<()> {
        if !self.keyring.unlock(password).await? {
            return Err(SyncError::InvalidPassword);
        }
        self.events.lock_state_changed(Vec::new(), self.keyring.is_unlocked());
        Ok(())
    }

    pub fn lock(&self) {
        self.keyring.lock();
        self.events.lock_state_changed(Vec::new(), self.keyring.is_unlocked());
    }

    pub fn is_unlocked(&self) -> bool {
        self.keyring.is_unlocked()
    }

    pub fn resolve_error(&self) {
        self.vault.commit(|state| state.error = false);
    }

    /// Adds a network or replaces the one with the same family and chain id.
    /// Editing the active network updates it in place.
    pub fn upsert_network(&self, network: Network) -> Option<Network> {
        self.vault.commit(|state| {
            if state.active_network.kind == network.kind && state.active_network.chain_id == network.chain_id {
                state.active_network = network.clone();
            }
            state.networks.insert(network)
        })
    }

    pub fn remove_network(&self, family: ChainFamily, chain_id: u64) -> SyncResult<Network> {
        let is_active = self.vault.read(|state| {
            state.active_network.kind == family && state.active_network.chain_id == chain_id
        });
        if is_active {
            return Err(SyncError::ActiveNetworkRemoval);
        }
        self.vault
            .commit(|state| state.networks.remove(family, chain_id))
            .ok_or(SyncError::UnknownNetwork { family, chain_id })
    }

    /// Records transactions the wallet itself just broadcast under the active
    /// account and chain. Entries without a timestamp are stamped now.
    pub fn record_sent_transaction(&self, batch: TransactionBatch) -> SyncResult<()> {
        let now = unix_now();
        let batch = match batch {
            TransactionBatch::Utxo(mut txs) => {
                for tx in txs.iter_mut().filter(|tx| tx.block_time == 0) {
                    tx.block_time = now;
                }
                TransactionBatch::Utxo(txs)
            }
            TransactionBatch::Evm(mut txs) => {
                for tx in txs.iter_mut().filter(|tx| tx.timestamp == 0) {
                    tx.timestamp = now;
                }
                TransactionBatch::Evm(txs)
            }
        };

        self.vault.commit(|state| {
            if batch.family() != state.active_chain {
                return Err(SyncError::FamilyMismatch {
                    expected: state.active_chain,
                    got: batch.family(),
                });
            }
            let chain_id = state.active_network.chain_id;
            let account = state.active_account;
            let active = state.active_mut().ok_or(SyncError::UnknownAccount(account))?;
            merge_batch(&mut active.transactions, chain_id, batch);
            Ok(())
        })
    }

    /// Flags an EVM transaction on the active chain as replaced by a cancel.
    pub fn mark_transaction_canceled(&self, hash: &str) -> SyncResult<()> {
        self.with_active_evm_history(hash, |history, position| history[position].is_canceled = true)
    }

    /// Drops the transaction a speed-up replaced; the replacement arrives through
    /// `record_sent_transaction` or the next sync.
    pub fn mark_transaction_accelerated(&self, old_hash: &str) -> SyncResult<()> {
        self.with_active_evm_history(old_hash, |history, position| {
            history.remove(position);
        })
    }

    fn with_active_evm_history(
        &self,
        hash: &str,
        f: impl FnOnce(&mut Vec<vs_api_types::EvmTransaction>, usize),
    ) -> SyncResult<()> {
        self.vault.commit(|state| {
            let chain_id = state.active_network.chain_id;
            let history = state
                .active_mut()
                .and_then(|active| active.transactions.evm.get_mut(&chain_id))
                .ok_or_else(|| SyncError::UnknownTransaction(hash.to_owned()))?;
            let position = history
                .iter()
                .position(|tx| tx.hash.eq_ignore_ascii_case(hash))
                .ok_or_else(|| SyncError::UnknownTransaction(hash.to_owned()))?;
            f(history, position);
            Ok(())
        })
    }

    /// Removes an account with its assets and history. The active account stays.
    pub fn remove_account(&self, account: AccountRef) -> SyncResult<Account> {
        self.vault.commit(|state| {
            if state.active_account == account {
                return Err(SyncError::ActiveAccountRemoval);
            }
            state.remove_account(account).ok_or(SyncError::UnknownAccount(account))
        })
    }

    pub fn summary(&self) -> VaultSummaryResponse {
        self.vault.read(|state| {
            let chain_id = state.active_network.chain_id;
            VaultSummaryResponse {
                active_account: state.active_account,
                active_network: state.active_network.clone(),
                active_chain: state.active_chain,
                is_bitcoin_based: state.is_bitcoin_based,
                is_network_changing: state.is_network_changing,
                error: state.error,
                accounts: state
                    .iter_accounts()
                    .map(|account| AccountSummary {
                        account: account.account_ref(),
                        label: account.label.clone(),
                        address: account.address.clone(),
                        balances: account.balances,
                        visible_tokens: account.assets.visible_tokens(state.active_chain, chain_id).count(),
                        transactions: account.transactions.count(state.active_chain, chain_id),
                    })
                    .collect(),
            }
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
