//! The single shared wallet record and the handle every component commits through.
//!
//! The lock is a plain `std::sync::RwLock`: closures passed to [`Vault::read`] and the
//! commit methods are synchronous, so it is never held across an await.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use vs_api_types::{
    Account, AccountKeys, AccountRef, AccountType, ChainFamily, Network, NetworkRegistry,
};

use crate::SyncOutcome;
use crate::cancellable::CancelToken;

/// A dapp asked to use a different account than the one it is connected with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAccountChange {
    pub host: String,
    pub new_account: AccountRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultState {
    pub accounts: BTreeMap<AccountType, BTreeMap<u32, Account>>,
    pub active_account: AccountRef,
    pub active_network: Network,
    pub active_chain: ChainFamily,
    pub is_bitcoin_based: bool,
    pub networks: NetworkRegistry,
    /// Transient; a restarted service never resumes mid-switch.
    #[serde(skip)]
    pub is_network_changing: bool,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub changing_connected_account: Option<PendingAccountChange>,
}

impl VaultState {
    pub fn new(networks: NetworkRegistry, active_network: Network) -> Self {
        Self {
            accounts: BTreeMap::new(),
            active_account: AccountRef::new(AccountType::HdAccount, 0),
            active_chain: active_network.kind,
            is_bitcoin_based: active_network.kind.is_bitcoin_based(),
            active_network,
            networks,
            is_network_changing: false,
            error: false,
            changing_connected_account: None,
        }
    }

    pub fn account(&self, account: AccountRef) -> Option<&Account> {
        self.accounts
            .get(&account.account_type)
            .and_then(|by_id| by_id.get(&account.id))
    }

    pub fn account_mut(&mut self, account: AccountRef) -> Option<&mut Account> {
        self.accounts
            .get_mut(&account.account_type)
            .and_then(|by_id| by_id.get_mut(&account.id))
    }

    pub fn active(&self) -> Option<&Account> {
        self.account(self.active_account)
    }

    pub fn active_mut(&mut self) -> Option<&mut Account> {
        self.account_mut(self.active_account)
    }

    pub fn iter_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values().flat_map(|by_id| by_id.values())
    }

    pub fn insert_account(&mut self, account: Account) {
        self.accounts
            .entry(account.account_type)
            .or_default()
            .insert(account.id, account);
    }

    pub fn remove_account(&mut self, account: AccountRef) -> Option<Account> {
        let by_id = self.accounts.get_mut(&account.account_type)?;
        let removed = by_id.remove(&account.id);
        if by_id.is_empty() {
            self.accounts.remove(&account.account_type);
        }
        removed
    }

    /// Every account goes back to "not fetched"; stale values from the
    /// previous network must never render as the new network's balance.
    pub fn clear_balances(&mut self) {
        for by_id in self.accounts.values_mut() {
            for account in by_id.values_mut() {
                account.balances.clear();
            }
        }
    }

    /// Folds freshly derived identities into the stored accounts, creating any
    /// the vault has not seen yet.
    pub fn merge_account_keys(&mut self, keys: &[AccountKeys]) {
        for key in keys {
            match self.account_mut(key.account) {
                Some(account) => {
                    if !key.address.is_empty() {
                        account.address = key.address.clone();
                    }
                    if !key.xpub.is_empty() {
                        account.xpub = key.xpub.clone();
                    }
                }
                None => {
                    let label = format!("Account {}", key.account.id + 1);
                    self.insert_account(Account::new(key.account, label, &key.address, &key.xpub));
                }
            }
        }
    }
}

struct VaultInner {
    state: RwLock<VaultState>,
    revision: watch::Sender<u64>,
}

/// Cloneable handle to the shared [`VaultState`].
#[derive(Clone)]
pub struct Vault {
    inner: Arc<VaultInner>,
}

impl Vault {
    pub fn new(state: VaultState) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(VaultInner {
                state: RwLock::new(state),
                revision,
            }),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&VaultState) -> R) -> R {
        let guard = self.read_guard();
        f(&*guard)
    }

    pub fn snapshot(&self) -> VaultState {
        self.read(VaultState::clone)
    }

    /// Applies `f` in one write and publishes a new revision.
    pub fn commit<R>(&self, f: impl FnOnce(&mut VaultState) -> R) -> R {
        let result = {
            let mut guard = self.write_guard();
            f(&mut *guard)
        };
        self.bump();
        result
    }

    /// Commits the result of a fetch. Nothing is written when `token` has been
    /// cancelled, a network switch is underway, or the active network is no
    /// longer the one the data was fetched for. The revision moves only when
    /// `f` reports `Committed`.
    pub fn commit_fetched(
        &self,
        token: &CancelToken,
        fetched_for: &Network,
        f: impl FnOnce(&mut VaultState) -> SyncOutcome,
    ) -> SyncOutcome {
        let outcome = {
            let mut state = self.write_guard();
            if token.is_cancelled()
                || state.is_network_changing
                || !state.active_network.is_same_network(fetched_for)
            {
                return SyncOutcome::Cancelled;
            }
            f(&mut *state)
        };
        if outcome == SyncOutcome::Committed {
            self.bump();
        }
        outcome
    }

    /// Enters the switching state: flag set, every balance cleared.
    pub fn begin_network_change(&self) {
        self.commit(|state| {
            state.is_network_changing = true;
            state.clear_balances();
        });
    }

    /// Commits a finished switch when `token` is still live. Network, family and
    /// `is_bitcoin_based` change together in this single write.
    pub fn commit_network_change(&self, token: &CancelToken, network: &Network, keys: &[AccountKeys]) -> bool {
        let committed = {
            let mut state = self.write_guard();
            if token.is_cancelled() {
                false
            } else {
                state.active_network = network.clone();
                state.active_chain = network.kind;
                state.is_bitcoin_based = network.kind.is_bitcoin_based();
                state.merge_account_keys(keys);
                state.clear_balances();
                state.is_network_changing = false;
                true
            }
        };
        if committed {
            self.bump();
        }
        committed
    }

    /// Leaves the switching state without changing network. Balances stay at
    /// `NoData` until the next fetch.
    pub fn abort_network_change(&self) {
        self.commit(|state| state.is_network_changing = false);
    }

    pub fn fail_network_change(&self) {
        self.commit(|state| {
            state.error = true;
            state.is_network_changing = false;
        });
    }

    /// Receiver that observes every committed revision.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    fn bump(&self) {
        self.inner.revision.send_modify(|revision| *revision += 1);
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, VaultState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, VaultState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
