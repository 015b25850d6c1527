//! Account and network synchronization for a multi-chain wallet.
//!
//! Everything shares one [`Vault`]. Balance, asset and transaction synchronizers
//! each keep a single live [`TaskSlot`]; the [`NetworkSwitcher`] cancels them all
//! before it touches the vault and re-arms them once a switch commits. The
//! [`Poller`] drives the synchronizers on a timer and [`SyncController`] is the
//! facade the background service talks to.

pub mod assets;
pub mod balances;
pub mod cancellable;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod network;
pub mod polling;
pub mod transactions;
pub mod vault;

#[cfg(test)]
mod testing;

pub use assets::AssetSynchronizer;
pub use balances::BalanceSynchronizer;
pub use cancellable::{CancelHandle, CancelToken, CancellableTask, Cancelled, TaskSlot, cancellable};
pub use config::SyncConfig;
pub use controller::SyncController;
pub use error::{SyncError, SyncResult};
pub use events::{EventBroadcaster, ListenerId};
pub use network::{NetworkSwitcher, SwitchOutcome};
pub use polling::{PollCycle, Poller, PollerHandle};
pub use transactions::{TransactionSynchronizer, merge_transactions};
pub use vault::{PendingAccountChange, Vault, VaultState};

use std::sync::Arc;
use vs_api_types::{AccountRef, ChainFamily, Network};

/// How a single synchronizer run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Committed,
    /// Fetched data matched what is stored.
    Unchanged,
    /// Fetched data looked wrong and was discarded.
    Rejected,
    /// Nothing to do: no active identity, or a switch is underway.
    Skipped,
    Cancelled,
    Failed { rate_limited: bool },
}

impl SyncOutcome {
    pub fn is_failure(self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }

    pub(crate) fn failed(err: &vs_chain_client::ProviderError) -> Self {
        SyncOutcome::Failed {
            rate_limited: err.is_rate_limited(),
        }
    }
}

/// What a synchronizer fetches for, captured from the vault before any await.
#[derive(Debug, Clone)]
pub(crate) struct FetchTarget {
    pub network: Network,
    pub family: ChainFamily,
    pub account: AccountRef,
    pub identity: String,
}

impl FetchTarget {
    pub(crate) fn capture(vault: &Vault) -> Option<Self> {
        vault.read(|state| {
            if state.is_network_changing {
                return None;
            }
            let active = state.active()?;
            let identity = active.identity(state.active_chain);
            if identity.is_empty() {
                return None;
            }
            Some(FetchTarget {
                network: state.active_network.clone(),
                family: state.active_chain,
                account: active.account_ref(),
                identity: identity.to_owned(),
            })
        })
    }
}

/// The three synchronizers as one unit; the orchestrator and poller drive them together.
pub struct Synchronizers {
    pub balances: BalanceSynchronizer,
    pub assets: AssetSynchronizer,
    pub transactions: TransactionSynchronizer,
}

impl Synchronizers {
    pub fn new(vault: Vault, providers: vs_chain_client::ProviderRegistry) -> Self {
        Self {
            balances: BalanceSynchronizer::new(vault.clone(), providers.clone()),
            assets: AssetSynchronizer::new(vault.clone(), providers.clone()),
            transactions: TransactionSynchronizer::new(vault, providers),
        }
    }

    pub fn cancel_all(&self) {
        self.balances.slot().cancel();
        self.assets.slot().cancel();
        self.transactions.slot().cancel();
    }

    /// Runs all three concurrently; each keeps its own single live token.
    pub async fn run_all(&self) -> [SyncOutcome; 3] {
        let (balances, assets, transactions) = tokio::join!(
            self.balances.sync_active_account(),
            self.assets.sync_active_account(),
            self.transactions.sync_active_account(),
        );
        [balances, assets, transactions]
    }

    /// Fire-and-forget variant used after a switch or an account change.
    pub fn spawn_all(self: &Arc<Self>) {
        let syncs = self.clone();
        tokio::spawn(async move {
            let outcomes = syncs.run_all().await;
            tracing::debug!(?outcomes, "background sync finished");
        });
    }
}
