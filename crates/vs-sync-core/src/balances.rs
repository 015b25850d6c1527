use tracing::{debug, warn};
use vs_api_types::Balance;
use vs_chain_client::ProviderRegistry;

use crate::cancellable::{TaskSlot, cancellable};
use crate::vault::Vault;
use crate::{FetchTarget, SyncOutcome};

pub struct BalanceSynchronizer {
    vault: Vault,
    providers: ProviderRegistry,
    slot: TaskSlot,
}

impl BalanceSynchronizer {
    pub fn new(vault: Vault, providers: ProviderRegistry) -> Self {
        Self {
            vault,
            providers,
            slot: TaskSlot::new("balances"),
        }
    }

    pub fn slot(&self) -> &TaskSlot {
        &self.slot
    }

    /// Fetches the active account's native balance and stores it when it differs.
    /// On failure the stored value, `NoData` included, is left alone.
    pub async fn sync_active_account(&self) -> SyncOutcome {
        let Some(target) = FetchTarget::capture(&self.vault) else {
            return SyncOutcome::Skipped;
        };
        let provider = match self.providers.require(target.family) {
            Ok(provider) => provider,
            Err(err) => {
                warn!(error = %err, "balance sync skipped");
                return SyncOutcome::failed(&err);
            }
        };

        let vault = self.vault.clone();
        let task = cancellable(|token| async move {
            let fetched = match provider.fetch_balance(&target.identity, &target.network).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    warn!(chain_id = target.network.chain_id, error = %err, "balance fetch failed; keeping stored value");
                    return SyncOutcome::failed(&err);
                }
            };
            let Ok(amount) = fetched.trim().parse::<f64>() else {
                warn!(chain_id = target.network.chain_id, value = %fetched, "provider returned a non-numeric balance");
                return SyncOutcome::Failed { rate_limited: false };
            };

            vault.commit_fetched(&token, &target.network, |state| {
                let Some(account) = state.account_mut(target.account) else {
                    return SyncOutcome::Unchanged;
                };
                if !account.balances.get(target.family).differs_from(amount) {
                    return SyncOutcome::Unchanged;
                }
                account.balances.set(target.family, Balance::from(amount));
                SyncOutcome::Committed
            })
        });
        self.slot.install(task.handle());

        let outcome = task.join().await.unwrap_or(SyncOutcome::Cancelled);
        debug!(?outcome, "balance sync settled");
        outcome
    }
}
