use std::collections::HashMap;
use tracing::{debug, warn};
use vs_api_types::{AccountTransactions, MAX_TRANSACTIONS_PER_CHAIN, TransactionBatch, TransactionRecord};
use vs_chain_client::ProviderRegistry;

use crate::cancellable::{TaskSlot, cancellable};
use crate::vault::{Vault, VaultState};
use crate::{FetchTarget, SyncOutcome};

/// Merges `fetched` into `stored`: one entry per identity (case-insensitive),
/// higher confirmation count wins and `fetched` wins ties. Display noise is
/// dropped after merging, then the newest 30 are kept, newest first.
pub fn merge_transactions<T>(fetched: Vec<T>, stored: &[T]) -> Vec<T>
where
    T: TransactionRecord + Clone,
{
    let mut merged: Vec<T> = Vec::with_capacity(fetched.len() + stored.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for tx in fetched.into_iter().chain(stored.iter().cloned()) {
        let key = tx.identity_key();
        match positions.get(&key) {
            Some(&position) => {
                if tx.confirmations() > merged[position].confirmations() {
                    merged[position] = tx;
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(tx);
            }
        }
    }

    merged.retain(|tx| !tx.is_display_noise());
    merged.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    merged.truncate(MAX_TRANSACTIONS_PER_CHAIN);
    merged
}

fn merge_into<T>(lists: &mut std::collections::BTreeMap<u64, Vec<T>>, chain_id: u64, fetched: Vec<T>) -> bool
where
    T: TransactionRecord + Clone + PartialEq,
{
    let stored = lists.get(&chain_id).map(Vec::as_slice).unwrap_or_default();
    let merged = merge_transactions(fetched, stored);
    if merged.as_slice() == stored {
        return false;
    }
    lists.insert(chain_id, merged);
    true
}

/// Merges a batch into one account's history for `chain_id`. Returns whether
/// anything changed.
pub(crate) fn merge_batch(history: &mut AccountTransactions, chain_id: u64, batch: TransactionBatch) -> bool {
    match batch {
        TransactionBatch::Utxo(txs) => merge_into(&mut history.utxo, chain_id, txs),
        TransactionBatch::Evm(txs) => merge_into(&mut history.evm, chain_id, txs),
    }
}

fn apply_transactions(state: &mut VaultState, target: &FetchTarget, batch: TransactionBatch) -> SyncOutcome {
    if batch.family() != target.family {
        warn!(expected = %target.family, got = %batch.family(), "provider returned transactions for the wrong family");
        return SyncOutcome::Rejected;
    }
    let Some(account) = state.account_mut(target.account) else {
        return SyncOutcome::Unchanged;
    };
    if merge_batch(&mut account.transactions, target.network.chain_id, batch) {
        SyncOutcome::Committed
    } else {
        SyncOutcome::Unchanged
    }
}

pub struct TransactionSynchronizer {
    vault: Vault,
    providers: ProviderRegistry,
    slot: TaskSlot,
}

impl TransactionSynchronizer {
    pub fn new(vault: Vault, providers: ProviderRegistry) -> Self {
        Self {
            vault,
            providers,
            slot: TaskSlot::new("transactions"),
        }
    }

    pub fn slot(&self) -> &TaskSlot {
        &self.slot
    }

    /// History is only merged for the active chain id; other chains of the
    /// same family keep what they had.
    pub async fn sync_active_account(&self) -> SyncOutcome {
        let Some(target) = FetchTarget::capture(&self.vault) else {
            return SyncOutcome::Skipped;
        };
        let provider = match self.providers.require(target.family) {
            Ok(provider) => provider,
            Err(err) => {
                warn!(error = %err, "transaction sync skipped");
                return SyncOutcome::failed(&err);
            }
        };

        let vault = self.vault.clone();
        let task = cancellable(|token| async move {
            let batch = match provider.fetch_transactions(&target.identity, &target.network).await {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(chain_id = target.network.chain_id, error = %err, "transaction fetch failed");
                    return SyncOutcome::failed(&err);
                }
            };
            debug!(chain_id = target.network.chain_id, fetched = batch.len(), "transactions fetched");
            vault.commit_fetched(&token, &target.network, |state| apply_transactions(state, &target, batch))
        });
        self.slot.install(task.handle());

        task.join().await.unwrap_or(SyncOutcome::Cancelled)
    }
}
