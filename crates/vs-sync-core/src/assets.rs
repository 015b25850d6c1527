use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use vs_api_types::{ChainFamily, NetworkRegistry, Nft, Token};
use vs_chain_client::{AssetBatch, ProviderRegistry};

use crate::cancellable::{TaskSlot, cancellable};
use crate::vault::{Vault, VaultState};
use crate::{FetchTarget, SyncOutcome};

/// Result of reconciling one fetched list against the stored one.
#[derive(Debug, Clone, PartialEq)]
pub enum ListDecision<T> {
    Unchanged,
    /// The fetched list lost entries without being the same set; treated as a bad fetch.
    Rejected,
    Replace(Vec<T>),
}

/// Applies the update policy to candidates that are already tagged, deduplicated
/// and ordered.
pub fn reconcile<T, K>(stored: &[T], candidates: Vec<T>, key: K) -> ListDecision<T>
where
    T: PartialEq,
    K: Fn(&T) -> String,
{
    if stored.is_empty() && candidates.is_empty() {
        return ListDecision::Unchanged;
    }
    if candidates.as_slice() == stored {
        return ListDecision::Unchanged;
    }
    if candidates.len() < stored.len() {
        let stored_keys: BTreeSet<String> = stored.iter().map(&key).collect();
        let fetched_keys: BTreeSet<String> = candidates.iter().map(&key).collect();
        if stored_keys != fetched_keys {
            return ListDecision::Rejected;
        }
    }
    ListDecision::Replace(candidates)
}

/// Tags untagged entries with the active chain, drops tags the registry does
/// not know, keeps only the active chain's entries, dedups by identity keeping
/// the largest balance, orders by balance descending.
fn prepare_tokens(tokens: Vec<Token>, family: ChainFamily, chain_id: u64, registry: &NetworkRegistry) -> Vec<Token> {
    let mut prepared: Vec<Token> = tokens
        .into_iter()
        .filter(|token| token.identity.family() == family)
        .filter_map(|mut token| {
            let tag = *token.chain_id.get_or_insert(chain_id);
            (registry.contains(family, tag) && tag == chain_id).then_some(token)
        })
        .collect();
    prepared.sort_by(|a, b| b.balance.total_cmp(&a.balance));

    let mut seen = BTreeSet::new();
    prepared.retain(|token| seen.insert(token.identity.key()));
    prepared
}

fn prepare_nfts(nfts: Vec<Nft>, chain_id: u64, registry: &NetworkRegistry) -> Vec<Nft> {
    let mut prepared: Vec<Nft> = nfts
        .into_iter()
        .filter_map(|mut nft| {
            let tag = *nft.chain_id.get_or_insert(chain_id);
            (registry.contains(ChainFamily::Evm, tag) && tag == chain_id).then_some(nft)
        })
        .collect();
    prepared.sort_by_key(Nft::identity_key);
    prepared.dedup_by_key(|nft| nft.identity_key());
    prepared
}

/// Splits a stored list into the active chain's entries and everything else.
fn split_by_chain<T: Clone>(stored: &[T], chain_id: u64, tag: impl Fn(&T) -> Option<u64>) -> (Vec<T>, Vec<T>) {
    stored.iter().cloned().partition(|item| tag(item) == Some(chain_id))
}

fn apply_assets(state: &mut VaultState, target: &FetchTarget, batch: AssetBatch) -> SyncOutcome {
    let chain_id = target.network.chain_id;
    let tokens = prepare_tokens(batch.tokens, target.family, chain_id, &state.networks);
    let nfts = prepare_nfts(batch.nfts, chain_id, &state.networks);
    let Some(account) = state.account_mut(target.account) else {
        return SyncOutcome::Unchanged;
    };

    let mut committed = false;
    let mut rejected = false;

    let (current, others) = split_by_chain(account.assets.tokens(target.family), chain_id, |t| t.chain_id);
    match reconcile(&current, tokens, |token| token.identity.key()) {
        ListDecision::Unchanged => {}
        ListDecision::Rejected => rejected = true,
        ListDecision::Replace(tokens) => {
            let stored = account.assets.tokens_mut(target.family);
            *stored = others;
            stored.extend(tokens);
            committed = true;
        }
    }

    if target.family == ChainFamily::Evm {
        let (current, others) = split_by_chain(&account.assets.nfts, chain_id, |n| n.chain_id);
        match reconcile(&current, nfts, Nft::identity_key) {
            ListDecision::Unchanged => {}
            ListDecision::Rejected => rejected = true,
            ListDecision::Replace(nfts) => {
                account.assets.nfts = others;
                account.assets.nfts.extend(nfts);
                committed = true;
            }
        }
    }

    if committed {
        SyncOutcome::Committed
    } else if rejected {
        SyncOutcome::Rejected
    } else {
        SyncOutcome::Unchanged
    }
}

pub struct AssetSynchronizer {
    vault: Vault,
    providers: ProviderRegistry,
    slot: TaskSlot,
}

impl AssetSynchronizer {
    pub fn new(vault: Vault, providers: ProviderRegistry) -> Self {
        Self {
            vault,
            providers,
            slot: TaskSlot::new("assets"),
        }
    }

    pub fn slot(&self) -> &TaskSlot {
        &self.slot
    }

    pub async fn sync_active_account(&self) -> SyncOutcome {
        let Some(target) = FetchTarget::capture(&self.vault) else {
            return SyncOutcome::Skipped;
        };
        let provider = match self.providers.require(target.family) {
            Ok(provider) => provider,
            Err(err) => {
                warn!(error = %err, "asset sync skipped");
                return SyncOutcome::failed(&err);
            }
        };

        let vault = self.vault.clone();
        let task = cancellable(|token| async move {
            let batch = match provider.fetch_assets(&target.identity, &target.network).await {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(chain_id = target.network.chain_id, error = %err, "asset fetch failed; keeping stored assets");
                    return SyncOutcome::failed(&err);
                }
            };
            debug!(
                chain_id = target.network.chain_id,
                tokens = batch.tokens.len(),
                nfts = batch.nfts.len(),
                "assets fetched"
            );
            vault.commit_fetched(&token, &target.network, |state| apply_assets(state, &target, batch))
        });
        self.slot.install(task.handle());

        let outcome = task.join().await.unwrap_or(SyncOutcome::Cancelled);
        if outcome == SyncOutcome::Rejected {
            info!("fetched asset list dropped entries; keeping stored assets");
        }
        outcome
    }
}
