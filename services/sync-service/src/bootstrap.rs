use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use vs_api_types::{AccountRef, AccountType};
use vs_chain_client::ProviderRegistry;
use vs_chain_http::{BlockbookAdapter, EvmRpcAdapter, http_client};
use vs_keyring::{Keyring, LocalKeyring, WatchOnlyAccount};
use vs_storage::SnapshotStore;
use vs_sync_core::{EventBroadcaster, SyncController, Vault, VaultState};

use crate::config::ServiceConfig;
use crate::networks::default_networks;
use crate::persist::load_vault;

pub(crate) fn build_keyring(config: &ServiceConfig) -> Result<Arc<dyn Keyring>> {
    let mut accounts = Vec::new();
    if config.watch_address.is_some() || config.watch_xpub.is_some() {
        let (_, active) = default_networks();
        let mut account = WatchOnlyAccount::new(
            AccountRef::new(AccountType::HdAccount, 0),
            config.watch_address.clone().unwrap_or_default(),
        );
        if let (Some(xpub), Some(slip44)) = (&config.watch_xpub, active.slip44) {
            account = account.with_xpub(slip44, xpub.clone());
        }
        accounts.push(account);
    }
    let keyring = LocalKeyring::new(&config.keyring_password, accounts).context("create local keyring")?;
    Ok(Arc::new(keyring))
}

pub(crate) fn build_providers(config: &ServiceConfig) -> Result<ProviderRegistry> {
    let http = http_client(config.http_timeout).context("build provider http client")?;
    let mut providers = ProviderRegistry::default();
    providers.register(Arc::new(BlockbookAdapter::new(http.clone())));
    providers.register(Arc::new(EvmRpcAdapter::new(http)));
    Ok(providers)
}

/// Restores the saved vault, or seeds a fresh one with the built-in networks.
/// Either way the signer is pointed at the active network before serving.
pub(crate) async fn load_or_seed_vault(store: &dyn SnapshotStore, keyring: &dyn Keyring) -> Result<Vault> {
    let mut state = match load_vault(store).await? {
        Some(state) => {
            info!(
                kind = %state.active_network.kind,
                chain_id = state.active_network.chain_id,
                "vault restored from snapshot"
            );
            state
        }
        None => {
            let (registry, active) = default_networks();
            info!(chain_id = active.chain_id, "seeding fresh vault");
            VaultState::new(registry, active)
        }
    };

    let signer = keyring
        .set_signer_network(&state.active_network)
        .await
        .context("point signer at the active network")?;
    if signer.success {
        state.merge_account_keys(&signer.wallet);
    } else {
        warn!(chain_id = state.active_network.chain_id, "signer could not derive keys for the active network");
    }

    if state.active().is_some() {
        if let Err(err) = keyring.set_active_account(state.active_account) {
            warn!(?err, account = %state.active_account, "keyring rejected the stored active account");
        }
    }

    Ok(Vault::new(state))
}

pub(crate) async fn build_controller(config: &ServiceConfig, store: &dyn SnapshotStore) -> Result<SyncController> {
    let keyring = build_keyring(config)?;
    let providers = build_providers(config)?;
    let vault = load_or_seed_vault(store, keyring.as_ref()).await?;
    Ok(SyncController::new(
        vault,
        keyring,
        providers,
        EventBroadcaster::default(),
        config.sync,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vs_api_types::{ChainFamily, NetworkRegistry};
    use vs_storage::{InMemorySnapshotStore, save_json};

    fn keyring_with_watch_account() -> LocalKeyring {
        let account = WatchOnlyAccount::new(AccountRef::new(AccountType::HdAccount, 0), "0xwatch")
            .with_xpub(57, "zpub-watch");
        LocalKeyring::new("hunter2", vec![account]).unwrap()
    }

    #[tokio::test]
    async fn fresh_vault_is_seeded_with_defaults_and_signer_keys() {
        let store = InMemorySnapshotStore::default();
        let keyring = keyring_with_watch_account();

        let vault = load_or_seed_vault(&store, &keyring).await.unwrap();

        vault.read(|state| {
            assert_eq!(state.active_chain, ChainFamily::Utxo);
            assert!(state.is_bitcoin_based);
            let active = state.active().unwrap();
            assert_eq!(active.address, "0xwatch");
            assert_eq!(active.xpub, "zpub-watch");
        });
        assert_eq!(keyring.active_account(), Some(AccountRef::new(AccountType::HdAccount, 0)));
        assert_eq!(keyring.signer_network(), Some((ChainFamily::Utxo, 57)));
    }

    #[tokio::test]
    async fn stored_snapshot_wins_over_defaults() {
        let store = InMemorySnapshotStore::default();
        let (registry, _) = default_networks();
        let polygon = registry.get(ChainFamily::Evm, 137).unwrap().clone();
        let mut saved = VaultState::new(registry, polygon);
        saved.error = true;
        save_json(&store, crate::persist::VAULT_SNAPSHOT, &saved).await.unwrap();

        let vault = load_or_seed_vault(&store, &keyring_with_watch_account()).await.unwrap();

        vault.read(|state| {
            assert_eq!(state.active_network.chain_id, 137);
            assert_eq!(state.active_chain, ChainFamily::Evm);
            assert!(state.error);
            assert_eq!(state.active().unwrap().address, "0xwatch");
        });
    }

    #[tokio::test]
    async fn vault_without_watch_account_has_no_active_identity() {
        let store = InMemorySnapshotStore::default();
        let keyring = LocalKeyring::new("hunter2", Vec::new()).unwrap();

        let vault = load_or_seed_vault(&store, &keyring).await.unwrap();

        assert!(vault.read(|state| state.active().is_none()));
        assert_ne!(vault.read(|state| state.networks.clone()), NetworkRegistry::default());
    }
}
