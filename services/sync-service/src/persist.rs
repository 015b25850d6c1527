use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vs_storage::{SnapshotStore, load_json, save_json};
use vs_sync_core::{Vault, VaultState};

pub(crate) const VAULT_SNAPSHOT: &str = "vault";

pub(crate) async fn load_vault(store: &dyn SnapshotStore) -> Result<Option<VaultState>> {
    load_json(store, VAULT_SNAPSHOT).await
}

pub(crate) async fn save_vault(store: &dyn SnapshotStore, vault: &Vault) -> Result<()> {
    save_json(store, VAULT_SNAPSHOT, &vault.snapshot()).await
}

/// Saves the vault after every committed revision. Revisions that land while a
/// save is running collapse into one follow-up save.
pub(crate) fn spawn_persistence(vault: Vault, store: Arc<dyn SnapshotStore>) -> JoinHandle<()> {
    let mut revisions = vault.subscribe();
    tokio::spawn(async move {
        while revisions.changed().await.is_ok() {
            let revision = *revisions.borrow_and_update();
            match save_vault(store.as_ref(), &vault).await {
                Ok(()) => debug!(revision, "vault snapshot saved"),
                Err(err) => warn!(?err, revision, "failed to save vault snapshot"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vs_api_types::{ChainFamily, Network, NetworkRegistry};
    use vs_storage::InMemorySnapshotStore;

    fn vault() -> Vault {
        let network = Network {
            chain_id: 57,
            url: "https://blockbook.example".to_owned(),
            label: "Syscoin".to_owned(),
            currency: "sys".to_owned(),
            kind: ChainFamily::Utxo,
            explorer: None,
            api_url: None,
            slip44: Some(57),
            default: true,
        };
        let mut registry = NetworkRegistry::default();
        registry.insert(network.clone());
        Vault::new(VaultState::new(registry, network))
    }

    #[tokio::test]
    async fn committed_revisions_are_persisted() {
        let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::default());
        let vault = vault();
        let worker = spawn_persistence(vault.clone(), store.clone());

        vault.commit(|state| state.error = true);

        let saved = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(state) = load_vault(store.as_ref()).await.unwrap() {
                    if state.error {
                        return state;
                    }
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("snapshot was not written");

        assert_eq!(saved.active_network.chain_id, 57);
        assert!(!saved.is_network_changing);
        worker.abort();
    }

    #[tokio::test]
    async fn missing_snapshot_loads_as_none() {
        let store = InMemorySnapshotStore::default();
        assert!(load_vault(&store).await.unwrap().is_none());
    }
}
