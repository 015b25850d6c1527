use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[cfg(feature = "rocksdb")]
mod rocks;

#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbSnapshotStore;

/// Named blobs of persisted state. The sync service stores the serialized vault here.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_snapshot(&self, name: &str, bytes: Vec<u8>) -> Result<()>;
    async fn load_snapshot(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

pub async fn save_json<T: Serialize + Sync>(store: &dyn SnapshotStore, name: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).with_context(|| format!("serialize snapshot {name}"))?;
    store.save_snapshot(name, bytes).await
}

pub async fn load_json<T: DeserializeOwned>(store: &dyn SnapshotStore, name: &str) -> Result<Option<T>> {
    match store.load_snapshot(name).await? {
        Some(raw) => {
            let value = serde_json::from_slice(&raw).with_context(|| format!("decode snapshot {name}"))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

#[derive(Default)]
pub struct NoopSnapshotStore;

#[async_trait]
impl SnapshotStore for NoopSnapshotStore {
    async fn save_snapshot(&self, _name: &str, _bytes: Vec<u8>) -> Result<()> {
        Ok(())
    }

    async fn load_snapshot(&self, _name: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save_snapshot(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let mut guard = self.snapshots.write().await;
        guard.insert(name.to_owned(), bytes);
        Ok(())
    }

    async fn load_snapshot(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let guard = self.snapshots.read().await;
        Ok(guard.get(name).cloned())
    }
}
