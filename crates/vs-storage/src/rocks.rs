use anyhow::{Context, Result};
use async_trait::async_trait;
use rocksdb::{DB, Options};
use std::sync::Arc;

use crate::SnapshotStore;

pub struct RocksDbSnapshotStore {
    db: Arc<DB>,
}

impl RocksDbSnapshotStore {
    pub fn open_default(path: &str) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path).with_context(|| format!("open rocksdb at {path}"))?;
        Ok(Self { db: Arc::new(db) })
    }

    fn key_for_snapshot(name: &str) -> String {
        format!("snapshot:{name}")
    }
}

#[async_trait]
impl SnapshotStore for RocksDbSnapshotStore {
    async fn save_snapshot(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let key = Self::key_for_snapshot(name);
        self.db.put(key.as_bytes(), bytes)?;
        Ok(())
    }

    async fn load_snapshot(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let key = Self::key_for_snapshot(name);
        Ok(self.db.get(key.as_bytes())?)
    }
}
