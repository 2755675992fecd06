use crate::core::cache::KeyValueCollection;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<SystemTime>,
}

/// Response cache persisted in a fjall partition. Storage errors are logged
/// and treated as misses.
pub struct DiskCollection {
    _keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskCollection {
    /// Opens (or creates) partition `name` of the keyspace at `dir`.
    pub fn open(dir: &Path, name: &str) -> Result<Self> {
        let keyspace = fjall::Config::new(dir)
            .open()
            .with_context(|| format!("Failed to open cache at {}", dir.display()))?;
        let partition = keyspace
            .open_partition(name, PartitionCreateOptions::default())
            .with_context(|| format!("Failed to open cache partition {name}"))?;
        Ok(DiskCollection {
            _keyspace: keyspace,
            partition,
        })
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.partition.get(key)? else {
            return Ok(None);
        };
        let entry: CacheEntry = serde_json::from_slice(&raw)?;
        if entry
            .expires_at
            .is_some_and(|expires_at| SystemTime::now() > expires_at)
        {
            debug!("Cache entry expired for key: {}", String::from_utf8_lossy(key));
            self.partition.remove(key)?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn store(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry {
            value: value.to_vec(),
            expires_at: ttl.map(|d| SystemTime::now() + d),
        };
        self.partition.insert(key, serde_json::to_vec(&entry)?)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.lookup(key) {
            Ok(val) => val,
            Err(e) => {
                debug!("DiskCollection get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) {
        if let Err(e) = self.store(key, value, ttl) {
            debug!("DiskCollection put error: {}", e);
        }
    }

    async fn remove(&self, key: &[u8]) {
        if let Err(e) = self.partition.remove(key) {
            debug!("DiskCollection remove error: {}", e);
        }
    }
}
