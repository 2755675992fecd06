//! Byte-oriented key-value cache used to memoize provider responses

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    /// Returns the stored value unless it is missing or expired.
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>);

    async fn remove(&self, key: &[u8]);
}
