pub mod disk;
pub mod memory;

use crate::core::cache::KeyValueCollection;
use crate::core::config::AppConfig;
use anyhow::Result;
use disk::DiskCollection;
use memory::MemoryCollection;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Partition holding raw World Bank responses.
pub const RESPONSES: &str = "responses";

/// Opens a persistent collection under `dir`.
pub fn open_disk(dir: &Path, name: &str) -> Result<Arc<dyn KeyValueCollection>> {
    Ok(Arc::new(DiskCollection::open(dir, name)?))
}

/// Response cache for a run: `None` when caching is disabled, the disk cache
/// under the data directory when it opens, memory otherwise.
pub fn response_cache(config: &AppConfig) -> Option<Arc<dyn KeyValueCollection>> {
    if !config.cache.enabled {
        return None;
    }
    let disk = config
        .default_data_path()
        .and_then(|path| open_disk(&path.join("cache"), RESPONSES));
    match disk {
        Ok(collection) => {
            debug!("Using disk response cache");
            Some(collection)
        }
        Err(e) => {
            warn!("Disk cache unavailable, using memory: {e:#}");
            Some(Arc::new(MemoryCollection::new()))
        }
    }
}
