//! Store factory.
//!
//! Creates cluster stores based on configuration.

use crate::core::{Error, Result, StorageBackend, StorageConfig};
use crate::store::backend::ClusterStore;
use crate::store::file::JsonFileClusterStore;
use crate::store::memory::MemoryClusterStore;
use std::sync::Arc;

/// Create a cluster store from configuration.
///
/// Returns an Arc-wrapped store for shared ownership.
pub async fn create_cluster_store(config: &StorageConfig) -> Result<Arc<dyn ClusterStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryClusterStore::new())),
        StorageBackend::JsonFile => {
            let path = config.path.as_ref().ok_or_else(|| {
                Error::InvalidConfig("storage.path is required for the json_file backend".into())
            })?;
            let store = JsonFileClusterStore::open(path).await?;
            Ok(Arc::new(store))
        }
    }
}
