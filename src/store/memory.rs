//! In-memory backend.

use crate::core::{Result, StorageBackend};
use crate::federated::cluster::Cluster;
use crate::store::backend::{insert_into, ordered, update_in, ClusterStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Cluster store held in process memory.
#[derive(Default)]
pub struct MemoryClusterStore {
    clusters: RwLock<HashMap<String, Cluster>>,
}

impl MemoryClusterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterStore for MemoryClusterStore {
    async fn insert(&self, cluster: Cluster) -> Result<Cluster> {
        let mut clusters = self.clusters.write().await;
        insert_into(&mut clusters, cluster)
    }

    async fn get(&self, name: &str) -> Result<Option<Cluster>> {
        Ok(self.clusters.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<Cluster>> {
        Ok(ordered(&*self.clusters.read().await))
    }

    async fn update(&self, cluster: Cluster) -> Result<Cluster> {
        let mut clusters = self.clusters.write().await;
        update_in(&mut clusters, cluster)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.clusters.read().await.len() as u64)
    }
}
