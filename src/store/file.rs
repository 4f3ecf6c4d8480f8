//! JSON snapshot backend.
//!
//! Keeps the clusters in memory and rewrites the whole snapshot file after
//! every mutation (write to a sibling temp file, then rename).

use crate::core::{Error, Result, StorageBackend};
use crate::federated::cluster::Cluster;
use crate::store::backend::{insert_into, ordered, update_in, ClusterStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Cluster store persisted to a JSON file.
pub struct JsonFileClusterStore {
    path: PathBuf,
    clusters: RwLock<HashMap<String, Cluster>>,
}

impl JsonFileClusterStore {
    /// Open the snapshot at `path`, starting empty if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let clusters = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<Cluster> = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::Storage(format!("corrupt snapshot {}: {}", path.display(), e))
                })?;
                list.into_iter().map(|c| (c.name.clone(), c)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), clusters = clusters.len(), "opened cluster snapshot");

        Ok(Self {
            path,
            clusters: RwLock::new(clusters),
        })
    }

    async fn persist(&self, clusters: &HashMap<String, Cluster>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&ordered(clusters))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for JsonFileClusterStore {
    async fn insert(&self, cluster: Cluster) -> Result<Cluster> {
        let mut clusters = self.clusters.write().await;
        let stored = insert_into(&mut clusters, cluster)?;
        if let Err(e) = self.persist(&clusters).await {
            clusters.remove(&stored.name);
            return Err(e);
        }
        Ok(stored)
    }

    async fn get(&self, name: &str) -> Result<Option<Cluster>> {
        Ok(self.clusters.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<Cluster>> {
        Ok(ordered(&*self.clusters.read().await))
    }

    async fn update(&self, cluster: Cluster) -> Result<Cluster> {
        let mut clusters = self.clusters.write().await;
        let previous = clusters.get(&cluster.name).cloned();
        let stored = update_in(&mut clusters, cluster)?;
        if let Err(e) = self.persist(&clusters).await {
            if let Some(previous) = previous {
                clusters.insert(previous.name.clone(), previous);
            }
            return Err(e);
        }
        Ok(stored)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::JsonFile
    }

    async fn health_check(&self) -> Result<bool> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(tokio::fs::metadata(dir).await.is_ok()),
            _ => Ok(true),
        }
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.clusters.read().await.len() as u64)
    }
}
