//! ClusterStore trait definition.
//!
//! Core trait that all cluster persistence backends implement.

use crate::core::{now, Error, Result, StorageBackend};
use crate::federated::cluster::Cluster;
use async_trait::async_trait;
use std::collections::HashMap;

/// Persistence boundary for cluster records.
///
/// `insert` is a compare-and-swap on the name and `update` a
/// compare-and-swap on the version stamp, so callers in different
/// processes cannot silently overwrite each other.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Store a new cluster.
    ///
    /// Fails with `ClusterExists` if the name is taken.
    async fn insert(&self, cluster: Cluster) -> Result<Cluster>;

    /// Read a cluster by name.
    async fn get(&self, name: &str) -> Result<Option<Cluster>>;

    /// All clusters, ordered by sequence number then name.
    async fn list(&self) -> Result<Vec<Cluster>>;

    /// Replace a cluster whose stored version equals `cluster.version`.
    ///
    /// Returns the stored record with its version bumped.
    async fn update(&self, cluster: Cluster) -> Result<Cluster>;

    /// Get the backend type.
    fn backend_type(&self) -> StorageBackend;

    /// Health check for the backend.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Number of stored clusters, retired ones included.
    async fn count(&self) -> Result<u64>;
}

/// Insert into an in-memory map, rejecting duplicates.
pub(crate) fn insert_into(map: &mut HashMap<String, Cluster>, mut cluster: Cluster) -> Result<Cluster> {
    if map.contains_key(&cluster.name) {
        return Err(Error::ClusterExists(cluster.name));
    }
    cluster.version = 1;
    cluster.updated_at = now();
    map.insert(cluster.name.clone(), cluster.clone());
    Ok(cluster)
}

/// Replace in an in-memory map if the version stamp matches.
pub(crate) fn update_in(map: &mut HashMap<String, Cluster>, mut cluster: Cluster) -> Result<Cluster> {
    let stored = map
        .get(&cluster.name)
        .ok_or_else(|| Error::Storage(format!("cluster {} not found", cluster.name)))?;
    if stored.version != cluster.version {
        return Err(Error::VersionConflict(cluster.name));
    }
    cluster.version += 1;
    cluster.updated_at = now();
    map.insert(cluster.name.clone(), cluster.clone());
    Ok(cluster)
}

/// Snapshot of a map in listing order.
pub(crate) fn ordered(map: &HashMap<String, Cluster>) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = map.values().cloned().collect();
    clusters.sort_by(|a, b| {
        let ka = (a.index().is_none(), a.index(), &a.name);
        let kb = (b.index().is_none(), b.index(), &b.name);
        ka.cmp(&kb)
    });
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MatrixShape;

    fn cluster(name: &str) -> Cluster {
        Cluster::new(name, MatrixShape::new(2, 2))
    }

    #[test]
    fn test_insert_sets_version() {
        let mut map = HashMap::new();
        let stored = insert_into(&mut map, cluster("Cluster0")).unwrap();
        assert_eq!(stored.version, 1);
        assert!(matches!(
            insert_into(&mut map, cluster("Cluster0")),
            Err(Error::ClusterExists(_))
        ));
    }

    #[test]
    fn test_update_checks_version() {
        let mut map = HashMap::new();
        let stored = insert_into(&mut map, cluster("Cluster0")).unwrap();

        let updated = update_in(&mut map, stored.clone()).unwrap();
        assert_eq!(updated.version, 2);

        // Stale copy
        assert!(matches!(
            update_in(&mut map, stored),
            Err(Error::VersionConflict(_))
        ));
    }

    #[test]
    fn test_update_missing() {
        let mut map = HashMap::new();
        assert!(matches!(
            update_in(&mut map, cluster("Cluster9")),
            Err(Error::Storage(_))
        ));
    }

    #[test]
    fn test_ordering_is_numeric() {
        let mut map = HashMap::new();
        for name in ["Cluster10", "alpha", "Cluster2", "Cluster0"] {
            insert_into(&mut map, cluster(name)).unwrap();
        }
        let names: Vec<String> = ordered(&map).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Cluster0", "Cluster2", "Cluster10", "alpha"]);
    }
}
