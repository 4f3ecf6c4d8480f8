//! Cluster registry.
//!
//! Finds a reusable cluster for a joining client or allocates a new one,
//! and answers deletion-state lookups.

use crate::core::{Error, FederationConfig, MatrixShape, Result};
use crate::federated::cluster::{Cluster, DeletionState, LegacyClusterRecord};
use crate::federated::codec::RoundMatrixCodec;
use crate::shard::{EncryptedShard, ShardSampler};
use crate::store::ClusterStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

/// Attempts at allocating a fresh cluster name before giving up.
const MAX_CREATE_ATTEMPTS: usize = 8;

/// A decoded join request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinCommand {
    /// Report a cluster's deletion state without changing anything
    Lookup { cluster: String },
    /// Assign the caller to a cluster round and hand out a shard
    Assign { batch: usize },
}

/// Result of a successful assignment.
#[derive(Clone, Debug)]
pub struct Assignment {
    /// Cluster name
    pub cluster: String,
    /// Round the client should train for
    pub round: usize,
    /// Configured round count
    pub round_count: usize,
    /// Local epochs per round
    pub epoch_count: u32,
    /// Join reservation within the round
    pub slot: usize,
    /// Encrypted training data
    pub shard: EncryptedShard,
}

impl Assignment {
    /// Wire tag `"<cluster>_<round>"`.
    pub fn tag(&self) -> String {
        format!("{}_{}", self.cluster, self.round)
    }
}

/// Result of [`ClusterRegistry::join_or_create`].
#[derive(Clone, Debug)]
pub enum JoinOutcome {
    /// Lookup answer
    Lookup {
        cluster: String,
        state: DeletionState,
        epoch_count: u32,
    },
    /// New or reused assignment
    Assigned(Assignment),
}

type LockMap = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Held mutation lock of one cluster.
///
/// The lock's map entry is removed on release once no other task holds
/// or waits for it, so names that never become clusters leave nothing
/// behind.
pub struct ClusterLock {
    guard: Option<OwnedMutexGuard<()>>,
    name: String,
    locks: Arc<LockMap>,
}

impl Drop for ClusterLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.name);
        }
    }
}

/// Owns cluster records and their per-cluster locks.
pub struct ClusterRegistry {
    store: Arc<dyn ClusterStore>,
    sampler: ShardSampler,
    shape: MatrixShape,
    epoch_count: u32,
    /// Serializes the reuse scan and new-cluster allocation
    assign_lock: Mutex<()>,
    /// Per-cluster mutation locks, present only while held or awaited
    locks: Arc<LockMap>,
}

impl ClusterRegistry {
    /// Create a registry.
    pub fn new(config: &FederationConfig, store: Arc<dyn ClusterStore>, sampler: ShardSampler) -> Self {
        Self {
            store,
            sampler,
            shape: config.shape(),
            epoch_count: config.epoch_count,
            assign_lock: Mutex::new(()),
            locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Configured matrix shape.
    pub fn shape(&self) -> MatrixShape {
        self.shape
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn ClusterStore> {
        &self.store
    }

    /// Acquire the mutation lock of a cluster.
    ///
    /// Every read-modify-write of a cluster record happens under this guard.
    pub async fn lock_cluster(&self, name: &str) -> ClusterLock {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        ClusterLock {
            guard: Some(lock.lock_owned().await),
            name: name.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// Number of cluster locks currently held or awaited.
    #[cfg(test)]
    pub(crate) fn active_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Read a cluster by name.
    pub async fn get(&self, name: &str) -> Result<Option<Cluster>> {
        self.store.get(name).await
    }

    /// All clusters, retired ones included.
    pub async fn list(&self) -> Result<Vec<Cluster>> {
        self.store.list().await
    }

    /// Handle a decoded join request.
    pub async fn join_or_create(&self, command: JoinCommand) -> Result<JoinOutcome> {
        match command {
            JoinCommand::Lookup { cluster } => {
                let state = self.describe_deletion_state(&cluster).await?;
                Ok(JoinOutcome::Lookup {
                    cluster,
                    state,
                    epoch_count: self.epoch_count,
                })
            }
            JoinCommand::Assign { batch } => self.assign(batch).await.map(JoinOutcome::Assigned),
        }
    }

    /// Deletion state of a cluster.
    pub async fn describe_deletion_state(&self, name: &str) -> Result<DeletionState> {
        Ok(self
            .store
            .get(name)
            .await?
            .map(|c| c.deletion_state())
            .unwrap_or(DeletionState::NotExist))
    }

    /// Reserve a slot in a reusable cluster round, or in a new cluster, and
    /// draw a shard of `batch` records for the caller.
    pub async fn assign(&self, batch: usize) -> Result<Assignment> {
        let shard = self.sampler.sample(batch)?;

        let (cluster, round, slot) = {
            let _assign = self.assign_lock.lock().await;
            self.reserve_slot().await?
        };

        debug!(cluster = %cluster, round, slot, batch, "client assigned");
        Ok(Assignment {
            cluster,
            round,
            round_count: self.shape.rounds,
            epoch_count: self.epoch_count,
            slot,
            shard,
        })
    }

    /// Caller must hold `assign_lock`.
    async fn reserve_slot(&self) -> Result<(String, usize, usize)> {
        let clusters = self.store.list().await?;

        for candidate in clusters.iter().filter(|c| !c.is_retired()) {
            match self.try_reuse(&candidate.name).await {
                Ok(Some((round, slot))) => return Ok((candidate.name.clone(), round, slot)),
                Ok(None) => {}
                Err(e @ Error::MalformedMatrix(_)) => {
                    error!(cluster = %candidate.name, error = %e, "skipping corrupt cluster");
                }
                Err(e) => return Err(e),
            }
        }

        let created = self.create_cluster(&clusters).await?;
        Ok((created.name, 0, 0))
    }

    /// Reserve a slot in `name` if every row waits on the same round.
    async fn try_reuse(&self, name: &str) -> Result<Option<(usize, usize)>> {
        let _guard = self.lock_cluster(name).await;

        let Some(mut cluster) = self.store.get(name).await? else {
            return Ok(None);
        };
        if cluster.is_retired() {
            return Ok(None);
        }

        let (round, newly_opened) = {
            let matrix = cluster.checked_matrix_mut(self.shape)?;
            let Some(round) = matrix.common_frontier() else {
                return Ok(None);
            };
            let fresh = matrix.is_round_unopened(round);
            matrix.open_round(round);
            (round, fresh)
        };

        if newly_opened {
            cluster.assign_counter = 1;
            cluster.round_joins = 0;
            info!(cluster = %cluster.name, round, "opened round");
        }
        if cluster.round_joins >= self.shape.clients {
            return Ok(None);
        }

        let slot = cluster.round_joins;
        cluster.round_joins += 1;
        self.store.update(cluster).await?;
        Ok(Some((round, slot)))
    }

    /// Caller must hold `assign_lock`.
    async fn create_cluster(&self, existing: &[Cluster]) -> Result<Cluster> {
        let mut index = existing
            .iter()
            .filter_map(Cluster::index)
            .max()
            .map(|i| i + 1)
            .unwrap_or(0);

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let mut cluster = Cluster::new(&Cluster::name_for(index), self.shape);
            cluster.round_joins = 1;
            match self.store.insert(cluster).await {
                Ok(stored) => {
                    info!(cluster = %stored.name, shape = %self.shape, "created cluster");
                    return Ok(stored);
                }
                Err(Error::ClusterExists(name)) => {
                    warn!(cluster = %name, "cluster name taken, trying next");
                    index += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Storage(format!(
            "could not allocate a cluster name after {} attempts",
            MAX_CREATE_ATTEMPTS
        )))
    }

    /// Import records from the legacy text schema. Existing names are
    /// skipped. Returns the number of imported clusters.
    pub async fn import_legacy(&self, records: Vec<LegacyClusterRecord>) -> Result<usize> {
        let codec = RoundMatrixCodec::new(self.shape);
        let _assign = self.assign_lock.lock().await;

        let mut imported = 0;
        for record in records {
            let cluster = Cluster::from_legacy(record, &codec)?;
            match self.store.insert(cluster).await {
                Ok(stored) => {
                    debug!(cluster = %stored.name, "imported legacy cluster");
                    imported += 1;
                }
                Err(Error::ClusterExists(name)) => {
                    warn!(cluster = %name, "legacy cluster already present, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(imported)
    }
}
