//! Cluster records.

use crate::core::{now, Error, MatrixShape, Result, Timestamp};
use crate::federated::codec::RoundMatrixCodec;
use crate::federated::matrix::ProgressMatrix;
use serde::{Deserialize, Serialize};

/// Prefix of every generated cluster name.
pub const CLUSTER_PREFIX: &str = "Cluster";

/// A coordination unit: fixed client slots across fixed rounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Unique name (`Cluster0`, `Cluster1`, ...)
    pub name: String,
    /// Progress matrix; cleared once the cluster is retired
    pub matrix: Option<ProgressMatrix>,
    /// Opaque serialized weights of the best submission
    pub best_weights: Option<String>,
    /// Score that accompanied `best_weights`
    pub best_score: Option<f64>,
    /// Guards the first weight write of each round
    pub assign_counter: u32,
    /// Client identifier bound to each row, if known
    pub slot_owners: Vec<Option<String>>,
    /// Join reservations handed out for the open round
    pub round_joins: usize,
    /// Rounds for which aggregation has been triggered
    pub aggregated_rounds: Vec<usize>,
    /// Optimistic concurrency stamp
    pub version: u64,
    /// Creation time
    pub created_at: Timestamp,
    /// Last update time
    pub updated_at: Timestamp,
}

impl Cluster {
    /// Create a cluster with round 0 open for every slot.
    pub fn new(name: &str, shape: MatrixShape) -> Self {
        let ts = now();
        Self {
            name: name.to_string(),
            matrix: Some(ProgressMatrix::fresh(shape)),
            best_weights: None,
            best_score: None,
            assign_counter: 1,
            slot_owners: vec![None; shape.clients],
            round_joins: 0,
            aggregated_rounds: Vec::new(),
            version: 0,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Generated name for a sequence number.
    pub fn name_for(index: u64) -> String {
        format!("{}{}", CLUSTER_PREFIX, index)
    }

    /// Sequence number parsed from the name, if it was generated.
    pub fn index(&self) -> Option<u64> {
        self.name.strip_prefix(CLUSTER_PREFIX)?.parse().ok()
    }

    /// Wire tag `"<name>_<round>"`.
    pub fn tag(&self, round: usize) -> String {
        format!("{}_{}", self.name, round)
    }

    /// Whether the cluster has been retired.
    pub fn is_retired(&self) -> bool {
        self.matrix.is_none()
    }

    /// Borrow the matrix after checking it against the configured shape.
    pub fn checked_matrix(&self, shape: MatrixShape) -> Result<&ProgressMatrix> {
        let matrix = self
            .matrix
            .as_ref()
            .ok_or_else(|| Error::Internal(format!("cluster {} is retired", self.name)))?;
        matrix
            .validate(shape)
            .map_err(|e| prefix_error(&self.name, e))?;
        if self.slot_owners.len() != shape.clients {
            return Err(Error::MalformedMatrix(format!(
                "{}: {} slot owners for {} clients",
                self.name,
                self.slot_owners.len(),
                shape.clients
            )));
        }
        Ok(matrix)
    }

    /// Mutable counterpart of [`Cluster::checked_matrix`].
    pub fn checked_matrix_mut(&mut self, shape: MatrixShape) -> Result<&mut ProgressMatrix> {
        self.checked_matrix(shape)?;
        self.matrix
            .as_mut()
            .ok_or_else(|| Error::Internal(format!("cluster {} is retired", self.name)))
    }

    /// Row owned by a client, if any.
    pub fn slot_of(&self, client_id: &str) -> Option<usize> {
        self.slot_owners
            .iter()
            .position(|owner| owner.as_deref() == Some(client_id))
    }

    /// Clear the matrix and reset the counter. Weights are kept as the
    /// cluster's final result.
    pub fn retire(&mut self) {
        self.matrix = None;
        self.assign_counter = 0;
        self.round_joins = 0;
    }

    /// Deletion state reported to lookup requests.
    pub fn deletion_state(&self) -> DeletionState {
        if self.is_retired() {
            DeletionState::NotExist
        } else if self.best_weights.is_none() {
            DeletionState::NotAssigned
        } else {
            DeletionState::PartiallyDeleted
        }
    }

    /// Convert a record from the legacy text schema.
    pub fn from_legacy(record: LegacyClusterRecord, codec: &RoundMatrixCodec) -> Result<Self> {
        let shape = codec.shape();
        let matrix = if record.number_string.trim().is_empty() {
            None
        } else {
            Some(
                codec
                    .decode(&record.number_string)
                    .map_err(|e| prefix_error(&record.name, e))?,
            )
        };
        let aggregated_rounds = matrix
            .as_ref()
            .map(|m| (0..shape.rounds).filter(|&r| m.is_round_complete(r)).collect())
            .unwrap_or_default();
        let ts = now();

        Ok(Self {
            name: record.name,
            matrix,
            best_weights: Some(record.best_weights).filter(|w| !w.is_empty()),
            best_score: None,
            assign_counter: record.counter.max(0.0) as u32,
            slot_owners: vec![None; shape.clients],
            round_joins: 0,
            aggregated_rounds,
            version: 0,
            created_at: ts,
            updated_at: ts,
        })
    }

    /// Convert to the legacy text schema.
    pub fn to_legacy(&self, codec: &RoundMatrixCodec) -> LegacyClusterRecord {
        LegacyClusterRecord {
            name: self.name.clone(),
            number_string: self
                .matrix
                .as_ref()
                .map(|m| codec.encode(m))
                .unwrap_or_default(),
            best_weights: self.best_weights.clone().unwrap_or_default(),
            counter: self.assign_counter as f64,
        }
    }
}

fn prefix_error(name: &str, err: Error) -> Error {
    match err {
        Error::MalformedMatrix(msg) => Error::MalformedMatrix(format!("{}: {}", name, msg)),
        other => other,
    }
}

/// Deletion state of a cluster, as reported to lookup requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionState {
    /// Best weights have not been set yet
    NotAssigned,
    /// Weights are set but the matrix has not been cleared
    PartiallyDeleted,
    /// No such cluster, or it has been retired
    NotExist,
}

impl DeletionState {
    /// Message string used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionState::NotAssigned => "Cluster not yet assigned",
            DeletionState::PartiallyDeleted => "Cluster data not fully deleted",
            DeletionState::NotExist => "Cluster Does Not Exist",
        }
    }
}

impl std::fmt::Display for DeletionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster record in the legacy schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyClusterRecord {
    pub name: String,
    #[serde(default)]
    pub number_string: String,
    #[serde(default)]
    pub best_weights: String,
    #[serde(default = "default_counter")]
    pub counter: f64,
}

fn default_counter() -> f64 {
    1.0
}
