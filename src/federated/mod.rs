//! Federated Round Coordination
//!
//! Tracks clients through communication rounds:
//! - Progress matrices and their legacy text encoding
//! - Cluster records and the registry that assigns clients to them
//! - Result recording and aggregation triggers

pub mod aggregator;
pub mod cluster;
pub mod codec;
pub mod coordinator;
pub mod matrix;
pub mod registry;

#[cfg(test)]
pub(crate) mod fixtures;

pub use aggregator::{
    AggregationDispatcher, AggregationRequest, AggregationTrigger, ChannelAggregator,
    LoggingAggregator,
};
pub use cluster::{Cluster, DeletionState, LegacyClusterRecord};
pub use codec::RoundMatrixCodec;
pub use coordinator::{RoundCoordinator, RoundOutcome, RoundSubmission};
pub use matrix::{CellState, ProgressMatrix};
pub use registry::{Assignment, ClusterLock, ClusterRegistry, JoinCommand, JoinOutcome};
