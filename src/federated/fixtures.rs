//! Shared test setup.

use crate::core::FederationConfig;
use crate::federated::registry::ClusterRegistry;
use crate::shard::{Dataset, ShardCipher, ShardSampler};
use crate::store::MemoryClusterStore;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

/// Records in the synthetic dataset.
pub const DATASET_SIZE: usize = 64;

pub const KEY: [u8; 32] = [7u8; 32];

pub fn config(clients: usize, rounds: usize) -> FederationConfig {
    FederationConfig {
        client_count: clients,
        round_count: rounds,
        encryption_key: STANDARD.encode(KEY),
        ..FederationConfig::default()
    }
}

pub fn dataset() -> Dataset {
    let records = (0..DATASET_SIZE)
        .map(|i| vec![i as f64, (i % 7) as f64, 1.0])
        .collect();
    Dataset::from_records(records).unwrap()
}

pub fn sampler() -> ShardSampler {
    ShardSampler::new(Arc::new(dataset()), ShardCipher::new(&KEY))
}

pub fn registry(clients: usize, rounds: usize) -> ClusterRegistry {
    ClusterRegistry::new(
        &config(clients, rounds),
        Arc::new(MemoryClusterStore::new()),
        sampler(),
    )
}
