//! # fedcoord - Federated Round Coordination
//!
//! A coordination service for federated training:
//! - **Registry**: assigns clients to clusters and communication rounds
//! - **Shards**: random, standardized, encrypted training batches
//! - **Coordinator**: records round results and triggers aggregation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fedcoord::core::FederationConfig;
//! use fedcoord::federated::{ClusterRegistry, JoinCommand};
//! use fedcoord::shard::{Dataset, ShardCipher, ShardSampler};
//! use fedcoord::store::MemoryClusterStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = FederationConfig::default();
//!     let dataset = Dataset::load(&config.dataset).unwrap();
//!     let sampler = ShardSampler::new(Arc::new(dataset), ShardCipher::from_passphrase("secret"));
//!     let registry = ClusterRegistry::new(&config, Arc::new(MemoryClusterStore::new()), sampler);
//!
//!     let outcome = registry.join_or_create(JoinCommand::Assign { batch: 10 }).await.unwrap();
//!     println!("{:?}", outcome);
//! }
//! ```

pub mod api;
pub mod core;
pub mod federated;
pub mod shard;
pub mod store;

pub use core::error::{Error, Result};
