//! Training Shards
//!
//! Per-client data distribution:
//! - Dataset loading
//! - Random disjoint sampling with batch standardization
//! - Per-row symmetric encryption

pub mod cipher;
pub mod dataset;
pub mod sampler;

pub use cipher::ShardCipher;
pub use dataset::Dataset;
pub use sampler::{EncryptedShard, ShardSampler};
