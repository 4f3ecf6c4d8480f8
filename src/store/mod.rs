//! Cluster Persistence
//!
//! Trait-based store for cluster records:
//! - In-memory
//! - JSON snapshot file

pub mod backend;
pub mod factory;
pub mod file;
pub mod memory;

pub use backend::ClusterStore;
pub use factory::create_cluster_store;
pub use file::JsonFileClusterStore;
pub use memory::MemoryClusterStore;
