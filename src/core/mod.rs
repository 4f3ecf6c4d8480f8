//! Core utilities, configuration and common types.

pub mod config;
pub mod error;
pub mod types;

pub use config::{FederationConfig, StorageBackend, StorageConfig, WeightPolicy};
pub use error::{Error, Result};
pub use types::*;
