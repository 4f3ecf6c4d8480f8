//! Service configuration.
//!
//! Loaded once at startup from a JSON file and environment overrides, then
//! passed explicitly into each component.

use crate::core::{Error, MatrixShape, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Policy for replacing a cluster's best weights within a round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightPolicy {
    /// Only the first qualifying submission after a round opens is kept.
    #[default]
    FirstWriter,
    /// The first qualifying submission is kept, then replaced by any
    /// later submission with a strictly higher score.
    BestScore,
}

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Number of communication rounds per cluster
    pub round_count: usize,
    /// Number of client slots per cluster
    pub client_count: usize,
    /// Local epochs advertised to clients
    pub epoch_count: u32,
    /// Base64-encoded 32-byte shard encryption key
    pub encryption_key: String,
    /// Best-weights replacement policy
    pub weight_policy: WeightPolicy,
    /// Training dataset
    pub dataset: DatasetConfig,
    /// HTTP server
    pub server: ServerConfig,
    /// Cluster persistence
    pub storage: StorageConfig,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            round_count: 3,
            client_count: 3,
            epoch_count: 5,
            encryption_key: String::new(),
            weight_policy: WeightPolicy::default(),
            dataset: DatasetConfig::default(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl FederationConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&text).map_err(|e| {
            Error::InvalidConfig(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("FED_ROUND_COUNT") {
            self.round_count = parse_var("FED_ROUND_COUNT", &v)?;
        }
        if let Some(v) = lookup("FED_CLIENT") {
            self.client_count = parse_var("FED_CLIENT", &v)?;
        }
        if let Some(v) = lookup("FED_EPOCH") {
            self.epoch_count = parse_var("FED_EPOCH", &v)?;
        }
        if let Some(v) = lookup("KEY_DECRYPT") {
            self.encryption_key = v;
        }
        if let Some(v) = lookup("FEDCOORD_BIND") {
            self.server.bind = v;
        }
        Ok(self)
    }

    /// Check the configuration for values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.round_count == 0 {
            return Err(Error::InvalidConfig("round_count must be at least 1".into()));
        }
        if self.client_count == 0 {
            return Err(Error::InvalidConfig("client_count must be at least 1".into()));
        }
        self.key_bytes()?;
        if self.storage.backend == StorageBackend::JsonFile && self.storage.path.is_none() {
            return Err(Error::InvalidConfig(
                "storage.path is required for the json_file backend".into(),
            ));
        }
        Ok(())
    }

    /// Shape of every cluster's progress matrix.
    pub fn shape(&self) -> MatrixShape {
        MatrixShape::new(self.client_count, self.round_count)
    }

    /// Decode the configured encryption key.
    pub fn key_bytes(&self) -> Result<[u8; 32]> {
        let raw = STANDARD
            .decode(self.encryption_key.trim())
            .map_err(|e| Error::InvalidConfig(format!("encryption_key is not base64: {}", e)))?;
        raw.try_into().map_err(|raw: Vec<u8>| {
            Error::InvalidConfig(format!(
                "encryption_key must decode to 32 bytes, got {}",
                raw.len()
            ))
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{}={:?}: {}", key, value, e)))
}

/// Training dataset configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// CSV file with a header row
    pub path: PathBuf,
    /// Leading non-feature columns to skip
    pub skip_columns: usize,
    /// Number of feature columns after the skipped ones
    pub feature_count: usize,
    /// Maximum rows read from the file
    pub max_rows: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("static/db_big.csv"),
            skip_columns: 2,
            feature_count: 114,
            max_rows: 1000,
        }
    }
}

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Cluster store backend type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process memory only
    #[default]
    Memory,
    /// JSON snapshot file
    JsonFile,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::JsonFile => write!(f, "json_file"),
        }
    }
}

/// Cluster persistence configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to use
    pub backend: StorageBackend,
    /// Snapshot path for the json_file backend
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// In-memory storage.
    pub fn memory() -> Self {
        Self::default()
    }

    /// JSON snapshot storage at `path`.
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackend::JsonFile,
            path: Some(path.into()),
        }
    }
}
