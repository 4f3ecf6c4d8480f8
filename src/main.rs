//! fedcoord server binary.

use clap::Parser;
use fedcoord::api::{self, AppState};
use fedcoord::core::FederationConfig;
use fedcoord::federated::{
    AggregationDispatcher, ClusterRegistry, LegacyClusterRecord, RoundCoordinator,
};
use fedcoord::shard::{Dataset, ShardCipher, ShardSampler};
use fedcoord::store::create_cluster_store;
use fedcoord::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fedcoord", version, about = "Federated learning round coordinator")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "FEDCOORD_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration
    #[arg(short, long)]
    bind: Option<String>,

    /// Import clusters from a legacy JSON export before serving
    #[arg(long, value_name = "FILE")]
    import_legacy: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => FederationConfig::from_file(path)?,
        None => FederationConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    config.validate()?;

    let store = create_cluster_store(&config.storage).await?;
    let dataset = Dataset::load(&config.dataset)?;
    info!(
        records = dataset.len(),
        features = dataset.feature_count(),
        "dataset loaded"
    );

    let cipher = ShardCipher::new(&config.key_bytes()?);
    let sampler = ShardSampler::new(Arc::new(dataset), cipher);
    let registry = Arc::new(ClusterRegistry::new(&config, store, sampler));

    if let Some(path) = &cli.import_legacy {
        let text = std::fs::read_to_string(path)?;
        let records: Vec<LegacyClusterRecord> = serde_json::from_str(&text)
            .map_err(|e| Error::InvalidRequest(format!("{}: {}", path.display(), e)))?;
        let imported = registry.import_legacy(records).await?;
        info!(imported, path = %path.display(), "legacy clusters imported");
    }

    let coordinator = Arc::new(RoundCoordinator::new(
        registry.clone(),
        AggregationDispatcher::default(),
        config.weight_policy,
    ));

    info!(
        shape = %config.shape(),
        epochs = config.epoch_count,
        storage = %config.storage.backend,
        "starting coordinator"
    );
    api::serve(AppState::new(registry, coordinator), &config.server.bind).await
}
