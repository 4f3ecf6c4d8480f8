//! Aggregation trigger boundary.
//!
//! The coordinator only decides *when* a round is ready for aggregation;
//! the aggregation itself is delegated to an [`AggregationTrigger`].

use crate::core::{now, Error, Result, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A completed round that is ready for aggregation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// Cluster name
    pub cluster: String,
    /// Completed round index
    pub round: usize,
    /// Whether this was the cluster's final round
    pub final_round: bool,
    /// Best weights recorded for the cluster so far
    pub best_weights: Option<String>,
    /// When the round completed
    pub requested_at: Timestamp,
}

impl AggregationRequest {
    /// Create a request for a completed round.
    pub fn new(cluster: &str, round: usize, final_round: bool, best_weights: Option<String>) -> Self {
        Self {
            cluster: cluster.to_string(),
            round,
            final_round,
            best_weights,
            requested_at: now(),
        }
    }
}

/// Performs weight aggregation for a cluster.
#[async_trait]
pub trait AggregationTrigger: Send + Sync {
    /// Aggregate the weights of a completed round.
    async fn aggregate(&self, request: &AggregationRequest) -> Result<()>;
}

/// Trigger that only records the event in the log.
#[derive(Clone, Debug, Default)]
pub struct LoggingAggregator;

#[async_trait]
impl AggregationTrigger for LoggingAggregator {
    async fn aggregate(&self, request: &AggregationRequest) -> Result<()> {
        tracing::info!(
            cluster = %request.cluster,
            round = request.round,
            final_round = request.final_round,
            "model aggregated"
        );
        Ok(())
    }
}

/// Trigger that forwards requests to an external aggregator over a channel.
#[derive(Clone, Debug)]
pub struct ChannelAggregator {
    tx: mpsc::UnboundedSender<AggregationRequest>,
}

impl ChannelAggregator {
    /// Create the trigger and the receiving end for the aggregator.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AggregationRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AggregationTrigger for ChannelAggregator {
    async fn aggregate(&self, request: &AggregationRequest) -> Result<()> {
        self.tx
            .send(request.clone())
            .map_err(|_| Error::Aggregation("aggregator channel closed".into()))
    }
}

/// Runs triggers off the request path.
#[derive(Clone)]
pub struct AggregationDispatcher {
    trigger: Arc<dyn AggregationTrigger>,
}

impl AggregationDispatcher {
    /// Create a dispatcher for a trigger.
    pub fn new(trigger: Arc<dyn AggregationTrigger>) -> Self {
        Self { trigger }
    }

    /// Spawn the trigger. Failures are logged, never returned: the round
    /// has already been committed when this runs.
    pub fn dispatch(&self, request: AggregationRequest) -> JoinHandle<()> {
        let trigger = self.trigger.clone();
        tokio::spawn(async move {
            if let Err(e) = trigger.aggregate(&request).await {
                tracing::error!(
                    cluster = %request.cluster,
                    round = request.round,
                    error = %e,
                    "aggregation trigger failed"
                );
            }
        })
    }
}

impl Default for AggregationDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(LoggingAggregator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingAggregator;

    #[async_trait]
    impl AggregationTrigger for FailingAggregator {
        async fn aggregate(&self, _request: &AggregationRequest) -> Result<()> {
            Err(Error::Aggregation("boom".into()))
        }
    }

    #[tokio::test]
    async fn test_channel_aggregator() {
        let (trigger, mut rx) = ChannelAggregator::channel();
        let request = AggregationRequest::new("Cluster0", 1, true, Some("w".into()));
        trigger.aggregate(&request).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.cluster, "Cluster0");
        assert_eq!(received.round, 1);
        assert!(received.final_round);
    }

    #[tokio::test]
    async fn test_channel_closed() {
        let (trigger, rx) = ChannelAggregator::channel();
        drop(rx);
        let request = AggregationRequest::new("Cluster0", 0, false, None);
        assert!(matches!(
            trigger.aggregate(&request).await,
            Err(Error::Aggregation(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let dispatcher = AggregationDispatcher::new(Arc::new(FailingAggregator));
        let handle = dispatcher.dispatch(AggregationRequest::new("Cluster0", 0, false, None));
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_logging_aggregator() {
        let dispatcher = AggregationDispatcher::default();
        let handle = dispatcher.dispatch(AggregationRequest::new("Cluster3", 2, true, None));
        assert!(handle.await.is_ok());
    }
}
