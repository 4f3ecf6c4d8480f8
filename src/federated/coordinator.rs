//! Round coordinator.
//!
//! Records client results into a cluster's progress matrix and decides
//! when a round is complete and aggregation must run.

use crate::core::{Error, MatrixShape, Result, WeightPolicy};
use crate::federated::aggregator::{AggregationDispatcher, AggregationRequest};
use crate::federated::cluster::Cluster;
use crate::federated::matrix::CellState;
use crate::federated::registry::ClusterRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Outcome of a result submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundOutcome {
    /// The score was stored (or was already stored with the same value)
    Recorded,
    /// The round has not been opened for the cluster yet
    ClusterNotAssigned,
    /// No such cluster
    ClusterMissing,
    /// Round index beyond the configured rounds, or no free slot left
    RoundOutOfRange,
    /// The final round is complete and aggregation was triggered
    CallAggregator,
}

impl RoundOutcome {
    /// Message string used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundOutcome::Recorded => "Recorded",
            RoundOutcome::ClusterNotAssigned => "Cluster not yet assigned",
            RoundOutcome::ClusterMissing => "Cluster Does not Exist",
            RoundOutcome::RoundOutOfRange => "Round Number Too large",
            RoundOutcome::CallAggregator => "Call Aggregator",
        }
    }
}

impl std::fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client's report for one round.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundSubmission {
    /// Cluster name (without the round suffix)
    pub cluster: String,
    /// Round index
    pub round: usize,
    /// Best parameter the client reached
    pub best_param: f64,
    /// Serialized model weights
    pub weights: String,
    /// Score the best parameter must reach for the weights to count
    pub model_score: f64,
    /// Stable client identifier, when the client sends one
    pub client_id: Option<String>,
}

enum Slot {
    Fill(usize),
    Done(RoundOutcome),
}

/// Records round results and triggers aggregation.
pub struct RoundCoordinator {
    registry: Arc<ClusterRegistry>,
    dispatcher: AggregationDispatcher,
    policy: WeightPolicy,
}

impl RoundCoordinator {
    /// Create a coordinator.
    pub fn new(
        registry: Arc<ClusterRegistry>,
        dispatcher: AggregationDispatcher,
        policy: WeightPolicy,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            policy,
        }
    }

    /// Record a client's result for a round.
    pub async fn record_result(&self, submission: RoundSubmission) -> Result<RoundOutcome> {
        self.record(submission).await.map(|(outcome, _)| outcome)
    }

    /// Record a result, returning the handle of any aggregation it spawned.
    pub(crate) async fn record(
        &self,
        submission: RoundSubmission,
    ) -> Result<(RoundOutcome, Option<JoinHandle<()>>)> {
        let (outcome, request) = {
            let _guard = self.registry.lock_cluster(&submission.cluster).await;
            self.record_locked(&submission).await.map_err(|e| {
                if matches!(e, Error::MalformedMatrix(_)) {
                    error!(cluster = %submission.cluster, error = %e, "corrupt cluster state");
                }
                e
            })?
        };

        debug!(
            cluster = %submission.cluster,
            round = submission.round,
            outcome = %outcome,
            "result processed"
        );

        // The cluster lock is released before the trigger runs.
        let handle = request.map(|r| self.dispatcher.dispatch(r));
        Ok((outcome, handle))
    }

    /// Caller must hold the cluster's lock.
    async fn record_locked(
        &self,
        submission: &RoundSubmission,
    ) -> Result<(RoundOutcome, Option<AggregationRequest>)> {
        let shape = self.registry.shape();
        let round = submission.round;

        let Some(mut cluster) = self.registry.get(&submission.cluster).await? else {
            return Ok((RoundOutcome::ClusterMissing, None));
        };
        if cluster.is_retired() {
            let outcome = if round == shape.last_round() {
                RoundOutcome::CallAggregator
            } else {
                RoundOutcome::ClusterMissing
            };
            return Ok((outcome, None));
        }
        cluster.checked_matrix(shape)?;
        if round >= shape.rounds {
            return Ok((RoundOutcome::RoundOutOfRange, None));
        }

        let row = match select_slot(&cluster, submission, shape)? {
            Slot::Fill(row) => row,
            Slot::Done(outcome) => return Ok((outcome, None)),
        };

        self.apply_weights(&mut cluster, submission);
        cluster
            .checked_matrix_mut(shape)?
            .set(row, round, CellState::Scored(submission.best_param))?;
        if let Some(id) = &submission.client_id {
            cluster.slot_owners[row] = Some(id.clone());
        }

        let mut outcome = RoundOutcome::Recorded;
        let mut request = None;
        let complete = cluster.checked_matrix(shape)?.is_round_complete(round);
        if complete && !cluster.aggregated_rounds.contains(&round) {
            let final_round = round == shape.last_round();
            cluster.aggregated_rounds.push(round);
            request = Some(AggregationRequest::new(
                &cluster.name,
                round,
                final_round,
                cluster.best_weights.clone(),
            ));
            info!(cluster = %cluster.name, round, "round complete");

            if final_round {
                cluster.retire();
                outcome = RoundOutcome::CallAggregator;
                info!(cluster = %cluster.name, "cluster retired");
            }
        }

        self.registry.store().update(cluster).await?;
        Ok((outcome, request))
    }

    /// Adopt the submitted weights if the score qualifies under the policy.
    fn apply_weights(&self, cluster: &mut Cluster, submission: &RoundSubmission) {
        if submission.best_param < submission.model_score {
            return;
        }
        let adopt = match self.policy {
            WeightPolicy::FirstWriter => cluster.assign_counter == 1,
            WeightPolicy::BestScore => {
                cluster.assign_counter == 1
                    || cluster
                        .best_score
                        .map_or(true, |best| submission.best_param > best)
            }
        };
        if adopt {
            cluster.best_weights = Some(submission.weights.clone());
            cluster.best_score = Some(submission.best_param);
            cluster.assign_counter += 1;
            debug!(cluster = %cluster.name, score = submission.best_param, "adopted weights");
        }
    }
}

/// Pick the row a submission writes to.
fn select_slot(cluster: &Cluster, submission: &RoundSubmission, shape: MatrixShape) -> Result<Slot> {
    let matrix = cluster.checked_matrix(shape)?;
    let round = submission.round;

    if let Some(row) = submission
        .client_id
        .as_deref()
        .and_then(|id| cluster.slot_of(id))
    {
        return match matrix.cell(row, round) {
            Some(CellState::Scored(v)) if v == submission.best_param => {
                Ok(Slot::Done(RoundOutcome::Recorded))
            }
            Some(CellState::Scored(_)) => Err(Error::ScoreConflict {
                cluster: cluster.name.clone(),
                round,
            }),
            Some(CellState::Pending) => Ok(Slot::Fill(row)),
            _ => Ok(Slot::Done(RoundOutcome::ClusterNotAssigned)),
        };
    }

    if matrix.is_round_unopened(round) {
        return Ok(Slot::Done(RoundOutcome::ClusterNotAssigned));
    }

    let free = (0..shape.clients).find(|&row| {
        matrix.cell(row, round) == Some(CellState::Pending) && cluster.slot_owners[row].is_none()
    });
    Ok(match free {
        Some(row) => Slot::Fill(row),
        None => Slot::Done(RoundOutcome::RoundOutOfRange),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federated::aggregator::ChannelAggregator;
    use crate::federated::fixtures;
    use crate::federated::matrix::ProgressMatrix;
    use tokio::sync::mpsc::UnboundedReceiver;

    const THRESHOLD: f64 = 0.85;

    fn coordinator(
        clients: usize,
        rounds: usize,
        policy: WeightPolicy,
    ) -> (RoundCoordinator, UnboundedReceiver<AggregationRequest>) {
        let registry = Arc::new(fixtures::registry(clients, rounds));
        let (trigger, rx) = ChannelAggregator::channel();
        let dispatcher = AggregationDispatcher::new(Arc::new(trigger));
        (RoundCoordinator::new(registry, dispatcher, policy), rx)
    }

    fn submission(round: usize, score: f64, weights: &str) -> RoundSubmission {
        RoundSubmission {
            cluster: "Cluster0".into(),
            round,
            best_param: score,
            weights: weights.into(),
            model_score: THRESHOLD,
            client_id: None,
        }
    }

    fn from_client(client: &str, round: usize, score: f64) -> RoundSubmission {
        RoundSubmission {
            client_id: Some(client.into()),
            ..submission(round, score, "w")
        }
    }

    async fn cluster(c: &RoundCoordinator) -> Cluster {
        c.registry.get("Cluster0").await.unwrap().unwrap()
    }

    async fn record(c: &RoundCoordinator, s: RoundSubmission) -> RoundOutcome {
        let (outcome, handle) = c.record(s).await.unwrap();
        if let Some(handle) = handle {
            handle.await.unwrap();
        }
        outcome
    }

    #[test]
    fn test_outcome_strings() {
        assert_eq!(RoundOutcome::Recorded.to_string(), "Recorded");
        assert_eq!(
            RoundOutcome::ClusterNotAssigned.to_string(),
            "Cluster not yet assigned"
        );
        assert_eq!(RoundOutcome::ClusterMissing.to_string(), "Cluster Does not Exist");
        assert_eq!(RoundOutcome::RoundOutOfRange.to_string(), "Round Number Too large");
        assert_eq!(RoundOutcome::CallAggregator.to_string(), "Call Aggregator");
    }

    #[tokio::test]
    async fn test_full_lifecycle_three_clients_two_rounds() {
        let (c, mut rx) = coordinator(3, 2, WeightPolicy::FirstWriter);
        let a = c.registry.assign(3).await.unwrap();
        assert_eq!(a.tag(), "Cluster0_0");

        for (score, w) in [(0.9, "w1"), (0.8, "w2"), (0.95, "w3")] {
            assert_eq!(record(&c, submission(0, score, w)).await, RoundOutcome::Recorded);
        }

        let after_round0 = cluster(&c).await;
        let matrix = after_round0.matrix.clone().unwrap();
        let scores: Vec<_> = matrix.column(0).collect();
        assert_eq!(
            scores,
            vec![
                CellState::Scored(0.9),
                CellState::Scored(0.8),
                CellState::Scored(0.95)
            ]
        );
        // First qualifying writer wins the round
        assert_eq!(after_round0.best_weights.as_deref(), Some("w1"));
        assert_eq!(after_round0.assign_counter, 2);

        let first = rx.try_recv().unwrap();
        assert_eq!((first.round, first.final_round), (0, false));

        // Round 1 is not open until a client joins it
        assert_eq!(
            record(&c, submission(1, 0.9, "w")).await,
            RoundOutcome::ClusterNotAssigned
        );

        let a = c.registry.assign(3).await.unwrap();
        assert_eq!(a.tag(), "Cluster0_1");
        assert_eq!(cluster(&c).await.assign_counter, 1);

        assert_eq!(record(&c, submission(1, 0.91, "v1")).await, RoundOutcome::Recorded);
        assert_eq!(record(&c, submission(1, 0.92, "v2")).await, RoundOutcome::Recorded);
        assert_eq!(
            record(&c, submission(1, 0.93, "v3")).await,
            RoundOutcome::CallAggregator
        );

        let last = rx.try_recv().unwrap();
        assert_eq!((last.round, last.final_round), (1, true));
        assert_eq!(last.best_weights.as_deref(), Some("v1"));

        let retired = cluster(&c).await;
        assert!(retired.is_retired());
        assert_eq!(retired.assign_counter, 0);

        // Late final-round submissions do not trigger again
        assert_eq!(
            record(&c, submission(1, 0.5, "late")).await,
            RoundOutcome::CallAggregator
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(c.registry.active_locks(), 0);
    }

    #[tokio::test]
    async fn test_round_out_of_range() {
        let (c, _rx) = coordinator(3, 2, WeightPolicy::FirstWriter);
        c.registry.assign(1).await.unwrap();

        assert_eq!(
            record(&c, submission(2, 0.9, "w")).await,
            RoundOutcome::RoundOutOfRange
        );
        assert_eq!(
            record(&c, submission(7, 0.9, "w")).await,
            RoundOutcome::RoundOutOfRange
        );
    }

    #[tokio::test]
    async fn test_cluster_missing() {
        let (c, _rx) = coordinator(3, 2, WeightPolicy::FirstWriter);
        assert_eq!(
            record(&c, submission(0, 0.9, "w")).await,
            RoundOutcome::ClusterMissing
        );
    }

    #[tokio::test]
    async fn test_unknown_clusters_leave_no_locks() {
        let (c, _rx) = coordinator(3, 2, WeightPolicy::FirstWriter);
        for i in 0..5000 {
            let s = RoundSubmission {
                cluster: format!("unknown{}", i),
                ..submission(0, 0.9, "w")
            };
            assert_eq!(c.record_result(s).await.unwrap(), RoundOutcome::ClusterMissing);
        }
        assert_eq!(c.registry.active_locks(), 0);
    }

    #[tokio::test]
    async fn test_retired_cluster_earlier_round_is_missing() {
        let (c, _rx) = coordinator(1, 2, WeightPolicy::FirstWriter);
        c.registry.assign(1).await.unwrap();
        let mut stored = cluster(&c).await;
        stored.retire();
        c.registry.store().update(stored).await.unwrap();

        assert_eq!(
            record(&c, submission(0, 0.9, "w")).await,
            RoundOutcome::ClusterMissing
        );
    }

    #[tokio::test]
    async fn test_round_full_for_anonymous_caller() {
        let (c, _rx) = coordinator(2, 3, WeightPolicy::FirstWriter);
        c.registry.assign(1).await.unwrap();

        assert_eq!(record(&c, from_client("a", 0, 0.9)).await, RoundOutcome::Recorded);
        // Row 1 still pending but unowned; an anonymous caller takes it
        assert_eq!(record(&c, submission(0, 0.7, "w")).await, RoundOutcome::Recorded);
        // Round complete, nothing left to fill
        assert_eq!(
            record(&c, submission(0, 0.6, "w")).await,
            RoundOutcome::RoundOutOfRange
        );
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_idempotent() {
        let (c, _rx) = coordinator(3, 2, WeightPolicy::FirstWriter);
        c.registry.assign(1).await.unwrap();

        let s = RoundSubmission {
            client_id: Some("phone-1".into()),
            ..submission(0, 0.9, "w1")
        };
        assert_eq!(record(&c, s.clone()).await, RoundOutcome::Recorded);
        let before = cluster(&c).await;

        assert_eq!(record(&c, s).await, RoundOutcome::Recorded);
        let after = cluster(&c).await;

        assert_eq!(after.best_weights, before.best_weights);
        assert_eq!(after.assign_counter, before.assign_counter);
        assert_eq!(after.version, before.version);
        assert_eq!(after.matrix, before.matrix);
    }

    #[tokio::test]
    async fn test_conflicting_resubmission_rejected() {
        let (c, _rx) = coordinator(3, 2, WeightPolicy::FirstWriter);
        c.registry.assign(1).await.unwrap();

        record(&c, from_client("phone-1", 0, 0.9)).await;
        let err = c.record(from_client("phone-1", 0, 0.4)).await.unwrap_err();
        assert!(matches!(err, Error::ScoreConflict { round: 0, .. }));

        let matrix = cluster(&c).await.matrix.unwrap();
        assert_eq!(matrix.cell(0, 0), Some(CellState::Scored(0.9)));
    }

    #[tokio::test]
    async fn test_identified_client_keeps_its_row() {
        let (c, _rx) = coordinator(2, 2, WeightPolicy::FirstWriter);
        c.registry.assign(1).await.unwrap();

        record(&c, submission(0, 0.5, "w")).await;
        record(&c, from_client("b", 0, 0.6)).await;
        c.registry.assign(1).await.unwrap();

        assert_eq!(record(&c, from_client("b", 1, 0.7)).await, RoundOutcome::Recorded);
        let matrix = cluster(&c).await.matrix.unwrap();
        assert_eq!(matrix.cell(1, 1), Some(CellState::Scored(0.7)));
        assert_eq!(matrix.cell(0, 1), Some(CellState::Pending));
    }

    #[tokio::test]
    async fn test_identified_client_round_not_open() {
        let (c, _rx) = coordinator(2, 2, WeightPolicy::FirstWriter);
        c.registry.assign(1).await.unwrap();
        record(&c, from_client("a", 0, 0.5)).await;

        assert_eq!(
            record(&c, from_client("a", 1, 0.5)).await,
            RoundOutcome::ClusterNotAssigned
        );
    }

    #[tokio::test]
    async fn test_below_threshold_never_adopted() {
        let (c, _rx) = coordinator(2, 2, WeightPolicy::FirstWriter);
        c.registry.assign(1).await.unwrap();

        record(&c, submission(0, 0.1, "weak")).await;
        let stored = cluster(&c).await;
        assert_eq!(stored.best_weights, None);
        assert_eq!(stored.assign_counter, 1);
    }

    #[tokio::test]
    async fn test_best_score_policy_improves() {
        let (c, _rx) = coordinator(3, 2, WeightPolicy::BestScore);
        c.registry.assign(1).await.unwrap();

        record(&c, submission(0, 0.9, "w1")).await;
        record(&c, submission(0, 0.88, "w2")).await;
        record(&c, submission(0, 0.97, "w3")).await;

        let stored = cluster(&c).await;
        assert_eq!(stored.best_weights.as_deref(), Some("w3"));
        assert_eq!(stored.best_score, Some(0.97));
        assert_eq!(stored.assign_counter, 3);
    }

    #[tokio::test]
    async fn test_malformed_matrix_is_error() {
        let (c, _rx) = coordinator(3, 2, WeightPolicy::FirstWriter);
        let mut broken = Cluster::new("Cluster0", MatrixShape::new(3, 2));
        broken.matrix = Some(ProgressMatrix::fresh(MatrixShape::new(3, 1)));
        c.registry.store().insert(broken).await.unwrap();

        let err = c.record(submission(0, 0.9, "w")).await.unwrap_err();
        assert!(matches!(err, Error::MalformedMatrix(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_writer_wins() {
        let (c, _rx) = coordinator(8, 2, WeightPolicy::FirstWriter);
        let c = Arc::new(c);
        c.registry.assign(1).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let c = c.clone();
                tokio::spawn(async move {
                    c.record_result(submission(0, 0.9 + i as f64 / 100.0, &format!("w{}", i)))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), RoundOutcome::Recorded);
        }

        let stored = cluster(&c).await;
        assert_eq!(stored.assign_counter, 2);
        let winner = stored.best_weights.unwrap();
        assert!(winner.starts_with('w'));
        // Every row filled exactly once
        assert!(stored.matrix.unwrap().is_round_complete(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_aggregation_fires_once_per_round() {
        let (c, mut rx) = coordinator(4, 1, WeightPolicy::FirstWriter);
        let c = Arc::new(c);
        c.registry.assign(1).await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let c = c.clone();
                tokio::spawn(async move { c.record(submission(0, 0.5 + i as f64 / 100.0, "w")).await.unwrap() })
            })
            .collect();

        let mut completing = 0;
        for handle in handles {
            let (_, spawned) = handle.await.unwrap();
            if let Some(spawned) = spawned {
                spawned.await.unwrap();
                completing += 1;
            }
        }

        assert_eq!(completing, 1);
        let request = rx.try_recv().unwrap();
        assert!(request.final_round);
        assert!(rx.try_recv().is_err());
    }
}
