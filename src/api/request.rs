//! Wire types for the federated endpoints.
//!
//! Request bodies are decoded leniently (every field optional, numbers as
//! JSON numbers or numeric strings) and converted once into typed commands.

use crate::core::{split_cluster_tag, Error, Result};
use crate::federated::coordinator::{RoundOutcome, RoundSubmission};
use crate::federated::registry::{JoinCommand, JoinOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::IntErrorKind;

/// Round suffix of a deletion-state lookup.
pub const LOOKUP_SENTINEL: &str = "-1";
/// Round suffix of an assignment request.
pub const ASSIGN_SENTINEL: &str = "-3";
/// Base name that accompanies [`ASSIGN_SENTINEL`].
pub const ASSIGN_BASE: &str = "z";

/// Body of `POST /federated/clientData/`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// One entry per requested training record
    pub apps: Option<Vec<Value>>,
    /// `"<base>_<sentinel>"`
    pub cluster_name: Option<String>,
}

impl TryFrom<JoinRequest> for JoinCommand {
    type Error = Error;

    fn try_from(req: JoinRequest) -> Result<Self> {
        let apps = req
            .apps
            .filter(|apps| !apps.is_empty())
            .ok_or_else(|| Error::MissingField("apps".into()))?;
        let name = required_name(req.cluster_name)?;

        match split_cluster_tag(&name) {
            Some((base, LOOKUP_SENTINEL)) => Ok(JoinCommand::Lookup {
                cluster: base.to_string(),
            }),
            Some((ASSIGN_BASE, ASSIGN_SENTINEL)) => Ok(JoinCommand::Assign { batch: apps.len() }),
            _ => Err(Error::InvalidRequest(format!(
                "clusterName {:?} is neither a lookup nor an assignment request",
                name
            ))),
        }
    }
}

/// Body of `POST /federated/communicationRound/`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRequest {
    /// `"<cluster>_<round>"`
    pub cluster_name: Option<String>,
    /// Serialized model weights (any JSON value)
    pub weights: Option<Value>,
    /// Best parameter reached by the client
    pub best_param: Option<Value>,
    /// Threshold for adopting the weights
    pub model_predict: Option<Value>,
    /// Stable client identifier
    pub client_id: Option<String>,
}

impl TryFrom<ResultRequest> for RoundSubmission {
    type Error = Error;

    fn try_from(req: ResultRequest) -> Result<Self> {
        let name = required_name(req.cluster_name)?;
        let (cluster, suffix) = split_cluster_tag(&name).ok_or_else(|| {
            Error::InvalidRequest(format!("clusterName {:?} has no round suffix", name))
        })?;
        let round = match suffix.parse::<usize>() {
            Ok(round) => round,
            // Too large for any configuration; the coordinator reports it
            Err(e) if *e.kind() == IntErrorKind::PosOverflow => usize::MAX,
            Err(_) => {
                return Err(Error::InvalidRequest(format!(
                    "round {:?} is not a round index",
                    suffix
                )))
            }
        };

        let weights = match req.weights {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => return Err(Error::MissingField("weights".into())),
            Some(other) => other.to_string(),
        };

        Ok(RoundSubmission {
            cluster: cluster.to_string(),
            round,
            best_param: number("bestParam", req.best_param)?,
            weights,
            model_score: number("modelPredict", req.model_predict)?,
            client_id: req.client_id.filter(|id| !id.is_empty()),
        })
    }
}

fn required_name(name: Option<String>) -> Result<String> {
    name.filter(|n| !n.is_empty())
        .ok_or_else(|| Error::MissingField("clusterName".into()))
}

/// Read a finite number sent either as a JSON number or a numeric string.
fn number(field: &str, value: Option<Value>) -> Result<f64> {
    let parsed = match value {
        None | Some(Value::Null) => return Err(Error::MissingField(field.into())),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::InvalidRequest(format!("{} must be a finite number", field)))
}

/// Response of `POST /federated/clientData/`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum JoinResponse {
    Lookup {
        #[serde(rename = "Cluster")]
        status: String,
        #[serde(rename = "Round")]
        round: String,
        #[serde(rename = "Epoch")]
        epoch: u32,
        #[serde(rename = "modelData")]
        model_data: Vec<String>,
    },
    Assigned {
        #[serde(rename = "Cluster")]
        cluster: String,
        #[serde(rename = "Round")]
        round_count: usize,
        #[serde(rename = "Epoch")]
        epoch: u32,
        #[serde(rename = "Slot")]
        slot: usize,
        #[serde(rename = "modelData")]
        model_data: String,
    },
}

impl From<JoinOutcome> for JoinResponse {
    fn from(outcome: JoinOutcome) -> Self {
        match outcome {
            JoinOutcome::Lookup {
                state, epoch_count, ..
            } => JoinResponse::Lookup {
                status: state.to_string(),
                round: LOOKUP_SENTINEL.to_string(),
                epoch: epoch_count,
                model_data: Vec::new(),
            },
            JoinOutcome::Assigned(a) => JoinResponse::Assigned {
                cluster: a.tag(),
                round_count: a.round_count,
                epoch: a.epoch_count,
                slot: a.slot,
                model_data: a.shard.to_text(),
            },
        }
    }
}

/// Response of `POST /federated/communicationRound/`.
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub msg: String,
}

impl From<RoundOutcome> for ResultResponse {
    fn from(outcome: RoundOutcome) -> Self {
        Self {
            msg: outcome.to_string(),
        }
    }
}

/// Response of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub clusters: u64,
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
