//! Request handlers.

use crate::api::request::{
    ErrorResponse, HealthResponse, JoinRequest, JoinResponse, ResultRequest, ResultResponse,
};
use crate::api::server::AppState;
use crate::core::Error;
use crate::federated::coordinator::RoundSubmission;
use crate::federated::registry::JoinCommand;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

/// Error returned by handlers, mapped onto an HTTP status.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::MissingField(_) | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::ScoreConflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if self.0.is_client_error() {
            warn!(error = %self.0, "rejected request");
            self.0.to_string()
        } else {
            error!(error = %self.0, "request failed");
            "internal server error".to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// `POST /federated/clientData/`
pub async fn client_data(
    State(state): State<AppState>,
    body: Result<Json<JoinRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JoinResponse>), ApiError> {
    let Json(request) = body?;
    let command = JoinCommand::try_from(request)?;
    let outcome = state.registry.join_or_create(command).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// `POST /federated/communicationRound/`
pub async fn communication_round(
    State(state): State<AppState>,
    body: Result<Json<ResultRequest>, JsonRejection>,
) -> Result<Json<ResultResponse>, ApiError> {
    let Json(request) = body?;
    let submission = RoundSubmission::try_from(request)?;
    let outcome = state.coordinator.record_result(submission).await?;
    Ok(Json(outcome.into()))
}

/// `GET /health`
///
/// 200 with `"ok"` while the store reports healthy, 503 with `"degraded"`
/// otherwise.
pub async fn health(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<HealthResponse>), ApiError> {
    let store = state.registry.store();
    let healthy = store.health_check().await?;
    let clusters = store.count().await?;

    let (code, status) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        warn!(backend = %store.backend_type(), "store health check failed");
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    Ok((
        code,
        Json(HealthResponse {
            status: status.to_string(),
            clusters,
        }),
    ))
}
