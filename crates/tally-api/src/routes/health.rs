use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tally_core::observability::{vote_metrics_snapshot, VoteMetricsSnapshot};
use tally_core::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub votes: VoteMetricsSnapshot,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match tally_db::ping(&state.db).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!("health: database ping failed: {err}");
            false
        }
    };
    let (status, label) = if database {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        status,
        Json(HealthResponse {
            status: label,
            database,
            votes: vote_metrics_snapshot(),
        }),
    )
}
