use axum::{
    extract::State,
    Json,
};
use tally_core::AppState;
use tally_models::identity::Identity;
use tally_models::poll::{Poll, VoteAck, VoteRequest};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::{AuthUser, ClientAddress};

async fn submit(
    state: &AppState,
    body: VoteRequest,
    identity: Identity,
) -> Result<Json<VoteAck>, ApiError> {
    let vote = state
        .votes
        .record_vote(body.poll_id, body.option_id, &identity)
        .await?;
    Ok(Json(VoteAck {
        message: "Vote recorded successfully".to_string(),
        poll_id: vote.poll_id,
        option_id: vote.option_id,
    }))
}

pub async fn vote(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<VoteRequest>,
) -> Result<Json<VoteAck>, ApiError> {
    submit(&state, body, auth.identity()).await
}

pub async fn vote_public(
    State(state): State<AppState>,
    client: ClientAddress,
    ApiJson(body): ApiJson<VoteRequest>,
) -> Result<Json<VoteAck>, ApiError> {
    submit(&state, body, client.identity()).await
}

pub async fn get_results(
    State(state): State<AppState>,
    _auth: AuthUser,
    ApiPath(poll_id): ApiPath<i64>,
) -> Result<Json<Poll>, ApiError> {
    Ok(Json(state.results.compute_results(poll_id).await?))
}

pub async fn get_public_results(
    State(state): State<AppState>,
    ApiPath(poll_id): ApiPath<i64>,
) -> Result<Json<Poll>, ApiError> {
    Ok(Json(state.results.compute_results(poll_id).await?))
}
