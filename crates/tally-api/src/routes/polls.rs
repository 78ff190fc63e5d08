use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tally_core::AppState;
use tally_models::poll::{CreatePollRequest, Poll, SetPollActiveRequest};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::AuthUser;

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub async fn create_poll(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<CreatePollRequest>,
) -> Result<(StatusCode, Json<Poll>), ApiError> {
    let poll = state.polls.create_poll(auth.user_id, &body).await?;
    Ok((StatusCode::CREATED, Json(poll)))
}

pub async fn list_polls(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Poll>>, ApiError> {
    let polls = state.polls.list_polls_by_creator(auth.user_id).await?;
    Ok(Json(polls))
}

pub async fn get_poll(
    State(state): State<AppState>,
    _auth: AuthUser,
    ApiPath(poll_id): ApiPath<i64>,
) -> Result<Json<Poll>, ApiError> {
    Ok(Json(state.polls.get_poll(poll_id).await?))
}

pub async fn get_public_poll(
    State(state): State<AppState>,
    ApiPath(poll_id): ApiPath<i64>,
) -> Result<Json<Poll>, ApiError> {
    Ok(Json(state.polls.get_poll(poll_id).await?))
}

pub async fn set_poll_active(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(poll_id): ApiPath<i64>,
    ApiJson(body): ApiJson<SetPollActiveRequest>,
) -> Result<Json<Poll>, ApiError> {
    let poll = state
        .polls
        .set_poll_active(poll_id, auth.user_id, body.is_active)
        .await?;
    Ok(Json(poll))
}

pub async fn delete_poll(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(poll_id): ApiPath<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.polls.delete_poll(poll_id, auth.user_id).await?;
    Ok(Json(MessageResponse {
        message: "Poll deleted successfully",
    }))
}
