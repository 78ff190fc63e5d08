use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::net::SocketAddr;
use tally_core::AppState;
use tally_models::identity::Identity;

use crate::error::ApiError;

pub struct AuthUser {
    pub user_id: i64,
}

impl AuthUser {
    pub fn identity(&self) -> Identity {
        Identity::User(self.user_id)
    }
}

fn extract_bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(parts).ok_or(ApiError::Unauthorized)?;
        let claims = tally_core::auth::validate_token(token, &state.config.jwt_secret)
            .map_err(|_| ApiError::Unauthorized)?;
        Ok(AuthUser {
            user_id: claims.sub,
        })
    }
}

/// Network address of an unauthenticated caller: the socket peer, or the
/// last `X-Forwarded-For` hop when the deployment trusts its proxy.
pub struct ClientAddress(pub String);

impl ClientAddress {
    pub fn identity(&self) -> Identity {
        Identity::Address(self.0.clone())
    }
}

/// The trusted proxy appends the peer it saw; every earlier hop is
/// client-supplied.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.rsplit(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl FromRequestParts<AppState> for ClientAddress {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.config.trust_proxy {
            if let Some(addr) = forwarded_for(&parts.headers) {
                return Ok(ClientAddress(addr));
            }
        }
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(peer)| ClientAddress(peer.ip().to_string()))
            .ok_or_else(|| ApiError::BadRequest("client address unavailable".into()))
    }
}
