pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tally_core::AppState;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/api/polls",
            post(routes::polls::create_poll).get(routes::polls::list_polls),
        )
        .route(
            "/api/polls/{id}",
            get(routes::polls::get_poll)
                .patch(routes::polls::set_poll_active)
                .delete(routes::polls::delete_poll),
        )
        .route("/api/polls/{id}/results", get(routes::votes::get_results))
        .route("/api/vote", post(routes::votes::vote))
        .route("/api/public/polls/{id}", get(routes::polls::get_public_poll))
        .route("/api/public/vote", post(routes::votes::vote_public))
        .route(
            "/api/public/polls/{id}/results",
            get(routes::votes::get_public_results),
        )
        .layer(TraceLayer::new_for_http())
}

/// An empty list allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("cors: ignoring invalid origin {origin:?}");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60))
}
