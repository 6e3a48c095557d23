use crate::dtos::{HealthResponse, StatsResponse};
use crate::services::metrics::get_metrics;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

const SERVICE_NAME: &str = "callcenter-service";

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.registry.len(),
        timestamp: state.clock.now(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let now = state.clock.now();
    Json(StatsResponse::new(state.registry.stats(now), now))
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
