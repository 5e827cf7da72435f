//! Routes and handlers.

use axum::extract::{Path, State};
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use forgehand_core_types::SolutionId;
use knowledge_center::RewardOutcome;

use crate::errors::ApiError;
use crate::service::{
    DevelopBody, DevelopResponse, RewardBody, SolutionView, ValidateBody,
};

use super::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/low-code/develop", post(develop))
        .route("/api/low-code/validate", post(validate))
        .route("/api/low-code/reward", post(reward))
        .route("/api/low-code/solutions/:id", get(solution))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "forgehand",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn develop(
    State(state): State<AppState>,
    Json(body): Json<DevelopBody>,
) -> Result<Json<DevelopResponse>, ApiError> {
    let response = state.service.develop(body).await?;
    Ok(Json(response))
}

async fn validate(
    State(state): State<AppState>,
    Json(body): Json<ValidateBody>,
) -> Result<Json<forgehand_core_types::ValidationResult>, ApiError> {
    let result = state.service.validate(body).await?;
    Ok(Json(result))
}

async fn reward(
    State(state): State<AppState>,
    Json(body): Json<RewardBody>,
) -> Result<Json<RewardOutcome>, ApiError> {
    let outcome = state.service.reward(body).await?;
    Ok(Json(outcome))
}

async fn solution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SolutionView>, ApiError> {
    let view = state.service.solution(&SolutionId(id))?;
    Ok(Json(view))
}
