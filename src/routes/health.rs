use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(Serialize, ToSchema)]
pub struct HealthData {
    pub status: String,
    pub service: String,
    pub version: String,
}

fn health_data(status: &str) -> HealthData {
    HealthData {
        status: status.to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Liveness: answers without touching the database.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Process is up", body = ApiResponse<HealthData>),
    ),
    tag = "Health"
)]
pub async fn health_check() -> Json<ApiResponse<HealthData>> {
    Json(ApiResponse::success(
        "Health check",
        health_data("ok"),
        Some(Meta::empty()),
    ))
}

/// Readiness: checkout needs the database, so report unready without it.
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Database reachable", body = ApiResponse<HealthData>),
        (status = 503, description = "Database unreachable"),
    ),
    tag = "Health"
)]
pub async fn readiness(State(state): State<AppState>) -> AppResult<Json<ApiResponse<HealthData>>> {
    if let Err(err) = state.orm.ping().await {
        tracing::warn!(error = %err, "readiness check failed");
        return Err(AppError::ServiceUnavailable("Database unreachable".into()));
    }
    Ok(Json(ApiResponse::success(
        "Ready",
        health_data("ready"),
        Some(Meta::empty()),
    )))
}
