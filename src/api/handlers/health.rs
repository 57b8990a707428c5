use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub decoder: String,
    pub staging_dir: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let staging = state.conversion.staging().root();

    // The staging directory is created on first upload, so absence is fine
    let staging_status = match tokio::fs::metadata(staging).await {
        Ok(meta) if meta.is_dir() => "ready",
        Ok(_) => "not_a_directory",
        Err(_) => "pending",
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        decoder: state.conversion.decoder_name().to_string(),
        staging_dir: staging_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
