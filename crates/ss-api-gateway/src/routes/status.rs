use super::AppState;
use crate::domain::error::{ApiError, ApiResult};
use crate::domain::types::SignerStatusResponse;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

pub(super) async fn signer_status(
    State(state): State<AppState>,
    Path(signer_id): Path<String>,
) -> ApiResult<Json<SignerStatusResponse>> {
    let signer_id = Uuid::parse_str(&signer_id)
        .map_err(|_| ApiError::invalid_field("signerId", "Invalid signer ID"))?;

    let status = state
        .api
        .signer_status(signer_id)
        .await
        .map_err(|e| ApiError::from(e).or_internal("Failed to load signer status"))?;
    Ok(Json(status.into()))
}

/// Health check endpoint
pub(super) async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "safeprotocol-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
