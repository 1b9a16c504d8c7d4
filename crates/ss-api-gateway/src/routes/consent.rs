//! Consent endpoints.

use super::{AppState, RequestMeta};
use crate::domain::error::{ApiError, ApiResult};
use crate::domain::types::{
    parse_body, ConsentSubmitRequest, ConsentSubmitResponse, TemplatesQuery,
};
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde_json::{json, Value};
use ss_safeprotocol::{consent_template, consent_templates, ConsentCategory};
use tracing::{debug, instrument};

const SUBMIT_MESSAGE: &str =
    "Consent recorded successfully. You may now proceed to sign the document.";

#[instrument(skip_all)]
pub(super) async fn submit(
    State(state): State<AppState>,
    RequestMeta(mut context): RequestMeta,
    body: Bytes,
) -> ApiResult<Json<ConsentSubmitResponse>> {
    let submission = parse_body::<ConsentSubmitRequest>(&body)?.validate()?;
    if let Some(device_id) = submission.device_id {
        context = context.with_device_id(device_id);
    }

    let consented = state
        .api
        .submit_consent(submission.signer_id, &submission.categories, context)
        .await
        .map_err(|e| ApiError::from(e).or_internal("Failed to record consent"))?;

    Ok(Json(ConsentSubmitResponse {
        success: true,
        message: SUBMIT_MESSAGE,
        signer_id: submission.signer_id,
        consented_categories: consented,
    }))
}

/// `?category=` (or the older `?type=`) selects one template; without it
/// all are returned.
pub(super) async fn templates(
    query: Result<Query<TemplatesQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query.map_err(|e| {
        debug!(error = %e, "Rejected templates query");
        ApiError::invalid_field("query", "Unknown or repeated query parameter")
    })?;

    match query.category {
        Some(raw) => {
            let category: ConsentCategory = raw
                .parse()
                .map_err(|_| ApiError::invalid_field("category", "Unknown consent category"))?;
            Ok(Json(json!({
                "category": category,
                "text": consent_template(category),
            })))
        }
        None => Ok(Json(json!({ "templates": consent_templates() }))),
    }
}
