//! Identity verification endpoints: init, collect, cancel.

use super::{AppState, RequestMeta};
use crate::domain::error::{ApiError, ApiResult};
use crate::domain::types::{
    parse_body, CancelResponse, CollectResponse, InitVerificationRequest,
    InitVerificationResponse, OrderRequest, VerifiedSignerBody,
};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ss_safeprotocol::VerificationOutcome;
use tracing::instrument;

const INIT_MESSAGE: &str =
    "BankID authentication initiated. Complete the authentication on your device.";
const PENDING_MESSAGE: &str = "Awaiting authentication on your device...";
const COMPLETE_MESSAGE: &str =
    "Identity verified successfully. You may now proceed to sign the document.";

#[instrument(skip_all)]
pub(super) async fn init(
    State(state): State<AppState>,
    RequestMeta(context): RequestMeta,
    body: Bytes,
) -> ApiResult<Json<InitVerificationResponse>> {
    let (signer_id, personal_number) = parse_body::<InitVerificationRequest>(&body)?.validate()?;

    let tokens = state
        .api
        .start_verification(signer_id, personal_number, context)
        .await
        .map_err(|e| ApiError::from(e).or_internal("Failed to initiate BankID authentication"))?;

    Ok(Json(InitVerificationResponse {
        success: true,
        order_ref: tokens.order_ref,
        auto_start_token: tokens.auto_start_token,
        signer_id,
        message: INIT_MESSAGE,
    }))
}

#[instrument(skip_all)]
pub(super) async fn collect(
    State(state): State<AppState>,
    RequestMeta(context): RequestMeta,
    body: Bytes,
) -> ApiResult<Response> {
    let (order_ref, signer_id) = parse_body::<OrderRequest>(&body)?.validate()?;

    let outcome = state
        .api
        .check_verification(&order_ref, signer_id, context)
        .await
        .map_err(|e| ApiError::from(e).or_internal("Failed to check BankID status"))?;

    let response = match outcome {
        VerificationOutcome::Pending { hint_code } => Json(CollectResponse::Pending {
            hint_code,
            message: PENDING_MESSAGE,
        })
        .into_response(),
        VerificationOutcome::Failed { error, error_code } => (
            StatusCode::BAD_REQUEST,
            Json(CollectResponse::Failed { error, error_code }),
        )
            .into_response(),
        VerificationOutcome::Complete { signer } => Json(CollectResponse::Complete {
            verified: true,
            signer: VerifiedSignerBody {
                id: signer.id,
                verified_name: signer.verified_name,
                verified_email: signer.verified_email,
            },
            message: COMPLETE_MESSAGE,
        })
        .into_response(),
    };
    Ok(response)
}

#[instrument(skip_all)]
pub(super) async fn cancel(
    State(state): State<AppState>,
    RequestMeta(context): RequestMeta,
    body: Bytes,
) -> ApiResult<Json<CancelResponse>> {
    let (order_ref, signer_id) = parse_body::<OrderRequest>(&body)?.validate()?;

    let cancelled = state
        .api
        .cancel_verification(&order_ref, signer_id, context)
        .await
        .map_err(|e| ApiError::from(e).or_internal("Failed to cancel BankID authentication"))?;

    Ok(Json(CancelResponse {
        success: true,
        cancelled,
    }))
}
