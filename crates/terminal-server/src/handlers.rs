//! HTTP Handlers

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use terminal_core::{
    CancelAllReport, ChargeIntent, ConnectionToken, RECENT_INTENTS_LIMIT, ReaderState, RecoveryOps,
};

use crate::error::ApiResult;
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub processor: String,
    pub secret_key: String,
    pub location_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentResponse {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationIdResponse {
    pub location_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyLocationResponse {
    pub location_id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecentPaymentsResponse {
    pub payments: Vec<ChargeIntent>,
}

#[derive(Debug, Deserialize)]
pub struct CancelActionRequest {
    #[serde(default)]
    pub reader_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelActionResponse {
    pub reader_state: ReaderState,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check with masked credentials
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        processor: state.gateway.processor().name().to_string(),
        secret_key: state.masked_key.to_string(),
        location_id: state.gateway.location_id().unwrap_or_default().to_string(),
    })
}

/// Create a card-present intent
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(payload): Json<CreateIntentRequest>,
) -> ApiResult<Json<CreateIntentResponse>> {
    let created = match payload.currency.as_deref() {
        Some(currency) if !currency.trim().is_empty() => {
            state.gateway.create_intent(payload.amount, currency).await?
        }
        _ => state.gateway.create_intent_default(payload.amount).await?,
    };

    Ok(Json(CreateIntentResponse {
        id: created.id,
        client_secret: created.client_secret,
    }))
}

/// Mint a connection token for a reader session
pub async fn connection_token(State(state): State<AppState>) -> ApiResult<Json<ConnectionToken>> {
    Ok(Json(state.gateway.mint_connection_token().await?))
}

/// Configured terminal location
pub async fn get_location_id(State(state): State<AppState>) -> ApiResult<Json<LocationIdResponse>> {
    Ok(Json(LocationIdResponse {
        location_id: state.gateway.location_id()?.to_string(),
    }))
}

/// Confirm the configured location exists at the processor
pub async fn verify_location(
    State(state): State<AppState>,
) -> ApiResult<Json<VerifyLocationResponse>> {
    let location = state.gateway.verify_location().await?;
    Ok(Json(VerifyLocationResponse {
        location_id: location.id,
        display_name: location.display_name,
    }))
}

/// Most recent intents, newest first
pub async fn get_recent_payments(
    State(state): State<AppState>,
) -> ApiResult<Json<RecentPaymentsResponse>> {
    let payments = RecoveryOps::new(state.gateway.as_ref()).recent_payments().await?;
    Ok(Json(RecentPaymentsResponse { payments }))
}

/// Cancel the newest intent
pub async fn cancel_latest_payment_intent(
    State(state): State<AppState>,
) -> ApiResult<Json<ChargeIntent>> {
    Ok(Json(RecoveryOps::new(state.gateway.as_ref()).cancel_latest().await?))
}

/// Best-effort cancel of the recent intents
pub async fn cancel_all_payment_intents(
    State(state): State<AppState>,
) -> ApiResult<Json<CancelAllReport>> {
    let report = RecoveryOps::new(state.gateway.as_ref()).cancel_all().await?;
    tracing::info!(
        limit = RECENT_INTENTS_LIMIT,
        canceled = report.canceled.len(),
        failed = report.failed.len(),
        "Cancel-all requested"
    );
    Ok(Json(report))
}

/// Server-side cancel of a reader's current action
pub async fn cancel_reader_action(
    State(state): State<AppState>,
    Json(payload): Json<CancelActionRequest>,
) -> ApiResult<Json<CancelActionResponse>> {
    let reader_state = state.gateway.cancel_reader_action(&payload.reader_id).await?;
    Ok(Json(CancelActionResponse { reader_state }))
}
