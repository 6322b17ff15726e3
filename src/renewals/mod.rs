pub mod notification;
pub mod orchestrator;
pub mod scheduler;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::assets::store::AssetError;
use crate::email::DeliveryLogEntry;
use crate::renewals::notification::{
    compose_subject, resolve_default_recipient, RenewalNotificationRequest, ResolvedRecipient,
};
use crate::renewals::orchestrator::RenewalOutcome;
use crate::renewals::scheduler::{run_auto_invoice_pass, AutoInvoiceReport};
use crate::shared::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum RenewalError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Dispatch error: {0}")]
    Dispatch(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<AssetError> for RenewalError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::NotFound(id) => Self::NotFound(format!("Asset not found: {id}")),
            AssetError::Conflict(id) => {
                Self::Conflict(format!("Asset {id} was modified by another writer"))
            }
            AssetError::Validation(msg) => Self::Validation(msg),
            AssetError::Database(msg) => Self::Database(msg),
        }
    }
}

impl IntoResponse for RenewalError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::PreconditionFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            Self::Dispatch(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Self::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRenewalRequest {
    /// RFC 3339. A past date is legal and simply leaves the asset expired.
    pub expires_at: String,
    pub notification: Option<RenewalNotificationRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ComposeQuery {
    pub account_id: Uuid,
    pub asset_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ComposedNotification {
    pub recipient: ResolvedRecipient,
    pub subject: String,
    pub test_mode: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeliveriesQuery {
    pub limit: Option<i64>,
}

fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, RenewalError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| RenewalError::Validation(format!("Invalid expires_at date: {e}")))
}

pub async fn confirm_renewal(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<Uuid>,
    Json(req): Json<ConfirmRenewalRequest>,
) -> Result<Json<RenewalOutcome>, RenewalError> {
    let new_expires_at = parse_expiry(&req.expires_at)?;
    let outcome = state
        .orchestrator
        .confirm_renewal(asset_id, new_expires_at, req.notification)
        .await?;
    Ok(Json(outcome))
}

/// Prefill for the renewal notification form: default recipient and subject
/// for the account, with the deployment's test-mode default attached.
pub async fn compose_notification(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ComposeQuery>,
) -> Result<Json<ComposedNotification>, RenewalError> {
    let account = state.directory.get_account(query.account_id).await?;
    let recipient = resolve_default_recipient(&account);
    let subject = compose_subject(query.asset_name.as_deref(), None);

    Ok(Json(ComposedNotification {
        recipient,
        subject,
        test_mode: state.config.notifications.test_mode_default,
    }))
}

/// Entry point the external scheduler calls on its interval. One invocation
/// is one full scan-and-draft pass.
pub async fn run_auto_invoice(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AutoInvoiceReport>, RenewalError> {
    let report = run_auto_invoice_pass(&state.assets, &state.catalog, &state.invoices).await?;
    Ok(Json(report))
}

pub async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeliveriesQuery>,
) -> Result<Json<Vec<DeliveryLogEntry>>, RenewalError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let entries = state.deliveries.recent(limit).await?;
    Ok(Json(entries))
}

pub fn configure_renewals_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/assets/:id/renew", post(confirm_renewal))
        .route("/api/renewals/compose", get(compose_notification))
        .route("/api/renewals/auto-invoice/run", post(run_auto_invoice))
        .route("/api/renewals/deliveries", get(list_deliveries))
}
