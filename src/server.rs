// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! REST API over the ingestion, checkout and analysis flows.
//!
//! ## Endpoints
//!
//! - `POST /api/upload` - multipart `file` + optional `accountId`
//! - `POST /api/upload-by-url` - `{fileUrl, accountId, originalFileName}`
//! - `POST /api/upload-raw` - raw bytes, `x-file-name` / `x-account-id` headers
//! - `POST /api/create-order` - `{accountId, amount, description}`
//! - `GET /api/capture-order?token=` - redirects to the success page
//! - `POST /webhook` - gateway events, acknowledged and logged
//! - `POST /api/analyze` - `{documentId, accountId}`
//! - `GET /api/balance?accountId=`
//! - `GET /health`
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/api/upload-raw \
//!   -H "x-file-name: brief.pdf" -H "x-account-id: user-1" \
//!   --data-binary @brief.pdf
//!
//! curl -X POST http://localhost:3000/api/analyze \
//!   -H "Content-Type: application/json" \
//!   -d '{"documentId": "…", "accountId": "user-1"}'
//! ```

use crate::analysis::{AnalysisFlow, AnalysisResult};
use crate::base::{AccountId, DocumentId};
use crate::checkout::CheckoutFlow;
use crate::config::Config;
use crate::document::DocumentStore;
use crate::error::{LedgerError, ServiceError};
use crate::extract::TextExtractor;
use crate::gateway::PaymentGateway;
use crate::ingest::{IngestFlow, Ingested};
use crate::ledger::Ledger;
use crate::llm::AnalysisClient;
use crate::storage::BlobStore;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadByUrlRequest {
    pub file_url: Option<String>,
    pub account_id: Option<String>,
    pub original_file_name: Option<String>,
}

/// `amount` may arrive as a JSON string or number.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub account_id: Option<String>,
    pub amount: Option<Value>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CaptureQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub document_id: Option<String>,
    pub account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub account_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub ok: bool,
    pub document_id: DocumentId,
    pub has_text: bool,
}

impl From<Ingested> for UploadResponse {
    fn from(ingested: Ingested) -> Self {
        Self {
            ok: true,
            document_id: ingested.document_id,
            has_text: ingested.has_text,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub approval_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub ok: bool,
    pub document_id: DocumentId,
    pub result: AnalysisResult,
    pub remaining_credits: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub account_id: AccountId,
    pub credits: u64,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state: the stores and the flows built on them.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<dyn Ledger>,
    pub documents: Arc<dyn DocumentStore>,
    pub checkout: Arc<CheckoutFlow>,
    pub analysis: Arc<AnalysisFlow>,
    pub ingest: Arc<IngestFlow>,
}

/// External collaborators the state is wired with.
pub struct Collaborators {
    pub gateway: Arc<dyn PaymentGateway>,
    pub analysis_client: Arc<dyn AnalysisClient>,
    pub blobs: Arc<dyn BlobStore>,
    pub extractor: Arc<dyn TextExtractor>,
}

impl AppState {
    pub fn new(
        config: Config,
        ledger: Arc<dyn Ledger>,
        documents: Arc<dyn DocumentStore>,
        collaborators: Collaborators,
    ) -> Result<Self, ServiceError> {
        let checkout = CheckoutFlow::new(
            collaborators.gateway,
            Arc::clone(&ledger),
            config.credit_policy,
            config.order_description.clone(),
            config.outbound_timeout,
        );
        let analysis = AnalysisFlow::new(
            Arc::clone(&documents),
            Arc::clone(&ledger),
            collaborators.analysis_client,
            config.analysis_cost,
            config.max_prompt_chars,
            config.outbound_timeout,
        );
        let ingest = IngestFlow::new(
            collaborators.blobs,
            collaborators.extractor,
            Arc::clone(&documents),
            config.max_upload_bytes,
            config.outbound_timeout,
        )?;
        Ok(Self {
            config: Arc::new(config),
            ledger,
            documents,
            checkout: Arc::new(checkout),
            analysis: Arc::new(analysis),
            ingest: Arc::new(ingest),
        })
    }
}

// === Error Handling ===

/// Wrapper for converting `ServiceError` into HTTP responses.
pub struct AppError(ServiceError);

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        AppError(err)
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            ServiceError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ServiceError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "DOCUMENT_NOT_FOUND"),
            ServiceError::InsufficientCredits { .. }
            | ServiceError::Ledger(LedgerError::InsufficientCredits { .. }) => {
                (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_CREDITS")
            }
            ServiceError::NoExtractableText(_) => (StatusCode::BAD_REQUEST, "NO_EXTRACTABLE_TEXT"),
            ServiceError::Gateway(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR"),
            ServiceError::GatewayTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT"),
            ServiceError::CaptureInProgress(_) => (StatusCode::CONFLICT, "CAPTURE_IN_PROGRESS"),
            ServiceError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ServiceError::DownloadTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "DOWNLOAD_TIMEOUT")
            }
            ServiceError::Analysis(_) => (StatusCode::BAD_GATEWAY, "ANALYSIS_ERROR"),
            ServiceError::AnalysisTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "ANALYSIS_TIMEOUT")
            }
            ServiceError::Ledger(LedgerError::InvalidAmount) => {
                (StatusCode::BAD_REQUEST, "INVALID_AMOUNT")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            warn!(code, "request failed: {}", self.0);
        }

        (
            status,
            Json(ErrorResponse {
                ok: false,
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError(ServiceError::Validation(format!("{field} is required"))))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// === Handlers ===

/// POST /api/upload - multipart upload.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(Bytes, Option<String>)> = None;
    let mut account_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::Validation(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::Validation(format!("unreadable file field: {e}")))?;
                file = Some((bytes, name));
            }
            Some("accountId") => {
                account_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ServiceError::Validation(format!("unreadable accountId: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let (bytes, name) =
        file.ok_or_else(|| ServiceError::Validation("file is required".into()))?;
    let ingested = state
        .ingest
        .ingest(&bytes, name.as_deref(), account_id.as_deref())
        .await?;
    Ok(Json(ingested.into()))
}

/// POST /api/upload-by-url - fetch a remote PDF, then ingest it.
async fn upload_by_url(
    State(state): State<AppState>,
    Json(request): Json<UploadByUrlRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    let file_url = required(request.file_url, "fileUrl")?;
    let fetched = state.ingest.fetch_remote(&file_url).await?;
    let name = request
        .original_file_name
        .filter(|n| !n.trim().is_empty())
        .or(fetched.file_name);
    let ingested = state
        .ingest
        .ingest(&fetched.bytes, name.as_deref(), request.account_id.as_deref())
        .await?;
    Ok(Json(ingested.into()))
}

/// POST /api/upload-raw - request body is the file.
async fn upload_raw(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    let ingested = state
        .ingest
        .ingest(
            &body,
            header_str(&headers, "x-file-name"),
            header_str(&headers, "x-account-id"),
        )
        .await?;
    Ok(Json(ingested.into()))
}

/// POST /api/create-order - start a checkout.
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let amount = match request.amount {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => {
            return Err(ServiceError::Validation(format!("amount {other} is not a number")).into());
        }
    };
    let order = state
        .checkout
        .initiate_checkout(
            AccountId::resolve(request.account_id.as_deref()),
            amount.as_deref(),
            request.description.as_deref(),
        )
        .await?;
    Ok(Json(CreateOrderResponse {
        order_id: order.order_id.to_string(),
        approval_url: order.approval_url,
    }))
}

/// GET /api/capture-order - gateway return URL.
async fn capture_order(
    State(state): State<AppState>,
    Query(query): Query<CaptureQuery>,
) -> Result<Redirect, AppError> {
    let token = required(query.token, "token")?;
    let outcome = state.checkout.finalize_checkout(&token).await?;

    let mut target = reqwest::Url::parse(&state.config.success_url)
        .map_err(|e| ServiceError::Validation(format!("invalid success URL: {e}")))?;
    target
        .query_pairs_mut()
        .append_pair("accountId", outcome.account_id.as_str())
        .append_pair("credits", &outcome.new_balance.to_string());
    Ok(Redirect::to(target.as_str()))
}

/// POST /webhook - acknowledged and logged, never touches the ledger.
async fn webhook(body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(event) => {
            let event_type = event.get("event_type").and_then(Value::as_str).unwrap_or("unknown");
            let resource = event.pointer("/resource/id").and_then(Value::as_str).unwrap_or("-");
            info!(event_type, resource, "gateway webhook received");
        }
        Err(e) => warn!("gateway webhook with unparseable body: {}", e),
    }
    Json(serde_json::json!({ "received": true }))
}

/// POST /api/analyze - the paid operation.
async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let document_id = DocumentId::new(required(request.document_id, "documentId")?);
    let outcome = state
        .analysis
        .analyze(&document_id, request.account_id.as_deref())
        .await?;
    Ok(Json(AnalyzeResponse {
        ok: true,
        document_id: outcome.document_id,
        result: outcome.result,
        remaining_credits: outcome.remaining_credits,
    }))
}

/// GET /api/balance - read-only.
async fn balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Json<BalanceResponse> {
    let account_id = AccountId::resolve(query.account_id.as_deref());
    Json(BalanceResponse {
        credits: state.ledger.balance(&account_id),
        account_id,
    })
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "ok": true }))
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/api/upload", post(upload))
        .route("/api/upload-by-url", post(upload_by_url))
        .route("/api/upload-raw", post(upload_raw))
        .route("/api/create-order", post(create_order))
        .route("/api/capture-order", get(capture_order))
        .route("/webhook", post(webhook))
        .route("/api/analyze", post(analyze))
        .route("/api/balance", get(balance))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
