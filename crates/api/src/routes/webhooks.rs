//! Payment webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use common::{IdempotencyKey, OrderId, OrderReference};
use domain::{OrderKey, PaymentOutcome, WebhookPayload};
use engine::WebhookDisposition;
use serde::{Deserialize, Serialize};
use store::StockStore;

use crate::AppState;
use crate::error::ApiError;

/// Header carrying the HMAC-SHA256 signature over the raw body.
const SIGNATURE_HEADER: &str = "X-Payment-Signature";

#[derive(Deserialize)]
pub struct WebhookRequest {
    pub idempotency_key: String,
    pub order_reference: Option<String>,
    pub order_id: Option<uuid::Uuid>,
    pub status: String,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<String>,
}

/// POST /payments/webhook — apply a payment outcome exactly once.
///
/// The signature is verified over the raw request body before anything is
/// parsed or persisted.
#[tracing::instrument(skip(state, headers, body))]
pub async fn handle<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    state.verifier.verify(&body, signature)?;

    let req: WebhookRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {e}")))?;

    if req.idempotency_key.is_empty() {
        return Err(ApiError::BadRequest("idempotency_key is required".to_string()));
    }
    let outcome = PaymentOutcome::parse(&req.status)
        .ok_or_else(|| ApiError::BadRequest("status must be success or failure".to_string()))?;
    let order = match (req.order_reference, req.order_id) {
        (Some(reference), _) => OrderKey::Reference(OrderReference::new(reference)),
        (None, Some(id)) => OrderKey::Id(OrderId::from_uuid(id)),
        (None, None) => {
            return Err(ApiError::BadRequest(
                "order_reference or order_id is required".to_string(),
            ));
        }
    };

    let key = IdempotencyKey::new(req.idempotency_key);
    let disposition = state.reconciler.handle(&key, WebhookPayload { order, outcome }).await;

    let (status, response) = match disposition {
        Ok(WebhookDisposition::Applied(order_status)) => (
            StatusCode::OK,
            WebhookResponse {
                message: match outcome {
                    PaymentOutcome::Success => "Payment successful, order marked as paid",
                    PaymentOutcome::Failure => "Payment failed, order cancelled and stock released",
                },
                order_status: Some(order_status.to_string()),
            },
        ),
        Ok(WebhookDisposition::AlreadyProcessed { order_status }) => (
            StatusCode::OK,
            WebhookResponse {
                message: "Webhook already processed",
                order_status: order_status.map(|s| s.to_string()),
            },
        ),
        Ok(WebhookDisposition::AlreadyTerminal(order_status)) => (
            StatusCode::OK,
            WebhookResponse {
                message: "Order already in final state",
                order_status: Some(order_status.to_string()),
            },
        ),
        Ok(WebhookDisposition::Deferred) => (
            StatusCode::ACCEPTED,
            WebhookResponse {
                message: "Order not found, webhook recorded for later processing",
                order_status: None,
            },
        ),
        // lock timeouts and dependency failures surface as 503 + Retry-After
        Err(e) => return Err(e.into()),
    };

    Ok((status, Json(response)))
}
