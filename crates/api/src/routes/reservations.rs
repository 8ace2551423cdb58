//! Asynchronous reservation endpoint: ledger admission now, durable order
//! creation out of band.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::{OrderReference, ProductId};
use engine::{EngineError, ReservationJob};
use ledger::StockLedger;
use serde::{Deserialize, Serialize};
use store::StockStore;

use crate::AppState;
use crate::error::ApiError;

/// Upper bound on units per reservation request.
const MAX_QTY: u32 = 10;

#[derive(Deserialize)]
pub struct CreateReservationRequest {
    pub product_id: uuid::Uuid,
    pub qty: u32,
}

#[derive(Serialize)]
pub struct ReservationResponse {
    pub message: &'static str,
    pub order_reference: String,
}

/// POST /reservations — admission-controlled reservation with out-of-band
/// order persistence.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id, qty = req.qty))]
pub async fn create<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError> {
    if req.qty == 0 || req.qty > MAX_QTY {
        return Err(ApiError::BadRequest(format!(
            "qty must be between 1 and {MAX_QTY}"
        )));
    }

    let product_id = ProductId::from_uuid(req.product_id);

    // a cold ledger counter is rebuilt through the product read path;
    // an unknown product surfaces as NotFound there
    if !state
        .ledger
        .contains(product_id)
        .await
        .map_err(EngineError::from)?
    {
        state.products.get(product_id).await?;
    }

    let admitted = state
        .ledger
        .decrement_if_available(product_id, req.qty)
        .await
        .map_err(EngineError::from)?;
    if !admitted {
        metrics::counter!("reservations_rejected_total").increment(1);
        return Err(ApiError::Engine(EngineError::InsufficientStock {
            product_id,
            requested: req.qty,
        }));
    }

    let reference = OrderReference::generate();
    if let Err(e) = state
        .queue
        .enqueue(ReservationJob {
            product_id,
            qty: req.qty,
            reference: reference.clone(),
        })
        .await
    {
        // the queue is down; return the admitted units before failing
        state
            .ledger
            .increment(product_id, req.qty)
            .await
            .map_err(EngineError::from)?;
        return Err(e.into());
    }

    metrics::counter!("reservations_admitted_total").increment(1);
    tracing::info!(order_reference = %reference, "reservation admitted, order queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(ReservationResponse {
            message: "Reservation successful, order is being processed",
            order_reference: reference.to_string(),
        }),
    ))
}
