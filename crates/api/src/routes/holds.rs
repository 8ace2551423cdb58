//! Hold creation endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::ProductId;
use serde::{Deserialize, Serialize};
use store::StockStore;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateHoldRequest {
    pub product_id: uuid::Uuid,
    pub qty: u32,
}

#[derive(Serialize)]
pub struct HoldResponse {
    pub hold_id: String,
    pub expire_at: String,
}

/// POST /holds — reserve units for a bounded checkout window.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id, qty = req.qty))]
pub async fn create<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateHoldRequest>,
) -> Result<(StatusCode, Json<HoldResponse>), ApiError> {
    let hold = state
        .holds
        .create_hold(ProductId::from_uuid(req.product_id), req.qty)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(HoldResponse {
            hold_id: hold.id.to_string(),
            expire_at: hold.expire_at.to_rfc3339(),
        }),
    ))
}
