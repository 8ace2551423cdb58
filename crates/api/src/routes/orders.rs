//! Order endpoints: hold conversion and order reads.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{HoldId, OrderId, OrderReference};
use domain::{Order, OrderKey};
use serde::{Deserialize, Serialize};
use store::StockStore;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub hold_id: uuid::Uuid,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_reference: String,
    pub product_id: String,
    pub qty: u32,
    pub amount_cents: i64,
    pub status: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            order_reference: order.reference.to_string(),
            product_id: order.product_id.to_string(),
            qty: order.qty,
            amount_cents: order.amount.cents(),
            status: order.status.to_string(),
        }
    }
}

/// POST /orders — convert a hold into a pending order.
#[tracing::instrument(skip(state, req), fields(hold_id = %req.hold_id))]
pub async fn create<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .settlement
        .create_from_hold(HoldId::from_uuid(req.hold_id))
        .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/:key — load an order by reference or id.
#[tracing::instrument(skip(state))]
pub async fn show<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(key): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    // references are opaque strings, so try them first; a UUID-shaped key
    // may also address the order row directly
    let by_reference = OrderKey::Reference(OrderReference::new(key.clone()));
    if let Some(order) = state.settlement.order(&by_reference).await? {
        return Ok(Json(order.into()));
    }

    if let Ok(uuid) = uuid::Uuid::parse_str(&key)
        && let Some(order) = state
            .settlement
            .order(&OrderKey::Id(OrderId::from_uuid(uuid)))
            .await?
    {
        return Ok(Json(order.into()));
    }

    Err(ApiError::Engine(engine::EngineError::OrderNotFound(key)))
}
