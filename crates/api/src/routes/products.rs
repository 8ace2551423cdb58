//! Product read endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use serde::Serialize;
use store::StockStore;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    /// Best-available stock figure: ledger-backed when the counter exists,
    /// otherwise store-backed with the pending-order adjustment.
    pub stock: i64,
}

/// GET /products/:id — product attributes with the freshest stock figure.
#[tracing::instrument(skip(state))]
pub async fn show<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let view = state.products.get(product_id).await?;

    Ok(Json(ProductResponse {
        id: view.id.to_string(),
        name: view.name,
        price_cents: view.price.cents(),
        stock: view.stock,
    }))
}

pub(crate) fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid product id: {e}")))?;
    Ok(ProductId::from_uuid(uuid))
}
