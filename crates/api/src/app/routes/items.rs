use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use stockrecon_core::ItemId;
use stockrecon_ledger::{CreateItem, Price, RecordMovement, UpdateItem};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub(crate) fn parse_item_id(id: &str) -> Result<ItemId, axum::response::Response> {
    id.parse().map_err(errors::domain_error_to_response)
}

fn parse_price(raw: &str) -> Result<Price, axum::response::Response> {
    Price::parse_input(raw).map_err(errors::domain_error_to_response)
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateItemRequest>,
) -> axum::response::Response {
    let item_id = match body.id.as_deref().map(str::parse::<ItemId>).transpose() {
        Ok(id) => id.unwrap_or_else(ItemId::new),
        Err(e) => return errors::domain_error_to_response(e),
    };
    let price = match parse_price(&body.price) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let cmd = CreateItem {
        item_id,
        price,
        stock: body.stock,
        occurred_at: Utc::now(),
    };

    match services.catalog().create_item(cmd).await {
        Ok(committed) => (StatusCode::CREATED, Json(dto::committed_to_json(&committed))).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog().get_item(item_id).await {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateItemRequest>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let price = match parse_price(&body.price) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let cmd = UpdateItem {
        item_id,
        price,
        stock: body.stock,
        expected_version: dto::expected_version(body.expected_version),
        occurred_at: Utc::now(),
    };

    match services.catalog().update_item(cmd).await {
        Ok(committed) => (StatusCode::OK, Json(dto::committed_to_json(&committed))).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog().delete_item(item_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordMovementRequest>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = RecordMovement {
        item_id,
        kind: body.kind,
        quantity: body.quantity,
        reason: body.reason,
        expected_version: dto::expected_version(body.expected_version),
        occurred_at: Utc::now(),
    };

    match services.catalog().record_movement(cmd).await {
        Ok(recorded) => (
            StatusCode::CREATED,
            Json(dto::recorded_movement_to_json(&recorded)),
        )
            .into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog().stock_movements(item_id).await {
        Ok(movements) => {
            let items: Vec<_> = movements.iter().map(dto::movement_to_json).collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "item_id": item_id.to_string(),
                    "count": items.len(),
                    "movements": items,
                })),
            )
                .into_response()
        }
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog().current_balance(item_id).await {
        Ok(balance) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "item_id": item_id.to_string(),
                "balance": balance,
            })),
        )
            .into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}
