use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};

use stockrecon_infra::store::DateRange;

use crate::app::routes::items::parse_item_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// `GET /items/:id/price-history?from=YYYY-MM-DD&to=YYYY-MM-DD`, both days inclusive.
pub async fn get_price_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::PriceHistoryQuery>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let range = match DateRange::new(query.from, query.to) {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog().price_history(item_id, range).await {
        Ok(entries) => {
            let items: Vec<_> = entries.iter().map(dto::price_entry_to_json).collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "item_id": item_id.to_string(),
                    "count": items.len(),
                    "entries": items,
                })),
            )
                .into_response()
        }
        Err(e) => errors::catalog_error_to_response(e),
    }
}

/// Newest price of every item.
pub async fn get_latest_prices(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.catalog().latest_prices().await {
        Ok(entries) => {
            let items: Vec<_> = entries.iter().map(dto::price_entry_to_json).collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "count": items.len(),
                    "entries": items,
                })),
            )
                .into_response()
        }
        Err(e) => errors::catalog_error_to_response(e),
    }
}
