use axum::{
    Router,
    routing::{get, post},
};

pub mod items;
pub mod price_history;
pub mod system;

/// Router for all catalog endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/items", post(items::create_item))
        .route(
            "/items/:id",
            get(items::get_item)
                .put(items::update_item)
                .delete(items::delete_item),
        )
        .route(
            "/items/:id/movements",
            post(items::record_movement).get(items::list_movements),
        )
        .route("/items/:id/balance", get(items::get_balance))
        .route("/items/:id/price-history", get(price_history::get_price_history))
        .route("/price-history/latest", get(price_history::get_latest_prices))
}
