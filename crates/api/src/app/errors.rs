use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockrecon_core::DomainError;
use stockrecon_infra::CatalogError;

pub fn catalog_error_to_response(err: CatalogError) -> axum::response::Response {
    match err {
        CatalogError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        CatalogError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        CatalogError::AlreadyExists(msg) => json_error(StatusCode::CONFLICT, "already_exists", msg),
        CatalogError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "item not found"),
        CatalogError::Conflict(msg) => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "conflict",
                "message": msg,
                "retryable": true,
            })),
        )
            .into_response(),
        CatalogError::Consistency(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "consistency_violation", msg)
        }
        CatalogError::Store(e) => {
            tracing::error!(error = %e, "catalog store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    catalog_error_to_response(err.into())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
