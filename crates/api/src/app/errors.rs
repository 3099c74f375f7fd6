use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use farmstock_infra::command_dispatcher::DispatchError;

/// Map a dispatch error to an HTTP status and JSON body.
///
/// Exposed separately from the response builder so a handler can embed the
/// body inside a larger payload (e.g. a partial-success response).
pub fn dispatch_error_parts(err: &DispatchError) -> (StatusCode, serde_json::Value) {
    match err {
        DispatchError::Concurrency(msg) => (
            StatusCode::CONFLICT,
            json!({ "error": "conflict", "message": msg }),
        ),
        DispatchError::Validation(msg) => (
            StatusCode::BAD_REQUEST,
            json!({ "error": "validation_error", "message": msg }),
        ),
        DispatchError::InvariantViolation(msg) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": "invariant_violation", "message": msg }),
        ),
        DispatchError::InsufficientStock {
            available,
            requested,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": "insufficient_stock",
                "message": format!(
                    "insufficient stock: available {available}, requested {requested}"
                ),
                "available": available,
                "requested": requested,
            }),
        ),
        DispatchError::Unauthorized => (
            StatusCode::FORBIDDEN,
            json!({ "error": "unauthorized", "message": "unauthorized" }),
        ),
        DispatchError::NotFound => (
            StatusCode::NOT_FOUND,
            json!({ "error": "not_found", "message": "not found" }),
        ),
        DispatchError::Deserialize(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "deserialize_error", "message": msg }),
        ),
        DispatchError::Store(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "store_error", "message": format!("{e:?}") }),
        ),
        DispatchError::Publish(msg) => (
            StatusCode::BAD_GATEWAY,
            json!({ "error": "publish_error", "message": msg }),
        ),
        DispatchError::TenantIsolation(msg) => (
            StatusCode::FORBIDDEN,
            json!({ "error": "tenant_isolation", "message": msg }),
        ),
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    let (status, body) = dispatch_error_parts(&err);
    (status, axum::Json(body)).into_response()
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
