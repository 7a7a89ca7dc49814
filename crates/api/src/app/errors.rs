use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stacks_core::DomainError;

/// Map a domain error onto the wire.
///
/// Storage failures are logged here and surfaced as an opaque 500; every
/// other variant carries a caller-actionable status.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::EmptyOrder => json_error(
            StatusCode::BAD_REQUEST,
            "empty_order",
            "an order must contain at least one line",
        ),
        DomainError::NotAvailable => json_error(
            StatusCode::BAD_REQUEST,
            "not_available",
            "no copies of this item are available",
        ),
        DomainError::OverReceipt(msg) => json_error(StatusCode::BAD_REQUEST, "over_receipt", msg),
        DomainError::DuplicateIsbn(duplicates) => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "duplicate_isbn",
                "message": "one or more ISBNs already exist in the catalog",
                "duplicates": duplicates,
            })),
        )
            .into_response(),
        DomainError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        DomainError::NoActiveLoan => json_error(
            StatusCode::NOT_FOUND,
            "no_active_loan",
            "no active loan exists for this borrower and item",
        ),
        DomainError::BorrowerNotFound => json_error(
            StatusCode::NOT_FOUND,
            "borrower_not_found",
            "borrower is not registered",
        ),
        DomainError::BorrowerInactive => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "borrower_inactive",
            "borrower account is not active",
        ),
        DomainError::AlreadyReturned => json_error(
            StatusCode::CONFLICT,
            "already_returned",
            "this loan has already been returned",
        ),
        DomainError::AlreadyPaid => json_error(
            StatusCode::CONFLICT,
            "already_paid",
            "this fine has already been paid",
        ),
        DomainError::Unauthorized => json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "caller is not allowed to perform this operation",
        ),
        DomainError::Store(msg) => {
            tracing::error!(error = %msg, "store failure while serving a request");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                "internal storage failure",
            )
        }
    }
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
