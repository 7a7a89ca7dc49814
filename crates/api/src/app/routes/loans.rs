use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use stacks_auth::ensure_can_renew;
use stacks_core::{Isbn, LoanId};
use stacks_infra::CheckoutRequest;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_loans))
        .route("/checkout", post(checkout))
        .route("/checkin", post(check_in))
        .route("/:id/renew", post(renew))
}

pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CheckoutRequestBody>,
) -> axum::response::Response {
    let isbn: Isbn = match body.isbn.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let borrower = match dto::parse_borrower(&body.borrower) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let request = CheckoutRequest {
        isbn,
        borrower,
        due_date: body.due_date,
    };
    match services.circulation.checkout(request, Utc::now()).await {
        Ok(record) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "loan_id": record.id.to_string(),
                "due_date": record.due_date.to_rfc3339(),
            })),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn check_in(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CheckInRequestBody>,
) -> axum::response::Response {
    let isbn: Isbn = match body.isbn.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let borrower = match dto::parse_borrower(&body.borrower) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .circulation
        .check_in(&isbn, &borrower, Utc::now())
        .await
    {
        Ok(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "loan_id": record.id.to_string(),
                "fine_cents": record.fine_cents,
            })),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn renew(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let loan_id: LoanId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = ensure_can_renew(principal.roles()) {
        return errors::domain_error_to_response(e);
    }

    match services.circulation.renew(loan_id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "due_date": record.due_date.to_rfc3339(),
            })),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_loans(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListLoansQuery>,
) -> axum::response::Response {
    let filter = match (query.borrower_kind, query.borrower_id) {
        (None, None) => None,
        (Some(kind), Some(id)) => {
            let party = dto::BorrowerParty { kind, id };
            match dto::parse_borrower(&party) {
                Ok(v) => Some(v),
                Err(e) => return errors::domain_error_to_response(e),
            }
        }
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "borrower_kind and borrower_id must be supplied together",
            )
        }
    };

    match services
        .circulation
        .list_active_loans(filter.as_ref(), Utc::now())
        .await
    {
        Ok(records) => {
            let items = records.into_iter().map(dto::loan_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}
