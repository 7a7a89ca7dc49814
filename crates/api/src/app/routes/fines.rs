use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;

use stacks_core::FineId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/unpaid", get(list_unpaid))
        .route("/:id/pay", put(pay))
}

/// Runs an accrual pass before listing, so the ledger reflects loans that
/// went overdue since it was last touched.
pub async fn list_unpaid(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.fines.list_unpaid(Utc::now()).await {
        Ok(fines) => {
            let items = fines.into_iter().map(dto::fine_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn pay(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let fine_id: FineId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.fines.mark_paid(fine_id).await {
        Ok(fine) => (StatusCode::OK, Json(dto::fine_to_json(fine))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
