use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use stacks_acquisitions::{parse_order_rows, NewOrderLine, ReceiptUpdate};
use stacks_core::{LineId, OrderId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/bulk-upload", post(bulk_upload))
        .route("/:id/lines", get(order_lines))
        .route("/:id/receive", post(receive))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let mut lines: Vec<NewOrderLine> = Vec::with_capacity(body.lines.len());
    for line in body.lines {
        match dto::to_new_order_line(line) {
            Ok(v) => lines.push(v),
            Err(e) => return errors::domain_error_to_response(e),
        }
    }

    match services.acquisitions.create_order(lines, Utc::now()).await {
        Ok((order, lines)) => created_order_response(order, lines.len()),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// Vendor manifest upload. The body is the raw CSV, not a JSON wrapper;
/// rows the parser cannot salvage are dropped rather than failing the batch.
pub async fn bulk_upload(
    Extension(services): Extension<Arc<AppServices>>,
    body: String,
) -> axum::response::Response {
    let lines = match parse_order_rows(body.as_bytes()) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.acquisitions.create_order(lines, Utc::now()).await {
        Ok((order, lines)) => created_order_response(order, lines.len()),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.acquisitions.list_orders().await {
        Ok(orders) => {
            let items = orders
                .into_iter()
                .map(dto::order_summary_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn order_lines(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.acquisitions.order_lines(order_id).await {
        Ok(lines) => {
            let items = lines
                .into_iter()
                .map(dto::order_line_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn receive(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReceiveRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let mut updates: Vec<ReceiptUpdate> = Vec::with_capacity(body.updates.len());
    for update in body.updates {
        let line_id: LineId = match update.line_id.parse() {
            Ok(v) => v,
            Err(e) => return errors::domain_error_to_response(e),
        };
        updates.push(ReceiptUpdate {
            line_id,
            quantity_delta: update.quantity_delta,
            is_damaged: update.is_damaged,
        });
    }

    match services
        .acquisitions
        .receive(order_id, updates, body.comments)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "order_status": outcome.status.as_str(),
                "promoted": outcome
                    .promoted
                    .iter()
                    .map(|isbn| isbn.as_str())
                    .collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

fn created_order_response(order: stacks_acquisitions::Order, line_count: usize) -> axum::response::Response {
    (
        StatusCode::CREATED,
        Json(dto::order_to_json(order, line_count)),
    )
        .into_response()
}
