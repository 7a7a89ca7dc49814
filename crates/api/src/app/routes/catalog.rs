use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use stacks_catalog::{prepare_batch, Category};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/bulk-upload", post(bulk_upload))
}

pub async fn bulk_upload(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CatalogBulkUploadRequest>,
) -> axum::response::Response {
    let category: Category = match body.category.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let items = match prepare_batch(category, body.rows) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.add_items(items).await {
        Ok(count) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "count": count })),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
