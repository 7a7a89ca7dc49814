use axum::{routing::get, Router};

pub mod catalog;
pub mod fines;
pub mod loans;
pub mod orders;
pub mod system;

/// Router for all authenticated endpoints. `/health` stays outside so
/// probes work without a token.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/loans", loans::router())
        .nest("/fines", fines::router())
        .nest("/orders", orders::router())
        .nest("/catalog", catalog::router())
}
