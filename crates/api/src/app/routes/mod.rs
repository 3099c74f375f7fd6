use axum::{Router, routing::get};

pub mod common;
pub mod inventory;
pub mod sales;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/inventory", inventory::router())
        .nest("/sales", sales::router())
}
