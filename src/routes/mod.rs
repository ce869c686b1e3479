use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub mod dashboard;
pub mod expenses;
pub mod health;
pub mod invoices;
pub mod leases;
pub mod properties;
pub mod tenants;
pub mod units;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(properties::router())
        .merge(units::router())
        .merge(tenants::router())
        .merge(leases::router())
        .merge(invoices::router())
        .merge(expenses::router())
        .merge(dashboard::router())
}
