pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod services;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::config::PaymentsConfig;
use crate::services::LedgerService;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub ledger: LedgerService,
    pub payments: PaymentsConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/payments/create", post(handlers::topup::create_transaction))
        .route("/api/payments/payme", post(handlers::payme::webhook))
        .route("/api/payments/click", post(handlers::click::webhook))
        .route(
            "/api/payments/transactions/:id",
            get(handlers::topup::get_transaction),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
