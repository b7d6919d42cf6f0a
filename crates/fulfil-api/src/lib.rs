//! # fulfil-api: Axum API Services for Order Fulfilment
//!
//! Turns a validated order into a shipped parcel: price it, debit the
//! user's prepaid balance, create the carrier shipment, and reverse the
//! debit when the carrier fails. Also exposes carrier quotes, tracking, and
//! the balance ledger to the order entry and UI layers.
//!
//! ## API Surface
//!
//! | Prefix                  | Module                    | Domain                 |
//! |-------------------------|---------------------------|------------------------|
//! | `/v1/orders/*`          | [`routes::orders`]        | Fulfilment             |
//! | `/v1/shipments/quote`   | [`routes::shipments`]     | Carrier quotes         |
//! | `/v1/tracking/*`        | [`routes::shipments`]     | Carrier tracking       |
//! | `/v1/accounts/*`        | [`routes::accounts`]      | Balances and history   |
//! | `/openapi.json`         | [`openapi`]               | API description        |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → Handler
//! ```
//!
//! ## Persistence
//!
//! In-memory by default. With `DATABASE_URL` set, orders are written through
//! to Postgres and balances are held by [`db::ledger::PgLedger`].

pub mod auth;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod orchestration;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::Router;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::orders::router())
        .merge(routes::shipments::router())
        .merge(routes::accounts::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(axum::Extension(auth_config))
        .with_state(state);

    // Unauthenticated health probes.
    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness probe. Always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe. Returns 200 when the application is ready to serve.
async fn readiness() -> &'static str {
    "ready"
}
