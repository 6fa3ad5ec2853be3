pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

/// Health, telemetry report and admin routes. Reload is the only guarded one.
pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/stats/export", get(export))
        .route(
            "/admin/reload",
            post(reload).route_layer(middleware::from_fn_with_state(state, admin_auth_middleware)),
        )
}
