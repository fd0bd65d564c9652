use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;

use crate::server::admin::{
    create_license_handler, get_license_handler, list_licenses_handler, piracy_report_handler,
    stats_handler, unbind_license_handler, update_license_handler,
};
use crate::server::client_api::{activate_handler, verify_handler, AppState};
use crate::server::logging::{health_handler, request_logging_middleware};

/// Build the main application router for the domainlock server.
///
/// This is a convenience helper so `main.rs` or tests can
/// construct the router in a single call.
///
/// # Routes
///
/// ## Client endpoints (no authentication)
/// - `POST /api/licenses/activate` - Bind a license to the calling domain
/// - `POST /api/licenses/verify` - Check that a license is valid for a domain
///
/// ## Admin endpoints (front with your own auth layer)
/// - `POST /api/admin/licenses` - Create a license
/// - `GET /api/admin/licenses` - List licenses with recent logs
/// - `GET /api/admin/licenses/{id}` - Get a license with its log trail
/// - `PATCH /api/admin/licenses/{id}` - Update whitelisted fields
/// - `DELETE /api/admin/licenses/{id}` - Unbind the license from its domain
/// - `GET /api/admin/stats` - Aggregate counts
/// - `GET /api/admin/piracy` - Piracy report
///
/// ## Operational
/// - `GET /health` - Service and database health
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Client endpoints
        .route("/api/licenses/activate", post(activate_handler))
        .route("/api/licenses/verify", post(verify_handler))
        // Admin endpoints
        .route("/api/admin/licenses", post(create_license_handler))
        .route("/api/admin/licenses", get(list_licenses_handler))
        .route("/api/admin/licenses/:id", get(get_license_handler))
        .route("/api/admin/licenses/:id", patch(update_license_handler))
        .route(
            "/api/admin/licenses/:id",
            axum::routing::delete(unbind_license_handler),
        )
        .route("/api/admin/stats", get(stats_handler))
        .route("/api/admin/piracy", get(piracy_report_handler))
        // Operational
        .route("/health", get(health_handler))
        .layer(ServiceBuilder::new().layer(middleware::from_fn(request_logging_middleware)))
        .with_state(state)
}
