pub mod health;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::dashboard::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Dashboard view & job selection
        .route("/api/v1/dashboard", get(handlers::handle_get_view))
        .route("/api/v1/dashboard/job", post(handlers::handle_select_job))
        .route(
            "/api/v1/dashboard/job/results/retry",
            post(handlers::handle_retry_results),
        )
        .route(
            "/api/v1/dashboard/history/refresh",
            post(handlers::handle_refresh_history),
        )
        // Filters & search
        .route(
            "/api/v1/dashboard/filters/:key/toggle",
            post(handlers::handle_toggle_filter),
        )
        .route(
            "/api/v1/dashboard/filters",
            delete(handlers::handle_clear_filters),
        )
        .route("/api/v1/dashboard/search", put(handlers::handle_set_search))
        // Selection, comparison & export
        .route(
            "/api/v1/dashboard/selection/:filename/toggle",
            post(handlers::handle_toggle_selection),
        )
        .route(
            "/api/v1/dashboard/selection",
            delete(handlers::handle_clear_selection),
        )
        .route(
            "/api/v1/dashboard/selection/shortlist",
            post(handlers::handle_bulk_shortlist),
        )
        .route(
            "/api/v1/dashboard/comparison",
            get(handlers::handle_comparison),
        )
        .route("/api/v1/dashboard/export", get(handlers::handle_export))
        // Candidate status
        .route(
            "/api/v1/dashboard/candidates/:job_id/:filename/status",
            put(handlers::handle_set_status),
        )
        .route(
            "/api/v1/dashboard/candidates/:job_id/:filename/shortlist",
            post(handlers::handle_toggle_shortlist),
        )
        // Notifications
        .route("/api/v1/notifications", get(handlers::handle_notifications))
        .route(
            "/api/v1/notifications/read",
            post(handlers::handle_mark_read),
        )
        .with_state(state)
}
