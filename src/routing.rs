//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Router, middleware,
    response::Redirect,
    routing::{get, post},
};

use crate::{
    AppState,
    auth::{auth_guard, get_log_out, post_log_in, register_user},
    connection::{
        bank_callback_endpoint, connect_bank_endpoint, get_sync_logs_endpoint,
        sync_connection_endpoint,
    },
    dashboard::get_dashboard_summary,
    endpoints,
    not_found::get_404_not_found,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::LOG_IN_API, post(post_log_in))
        .route(endpoints::LOG_OUT, get(get_log_out))
        .route(endpoints::USERS, post(register_user))
        .route(endpoints::BANK_CALLBACK, get(bank_callback_endpoint));

    let protected_routes = Router::new()
        .route(endpoints::ROOT, get(get_index_page))
        .route(endpoints::DASHBOARD_API, get(get_dashboard_summary))
        .route(endpoints::BANK_CONNECT, post(connect_bank_endpoint))
        .route(
            endpoints::BANK_CONNECTION_SYNC,
            post(sync_connection_endpoint),
        )
        .route(
            endpoints::BANK_CONNECTION_SYNC_LOGS,
            get(get_sync_logs_endpoint),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    protected_routes
        .merge(unprotected_routes)
        .fallback(get_404_not_found)
        .with_state(state)
}

/// The root path '/' redirects to the dashboard summary.
async fn get_index_page() -> Redirect {
    Redirect::to(endpoints::DASHBOARD_API)
}
