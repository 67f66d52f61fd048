//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/bank/connections/{connection_id}/sync',
//! use [format_endpoint].

/// The root route which redirects to the dashboard summary.
pub const ROOT: &str = "/";
/// The landing page for logged in users, served by the frontend. Bank
/// callbacks send users here.
pub const DASHBOARD_VIEW: &str = "/dashboard";

/// The route for logging in a user.
pub const LOG_IN_API: &str = "/api/log_in";
/// The route for the client to log out the current user.
pub const LOG_OUT: &str = "/api/log_out";
/// The route to access users.
pub const USERS: &str = "/api/users";
/// The route for the dashboard summary of the current user.
pub const DASHBOARD_API: &str = "/api/dashboard";
/// The route for starting to link a bank through the aggregator.
pub const BANK_CONNECT: &str = "/api/bank/connect";
/// The route the aggregator sends users back to once they have linked a bank.
pub const BANK_CALLBACK: &str = "/api/bank/callback";
/// The route for syncing one of the user's bank connections right away.
pub const BANK_CONNECTION_SYNC: &str = "/api/bank/connections/{connection_id}/sync";
/// The route for the sync history of one of the user's bank connections.
pub const BANK_CONNECTION_SYNC_LOGS: &str = "/api/bank/connections/{connection_id}/sync_logs";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/api/bank/connections/{connection_id}/sync',
/// '{connection_id}' is the parameter. Only the first parameter is replaced.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_owned();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map_or(endpoint_path.len(), |offset| param_start + offset + 1);

    format!(
        "{}{id}{}",
        &endpoint_path[..param_start],
        &endpoint_path[param_end..]
    )
}
