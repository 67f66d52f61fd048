//! Defines the endpoint the aggregator redirects users to once they have
//! finished, or given up on, linking a bank.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, Query, State},
    response::Redirect,
};
use rusqlite::Connection;
use serde::Deserialize;

use crate::{
    AppState, Error,
    connection::{ConnectionStatus, set_connection_status},
    endpoints,
    sync::SyncDispatcher,
};

const CONNECTION_FAILED_MESSAGE: &str = "connection failed";
const SYNC_FAILED_MESSAGE: &str = "initial synchronization failed";

/// The state needed to handle the aggregator's callback.
#[derive(Debug, Clone)]
pub struct CallbackState {
    db_connection: Arc<Mutex<Connection>>,
    dispatcher: SyncDispatcher,
}

impl FromRef<AppState> for CallbackState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            dispatcher: state.dispatcher.clone(),
        }
    }
}

/// The query parameters the aggregator adds to the callback URL.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    /// The aggregator-side id of the connection.
    connection_id: Option<String>,
    /// Set to "error" when the user could not link their bank.
    state: Option<String>,
}

/// What the callback did, reported to the frontend in the redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackOutcome {
    BankConnected,
    InvalidCallback,
    ConnectionFailed,
    SyncFailed,
}

impl CallbackOutcome {
    fn redirect_target(&self) -> String {
        let query = match self {
            CallbackOutcome::BankConnected => "success=bank_connected",
            CallbackOutcome::InvalidCallback => "error=invalid_callback",
            CallbackOutcome::ConnectionFailed => "error=connection_failed",
            CallbackOutcome::SyncFailed => "error=sync_failed",
        };

        format!("{}?{query}", endpoints::DASHBOARD_VIEW)
    }
}

/// A route handler for the aggregator's callback.
///
/// A successful callback activates the connection and queues its first sync
/// without waiting for it. The user is always redirected to the dashboard
/// with the outcome in the query string.
pub async fn bank_callback_endpoint(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let outcome = handle_callback(&state, query);

    Redirect::to(&outcome.redirect_target())
}

fn handle_callback(state: &CallbackState, query: CallbackQuery) -> CallbackOutcome {
    let Some(external_id) = query.connection_id.filter(|id| !id.trim().is_empty()) else {
        tracing::warn!("Received bank callback without a connection id");
        return CallbackOutcome::InvalidCallback;
    };

    if query.state.as_deref() == Some("error") {
        tracing::warn!("Aggregator reported that connection {external_id} failed");

        match update_status(state, &external_id, ConnectionStatus::Error, CONNECTION_FAILED_MESSAGE)
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Received callback for unknown connection {external_id}"),
            Err(error) => {
                tracing::error!("Could not mark connection {external_id} as failed: {error}")
            }
        }

        return CallbackOutcome::ConnectionFailed;
    }

    match activate_and_dispatch(state, &external_id) {
        Ok(()) => {
            tracing::info!("Connection {external_id} linked, initial sync queued");
            CallbackOutcome::BankConnected
        }
        Err(error) => {
            tracing::error!("Could not start initial sync of connection {external_id}: {error}");

            if let Err(error) =
                update_status(state, &external_id, ConnectionStatus::Error, SYNC_FAILED_MESSAGE)
            {
                tracing::error!("Could not mark connection {external_id} as failed: {error}");
            }

            CallbackOutcome::SyncFailed
        }
    }
}

fn activate_and_dispatch(state: &CallbackState, external_id: &str) -> Result<(), Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    if !set_connection_status(external_id, ConnectionStatus::Active, None, &connection)? {
        return Err(Error::NotFound);
    }

    state.dispatcher.dispatch(external_id)
}

fn update_status(
    state: &CallbackState,
    external_id: &str,
    status: ConnectionStatus,
    error_message: &str,
) -> Result<bool, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    set_connection_status(external_id, status, Some(error_message), &connection)
}
