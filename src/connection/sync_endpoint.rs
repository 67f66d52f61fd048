//! Defines the endpoints for syncing a connection on demand and for reading
//! its sync history.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
};
use rusqlite::Connection;
use serde::Deserialize;

use crate::{
    AppState, Error, UserID,
    aggregator::AggregatorGateway,
    connection::{ConnectionId, get_connection_for_user},
    sync::{SyncEngine, SyncLog, SyncResult, get_sync_logs_for_connection},
};

/// The state needed to sync a connection on demand.
#[derive(Clone)]
pub struct ManualSyncState {
    db_connection: Arc<Mutex<Connection>>,
    gateway: Arc<dyn AggregatorGateway>,
    sync_engine: Arc<SyncEngine>,
}

impl FromRef<AppState> for ManualSyncState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            gateway: state.gateway.clone(),
            sync_engine: state.sync_engine.clone(),
        }
    }
}

/// Options for a manual sync.
#[derive(Debug, Default, Deserialize)]
pub struct SyncOptions {
    /// Ask the aggregator to fetch fresh data from the banks before syncing.
    #[serde(default)]
    refresh: bool,
}

/// A route handler that syncs one of the logged in user's connections and
/// responds with the sync's counts once it has finished.
///
/// # Errors
/// Returns:
/// - [Error::NotFound] if the connection does not exist or belongs to another user,
/// - [Error::Upstream] if the aggregator could not be reached.
pub async fn sync_connection_endpoint(
    State(state): State<ManualSyncState>,
    Extension(user_id): Extension<UserID>,
    Path(connection_id): Path<ConnectionId>,
    Query(options): Query<SyncOptions>,
) -> Result<Json<SyncResult>, Error> {
    let bank_connection = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_connection_for_user(connection_id, user_id, &connection)?
    };

    if options.refresh {
        state
            .gateway
            .trigger_sync(&bank_connection.credentials())
            .await?;
    }

    let result = state
        .sync_engine
        .sync_connection(&bank_connection.external_id)
        .await?;

    Ok(Json(result))
}

/// The state needed to read a connection's sync history.
#[derive(Debug, Clone)]
pub struct SyncLogsState {
    db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for SyncLogsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler that lists the sync attempts of one of the logged in
/// user's connections, newest first.
///
/// # Errors
/// Returns [Error::NotFound] if the connection does not exist or belongs to another user.
pub async fn get_sync_logs_endpoint(
    State(state): State<SyncLogsState>,
    Extension(user_id): Extension<UserID>,
    Path(connection_id): Path<ConnectionId>,
) -> Result<Json<Vec<SyncLog>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    get_connection_for_user(connection_id, user_id, &connection)?;

    get_sync_logs_for_connection(connection_id, &connection).map(Json)
}
