//! Defines the endpoint for starting to link a bank.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error, UserID, aggregator::AggregatorGateway, connection::create_pending_connection,
    endpoints,
};

/// The state needed to start linking a bank.
#[derive(Clone)]
pub struct ConnectState {
    db_connection: Arc<Mutex<Connection>>,
    gateway: Arc<dyn AggregatorGateway>,
    app_url: String,
}

impl FromRef<AppState> for ConnectState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            gateway: state.gateway.clone(),
            app_url: state.app_url.clone(),
        }
    }
}

/// Where to send the user to pick their bank.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    /// The aggregator's bank picker.
    pub url: String,
    /// The aggregator's id for the user created for this connection.
    pub external_user_id: String,
}

/// A route handler that creates an aggregator-side user for the logged in
/// user and records a pending connection for it.
///
/// The aggregator calls [crate::endpoints::BANK_CALLBACK] once the user has
/// picked their bank.
///
/// # Errors
/// Returns [Error::Upstream] if the aggregator user could not be created.
pub async fn connect_bank_endpoint(
    State(state): State<ConnectState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<ConnectResponse>, Error> {
    let aggregator_user = state.gateway.create_user_and_token().await.map_err(|error| {
        tracing::error!("Could not create aggregator user for user {user_id}: {error}");
        Error::from(error)
    })?;

    let redirect_url = format!("{}{}", state.app_url, endpoints::BANK_CALLBACK);
    let url = state
        .gateway
        .webview_url(&aggregator_user.auth_token, &redirect_url);

    let bank_connection = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        create_pending_connection(
            user_id,
            &aggregator_user.external_user_id,
            &aggregator_user.auth_token,
            OffsetDateTime::now_utc(),
            &connection,
        )?
    };

    tracing::info!(
        "User {user_id} started linking a bank as connection {}",
        bank_connection.external_id
    );

    Ok(Json(ConnectResponse {
        url,
        external_user_id: bank_connection.external_id,
    }))
}
