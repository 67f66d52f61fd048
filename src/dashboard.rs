//! The dashboard summary of a user's money and bank connections.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::{
    AppState, Error, UserID,
    account::{Account, get_accounts_for_user, net_worth},
    connection::{BankConnection, get_connections_for_user},
    transaction::count_transactions_since,
};

/// The state needed for the dashboard summary.
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// The database connection for reading accounts and transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DashboardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// An overview of a user's accounts, recent activity and bank connections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    /// The total balance of the accounts that count towards net worth.
    pub net_worth: Decimal,
    /// The number of accounts that count towards net worth.
    pub included_account_count: usize,
    /// The accounts that count towards net worth, ordered by name.
    pub accounts: Vec<Account>,
    /// The number of transactions dated in the current calendar month.
    pub transactions_this_month: u64,
    /// The user's bank connections with their sync status.
    pub connections: Vec<BankConnection>,
}

/// A route handler for the logged in user's dashboard summary.
pub async fn get_dashboard_summary(
    State(state): State<DashboardState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<DashboardSummary>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    build_dashboard_summary(user_id, OffsetDateTime::now_utc().date(), &connection).map(Json)
}

fn build_dashboard_summary(
    user_id: UserID,
    today: Date,
    connection: &Connection,
) -> Result<DashboardSummary, Error> {
    let accounts: Vec<Account> = get_accounts_for_user(user_id, connection)?
        .into_iter()
        .filter(|account| account.is_included_in_net_worth)
        .collect();
    let start_of_month = today.replace_day(1).unwrap_or(today);

    Ok(DashboardSummary {
        net_worth: net_worth(&accounts),
        included_account_count: accounts.len(),
        accounts,
        transactions_this_month: count_transactions_since(user_id, start_of_month, connection)?,
        connections: get_connections_for_user(user_id, connection)?,
    })
}
