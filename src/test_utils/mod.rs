#![allow(missing_docs)]

pub(crate) mod gateway;
pub(crate) mod http;

use std::sync::Arc;

use rusqlite::Connection;
use rust_decimal::Decimal;
use time::macros::datetime;

use crate::{
    AppState, PasswordHash, User, UserID,
    account::{Account, AccountType, SyncedAccount, upsert_synced_account},
    aggregator::AggregatorGateway,
    auth::create_user,
    connection::{BankConnection, create_pending_connection},
};

pub(crate) use gateway::{StubGateway, malformed_account, remote_account, remote_transaction};
pub(crate) use http::{assert_redirect, get_error_message};

/// Insert a user with a dummy password hash.
#[track_caller]
pub(crate) fn insert_test_user(conn: &Connection, email: &str) -> User {
    create_user(email, PasswordHash::new_unchecked("hunter2"), conn)
        .expect("Could not create test user")
}

/// Insert a pending connection for `user_id` with the auth token "token-{external_id}".
#[track_caller]
pub(crate) fn insert_test_connection(
    conn: &Connection,
    user_id: UserID,
    external_id: &str,
) -> BankConnection {
    create_pending_connection(
        user_id,
        external_id,
        &format!("token-{external_id}"),
        datetime!(2025-01-01 00:00:00 UTC),
        conn,
    )
    .expect("Could not create test connection")
}

/// Insert a synced checking account with a zero balance under `bank_connection`.
#[track_caller]
pub(crate) fn insert_test_account(
    conn: &Connection,
    bank_connection: &BankConnection,
    external_id: &str,
) -> Account {
    upsert_synced_account(
        &SyncedAccount {
            user_id: bank_connection.user_id,
            connection_id: bank_connection.id,
            external_id: external_id.to_owned(),
            name: "Everyday".to_owned(),
            account_type: AccountType::Checking,
            balance: Decimal::ZERO,
            currency: "EUR".to_owned(),
            institution_name: None,
        },
        conn,
    )
    .expect("Could not create test account")
}

/// Create app state backed by an in-memory database and `gateway`.
///
/// Passwords are hashed with the minimum bcrypt cost to keep tests fast.
pub(crate) fn test_app_state(gateway: Arc<StubGateway>) -> AppState {
    let mut state = AppState::new(
        Connection::open_in_memory().expect("Could not open in-memory database"),
        "42",
        gateway as Arc<dyn AggregatorGateway>,
        "http://app.test",
    )
    .expect("Could not create app state");
    state.password_cost = 4;

    state
}
