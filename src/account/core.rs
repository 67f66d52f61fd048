use rusqlite::{Connection, Row, params};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    Error, UserID, account::AccountType, connection::ConnectionId, database_id::DatabaseId,
    db::get_decimal,
};

pub type AccountId = DatabaseId;

/// A bank account, credit card, loan or investment visible to a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    /// The id for the account.
    pub id: AccountId,
    /// The user that owns the account.
    pub user_id: UserID,
    /// The bank connection the account was imported from, `None` for manual accounts.
    pub connection_id: Option<ConnectionId>,
    /// The aggregator's id for the account, `None` for manual accounts.
    pub external_id: Option<String>,
    /// The display name of the account.
    pub name: String,
    /// What kind of account this is.
    pub account_type: AccountType,
    /// The current balance.
    pub balance: Decimal,
    /// The ISO 4217 currency code of the balance.
    pub currency: String,
    /// The name of the bank that holds the account.
    pub institution_name: Option<String>,
    /// Whether the account was entered by hand.
    pub is_manual: bool,
    /// Whether the balance counts towards the user's net worth.
    pub is_included_in_net_worth: bool,
}

/// An account as reported by the aggregator, ready to be written to the database.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedAccount {
    pub user_id: UserID,
    pub connection_id: ConnectionId,
    pub external_id: String,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub currency: String,
    pub institution_name: Option<String>,
}

pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            connection_id INTEGER,
            external_id TEXT UNIQUE,
            name TEXT NOT NULL,
            account_type TEXT NOT NULL,
            balance TEXT NOT NULL,
            currency TEXT NOT NULL,
            institution_name TEXT,
            is_manual INTEGER NOT NULL DEFAULT 0,
            is_included_in_net_worth INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(connection_id) REFERENCES bank_connection(id) ON DELETE SET NULL
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_account_user ON account(user_id)",
        (),
    )?;

    Ok(())
}

const ACCOUNT_COLUMNS: &str = "id, user_id, connection_id, external_id, name, account_type, \
    balance, currency, institution_name, is_manual, is_included_in_net_worth";

pub fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        connection_id: row.get(2)?,
        external_id: row.get(3)?,
        name: row.get(4)?,
        account_type: row.get(5)?,
        balance: get_decimal(row, 6)?,
        currency: row.get(7)?,
        institution_name: row.get(8)?,
        is_manual: row.get(9)?,
        is_included_in_net_worth: row.get(10)?,
    })
}

/// Insert the account, or update it in place if an account with the same
/// external id already exists.
///
/// The balance is always overwritten with the synced value. Whether the
/// account counts towards net worth is a user preference and is kept as is
/// for existing accounts.
///
/// # Errors
/// Returns [Error::SqlError] if the statement fails, e.g. a constraint is violated.
pub fn upsert_synced_account(
    account: &SyncedAccount,
    connection: &Connection,
) -> Result<Account, Error> {
    let sql = format!(
        "INSERT INTO account (user_id, connection_id, external_id, name, account_type, balance, \
            currency, institution_name, is_manual, is_included_in_net_worth)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 1)
        ON CONFLICT(external_id) DO UPDATE SET
            user_id = excluded.user_id,
            connection_id = excluded.connection_id,
            name = excluded.name,
            account_type = excluded.account_type,
            balance = excluded.balance,
            currency = excluded.currency,
            institution_name = excluded.institution_name,
            is_manual = 0
        RETURNING {ACCOUNT_COLUMNS}"
    );

    connection
        .query_row(
            &sql,
            params![
                account.user_id.as_i64(),
                account.connection_id,
                account.external_id,
                account.name,
                account.account_type,
                account.balance.to_string(),
                account.currency,
                account.institution_name,
            ],
            map_row_to_account,
        )
        .map_err(Error::from)
}

/// Get all of a user's accounts, ordered by name.
pub fn get_accounts_for_user(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Account>, Error> {
    connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE user_id = ?1 ORDER BY name, id"
        ))?
        .query_map([user_id.as_i64()], map_row_to_account)?
        .map(|maybe_account| maybe_account.map_err(Error::from))
        .collect()
}

/// Get the account with the aggregator id `external_id`.
///
/// # Errors
/// Returns [Error::NotFound] if no account has that external id.
#[cfg(test)]
pub fn get_account_by_external_id(
    external_id: &str,
    connection: &Connection,
) -> Result<Account, Error> {
    connection
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE external_id = ?1"),
            [external_id],
            map_row_to_account,
        )
        .map_err(Error::from)
}

/// The sum of the balances of the accounts that count towards net worth.
pub fn net_worth(accounts: &[Account]) -> Decimal {
    accounts
        .iter()
        .filter(|account| account.is_included_in_net_worth)
        .map(|account| account.balance)
        .sum()
}
