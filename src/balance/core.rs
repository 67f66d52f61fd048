use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use time::Date;

use crate::{Error, account::AccountId};

/// The balance of an account at the end of a sync on a given day.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSnapshot {
    /// The id for the snapshot.
    pub id: crate::database_id::DatabaseId,
    /// The account the balance belongs to.
    pub account_id: AccountId,
    /// The balance.
    pub balance: Decimal,
    /// The currency of the balance.
    pub currency: String,
    /// The day the balance was recorded.
    pub recorded_on: Date,
}

pub fn create_balance_history_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS balance_history (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            balance TEXT NOT NULL,
            currency TEXT NOT NULL,
            recorded_on TEXT NOT NULL,
            UNIQUE(account_id, recorded_on),
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

#[cfg(test)]
fn map_row_to_balance_snapshot(row: &rusqlite::Row) -> Result<BalanceSnapshot, rusqlite::Error> {
    Ok(BalanceSnapshot {
        id: row.get(0)?,
        account_id: row.get(1)?,
        balance: crate::db::get_decimal(row, 2)?,
        currency: row.get(3)?,
        recorded_on: row.get(4)?,
    })
}

/// Record `balance` for `account_id` on `recorded_on` unless a snapshot for that
/// account and day already exists.
///
/// Returns `true` if a new snapshot was written and `false` if the existing
/// snapshot for the day was kept.
///
/// # Errors
/// Returns [Error::SqlError] if the insert fails for any reason other than an
/// existing snapshot for the same day.
pub fn insert_balance_if_absent(
    account_id: AccountId,
    balance: Decimal,
    currency: &str,
    recorded_on: Date,
    connection: &Connection,
) -> Result<bool, Error> {
    let rows_inserted = connection.execute(
        "INSERT INTO balance_history (account_id, balance, currency, recorded_on)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(account_id, recorded_on) DO NOTHING",
        params![account_id, balance.to_string(), currency, recorded_on],
    )?;

    Ok(rows_inserted == 1)
}

/// Get the balance history of an account, oldest first.
#[cfg(test)]
pub fn get_balance_history(
    account_id: AccountId,
    connection: &Connection,
) -> Result<Vec<BalanceSnapshot>, Error> {
    connection
        .prepare(
            "SELECT id, account_id, balance, currency, recorded_on FROM balance_history
            WHERE account_id = ?1 ORDER BY recorded_on ASC",
        )?
        .query_map([account_id], map_row_to_balance_snapshot)?
        .map(|maybe_snapshot| maybe_snapshot.map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod create_balance_history_table_tests {
    use rusqlite::Connection;

    use super::create_balance_history_table;

    #[test]
    fn sql_is_valid() {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");

        assert_eq!(Ok(()), create_balance_history_table(&connection));
    }
}
