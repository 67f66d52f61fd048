use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use time::Date;

use crate::{Error, UserID, account::AccountId};

/// The description used when the aggregator gives a transaction no description at all.
pub const DEFAULT_DESCRIPTION: &str = "Transaction";

/// A movement of money on an account, as stored.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// The id for the transaction.
    pub id: crate::database_id::DatabaseId,
    /// The account the transaction belongs to.
    pub account_id: AccountId,
    /// The aggregator's id for the transaction, `None` for manual transactions.
    pub external_id: Option<String>,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The signed amount, negative for money leaving the account.
    pub amount: Decimal,
    /// The currency of the amount.
    pub currency: String,
    /// The aggregator's category label.
    pub category: Option<String>,
    /// Whether the transaction had not yet cleared when it was first synced.
    pub is_pending: bool,
    /// Whether the transaction was entered by hand.
    pub is_manual: bool,
}

/// A transaction reported by the aggregator, ready to be written to the database.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedTransaction {
    pub account_id: AccountId,
    pub external_id: String,
    pub date: Date,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub category: Option<String>,
    pub is_pending: bool,
}

pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            external_id TEXT UNIQUE,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            amount TEXT NOT NULL,
            currency TEXT NOT NULL,
            category TEXT,
            is_pending INTEGER NOT NULL DEFAULT 0,
            is_manual INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_account_date ON \"transaction\"(account_id, date)",
        (),
    )?;

    Ok(())
}

#[cfg(test)]
fn map_row_to_transaction(row: &rusqlite::Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        external_id: row.get(2)?,
        date: row.get(3)?,
        description: row.get(4)?,
        amount: crate::db::get_decimal(row, 5)?,
        currency: row.get(6)?,
        category: row.get(7)?,
        is_pending: row.get(8)?,
        is_manual: row.get(9)?,
    })
}

/// Insert the transactions whose external ids are not in the database yet.
///
/// Transactions that already exist are left untouched, including their
/// pending flag. The batch is written in a single SQL transaction: if any
/// insert fails, none of the batch is kept.
///
/// Returns the number of transactions that were newly inserted.
///
/// # Errors
/// Returns [Error::SqlError] if any insert fails for a reason other than a
/// duplicate external id.
pub fn insert_transactions_if_absent(
    transactions: &[SyncedTransaction],
    connection: &Connection,
) -> Result<usize, Error> {
    let sql_transaction = connection.unchecked_transaction()?;
    let mut inserted = 0;

    {
        let mut statement = sql_transaction.prepare(
            "INSERT INTO \"transaction\"
                (account_id, external_id, date, description, amount, currency, category, is_pending, is_manual)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)
            ON CONFLICT(external_id) DO NOTHING",
        )?;

        for transaction in transactions {
            inserted += statement.execute(params![
                transaction.account_id,
                transaction.external_id,
                transaction.date,
                transaction.description,
                transaction.amount.to_string(),
                transaction.currency,
                transaction.category,
                transaction.is_pending,
            ])?;
        }
    }

    sql_transaction.commit()?;

    Ok(inserted)
}

/// Get the transactions for an account, newest first.
#[cfg(test)]
pub fn get_transactions_for_account(
    account_id: AccountId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, account_id, external_id, date, description, amount, currency, category, \
                is_pending, is_manual
            FROM \"transaction\" WHERE account_id = ?1 ORDER BY date DESC, id DESC",
        )?
        .query_map([account_id], map_row_to_transaction)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

/// Count the transactions on or after `since` across all of a user's accounts.
pub fn count_transactions_since(
    user_id: UserID,
    since: Date,
    connection: &Connection,
) -> Result<u64, Error> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(t.id) FROM \"transaction\" t
        INNER JOIN account a ON a.id = t.account_id
        WHERE a.user_id = ?1 AND t.date >= ?2",
        params![user_id.as_i64(), since],
        |row| row.get(0),
    )?;

    // COUNT never yields a negative number.
    Ok(u64::try_from(count).unwrap_or_default())
}

#[cfg(test)]
mod create_table_tests {
    use rusqlite::Connection;

    use super::create_transaction_table;

    #[test]
    fn sql_is_valid() {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");

        assert_eq!(Ok(()), create_transaction_table(&connection));
    }
}
