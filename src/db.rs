//! Creates the application's database schema and holds helpers shared by the
//! table modules.

use std::str::FromStr;

use rusqlite::{Connection, Row, Transaction as SqlTransaction, TransactionBehavior, types::Type};
use rust_decimal::Decimal;

use crate::{
    account::create_account_table, auth::create_user_table,
    balance::create_balance_history_table, connection::create_bank_connection_table,
    sync::create_sync_log_table, transaction::create_transaction_table,
};

/// Create all of the application's tables if they do not already exist.
///
/// The tables are created inside a single exclusive transaction, so either
/// every table is created or none are.
///
/// # Errors
/// Returns an error if any of the SQL statements fail.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_bank_connection_table(&transaction)?;
    create_account_table(&transaction)?;
    create_balance_history_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_sync_log_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Read a decimal that was stored as text from column `index` of `row`.
pub fn get_decimal(row: &Row, index: usize) -> Result<Decimal, rusqlite::Error> {
    let text: String = row.get(index)?;

    Decimal::from_str(&text)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}


#[cfg(test)]
mod get_decimal_tests {
    use rusqlite::Connection;
    use rust_decimal::Decimal;

    use super::get_decimal;

    #[test]
    fn reads_decimal_text() {
        let conn = Connection::open_in_memory().unwrap();

        let got = conn
            .query_row("SELECT '-1234.56'", [], |row| get_decimal(row, 0))
            .unwrap();

        assert_eq!(got, Decimal::new(-123456, 2));
    }

    #[test]
    fn rejects_non_numeric_text() {
        let conn = Connection::open_in_memory().unwrap();

        let result = conn.query_row("SELECT 'lots'", [], |row| get_decimal(row, 0));

        assert!(matches!(
            result,
            Err(rusqlite::Error::FromSqlConversionFailure(0, _, _))
        ));
    }
}
