//! The bank connection model and its database queries.

use std::fmt::Display;

use rusqlite::{
    Connection, Row, ToSql, params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{Error, UserID, aggregator::AggregatorCredentials, database_id::DatabaseId};

pub type ConnectionId = DatabaseId;

/// Where a bank connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// The user has started linking a bank but the aggregator has not called back yet.
    Pending,
    /// The bank is linked and the last sync succeeded.
    Active,
    /// Linking or the last sync failed, see the connection's error message.
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Active => "active",
            ConnectionStatus::Error => "error",
        }
    }
}

impl Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for ConnectionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for ConnectionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "pending" => Ok(ConnectionStatus::Pending),
            "active" => Ok(ConnectionStatus::Active),
            "error" => Ok(ConnectionStatus::Error),
            other => Err(FromSqlError::Other(
                format!("invalid connection status \"{other}\"").into(),
            )),
        }
    }
}

/// A link between a user and an aggregator-side user whose banks are synced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankConnection {
    pub id: ConnectionId,
    pub user_id: UserID,
    /// The aggregator's id for the user that owns the linked banks.
    pub external_id: String,
    /// The token used to act as the aggregator-side user.
    #[serde(skip_serializing)]
    pub auth_token: String,
    pub bank_name: Option<String>,
    pub bank_logo_url: Option<String>,
    pub status: ConnectionStatus,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl BankConnection {
    /// The credentials for acting as this connection's aggregator-side user.
    pub fn credentials(&self) -> AggregatorCredentials {
        AggregatorCredentials {
            external_user_id: self.external_id.clone(),
            auth_token: self.auth_token.clone(),
        }
    }
}

pub fn create_bank_connection_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS bank_connection (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            external_id TEXT NOT NULL UNIQUE,
            auth_token TEXT NOT NULL,
            bank_name TEXT,
            bank_logo_url TEXT,
            status TEXT NOT NULL CHECK (status IN ('pending', 'active', 'error')),
            error_message TEXT,
            last_sync_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

const CONNECTION_COLUMNS: &str = "id, user_id, external_id, auth_token, bank_name, \
    bank_logo_url, status, error_message, last_sync_at, created_at";

fn map_row_to_connection(row: &Row) -> Result<BankConnection, rusqlite::Error> {
    Ok(BankConnection {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        external_id: row.get(2)?,
        auth_token: row.get(3)?,
        bank_name: row.get(4)?,
        bank_logo_url: row.get(5)?,
        status: row.get(6)?,
        error_message: row.get(7)?,
        last_sync_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Record a bank link the user has just started, before the aggregator calls back.
///
/// # Errors
/// Returns [Error::SqlError] if `external_id` is already used by another connection.
pub fn create_pending_connection(
    user_id: UserID,
    external_id: &str,
    auth_token: &str,
    created_at: OffsetDateTime,
    connection: &Connection,
) -> Result<BankConnection, Error> {
    connection
        .query_row(
            &format!(
                "INSERT INTO bank_connection (user_id, external_id, auth_token, status, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                RETURNING {CONNECTION_COLUMNS}"
            ),
            params![
                user_id.as_i64(),
                external_id,
                auth_token,
                ConnectionStatus::Pending,
                created_at
            ],
            map_row_to_connection,
        )
        .map_err(Error::from)
}

/// Get the connection with the aggregator-side id `external_id`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such connection.
pub fn get_connection_by_external_id(
    external_id: &str,
    connection: &Connection,
) -> Result<BankConnection, Error> {
    connection
        .query_row(
            &format!("SELECT {CONNECTION_COLUMNS} FROM bank_connection WHERE external_id = ?1"),
            [external_id],
            map_row_to_connection,
        )
        .map_err(Error::from)
}

/// Get the connection `connection_id` if it belongs to `user_id`.
///
/// # Errors
/// Returns [Error::NotFound] if the connection does not exist or belongs to someone else.
pub fn get_connection_for_user(
    connection_id: ConnectionId,
    user_id: UserID,
    connection: &Connection,
) -> Result<BankConnection, Error> {
    connection
        .query_row(
            &format!(
                "SELECT {CONNECTION_COLUMNS} FROM bank_connection WHERE id = ?1 AND user_id = ?2"
            ),
            params![connection_id, user_id.as_i64()],
            map_row_to_connection,
        )
        .map_err(Error::from)
}

/// Get all of a user's connections, oldest first.
pub fn get_connections_for_user(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<BankConnection>, Error> {
    connection
        .prepare(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM bank_connection WHERE user_id = ?1 ORDER BY id"
        ))?
        .query_map([user_id.as_i64()], map_row_to_connection)?
        .map(|maybe_connection| maybe_connection.map_err(Error::from))
        .collect()
}

/// Set the status and error message of the connection with the aggregator-side id `external_id`.
///
/// Returns `false` if no connection has that external id.
pub fn set_connection_status(
    external_id: &str,
    status: ConnectionStatus,
    error_message: Option<&str>,
    connection: &Connection,
) -> Result<bool, Error> {
    let rows_updated = connection.execute(
        "UPDATE bank_connection SET status = ?2, error_message = ?3 WHERE external_id = ?1",
        params![external_id, status, error_message],
    )?;

    Ok(rows_updated == 1)
}

/// Fill in the bank name and logo of a connection unless it already has them.
pub fn set_bank_details_if_missing(
    connection_id: ConnectionId,
    bank_name: Option<&str>,
    bank_logo_url: Option<&str>,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "UPDATE bank_connection SET
            bank_name = COALESCE(bank_name, ?2),
            bank_logo_url = COALESCE(bank_logo_url, ?3)
        WHERE id = ?1",
        params![connection_id, bank_name, bank_logo_url],
    )?;

    Ok(())
}

/// Mark a connection as successfully synced at `synced_at`, clearing any previous error.
///
/// # Errors
/// Returns [Error::NotFound] if the connection does not exist.
pub fn mark_connection_synced(
    connection_id: ConnectionId,
    synced_at: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_updated = connection.execute(
        "UPDATE bank_connection SET last_sync_at = ?2, status = ?3, error_message = NULL
        WHERE id = ?1",
        params![connection_id, synced_at, ConnectionStatus::Active],
    )?;

    match rows_updated {
        0 => Err(Error::NotFound),
        _ => Ok(()),
    }
}


#[cfg(test)]
mod bank_connection_tests {
    use rusqlite::Connection;
    use time::{OffsetDateTime, macros::datetime};

    use crate::{Error, UserID, db::initialize, test_utils::insert_test_user};

    use super::{
        ConnectionStatus, create_pending_connection, get_connection_by_external_id,
        get_connection_for_user, get_connections_for_user, mark_connection_synced,
        set_bank_details_if_missing, set_connection_status,
    };

    const CREATED_AT: OffsetDateTime = datetime!(2025-03-01 09:30:00 UTC);

    fn get_test_connection() -> (Connection, UserID) {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let user = insert_test_user(&conn, "foo@bar.baz");
        (conn, user.id)
    }

    #[test]
    fn create_pending_connection_succeeds() {
        let (conn, user_id) = get_test_connection();

        let created = create_pending_connection(user_id, "42", "token", CREATED_AT, &conn).unwrap();

        assert_eq!(created.status, ConnectionStatus::Pending);
        assert_eq!(created.bank_name, None);
        assert_eq!(created.last_sync_at, None);
        assert_eq!(created.created_at, CREATED_AT);
        assert_eq!(get_connection_by_external_id("42", &conn), Ok(created));
    }

    #[test]
    fn external_id_is_unique() {
        let (conn, user_id) = get_test_connection();
        create_pending_connection(user_id, "42", "token", CREATED_AT, &conn).unwrap();

        let result = create_pending_connection(user_id, "42", "other", CREATED_AT, &conn);

        assert!(matches!(result, Err(Error::SqlError(_))));
    }

    #[test]
    fn get_connection_for_other_user_is_not_found() {
        let (conn, user_id) = get_test_connection();
        let other_user = insert_test_user(&conn, "other@bar.baz");
        let created = create_pending_connection(user_id, "42", "token", CREATED_AT, &conn).unwrap();

        assert_eq!(
            get_connection_for_user(created.id, other_user.id, &conn),
            Err(Error::NotFound)
        );
        assert_eq!(
            get_connection_for_user(created.id, user_id, &conn),
            Ok(created)
        );
        assert!(get_connections_for_user(other_user.id, &conn).unwrap().is_empty());
    }

    #[test]
    fn set_connection_status_updates_matching_connection() {
        let (conn, user_id) = get_test_connection();
        create_pending_connection(user_id, "42", "token", CREATED_AT, &conn).unwrap();

        let updated =
            set_connection_status("42", ConnectionStatus::Error, Some("connection failed"), &conn)
                .unwrap();

        assert!(updated);
        let got = get_connection_by_external_id("42", &conn).unwrap();
        assert_eq!(got.status, ConnectionStatus::Error);
        assert_eq!(got.error_message.as_deref(), Some("connection failed"));
    }

    #[test]
    fn set_connection_status_reports_missing_connection() {
        let (conn, _) = get_test_connection();

        let updated = set_connection_status("missing", ConnectionStatus::Active, None, &conn).unwrap();

        assert!(!updated);
    }

    #[test]
    fn bank_details_are_only_set_once() {
        let (conn, user_id) = get_test_connection();
        let created = create_pending_connection(user_id, "42", "token", CREATED_AT, &conn).unwrap();

        set_bank_details_if_missing(created.id, Some("First Bank"), None, &conn).unwrap();
        set_bank_details_if_missing(
            created.id,
            Some("Second Bank"),
            Some("https://logo.example/2.png"),
            &conn,
        )
        .unwrap();

        let got = get_connection_by_external_id("42", &conn).unwrap();
        assert_eq!(got.bank_name.as_deref(), Some("First Bank"));
        assert_eq!(got.bank_logo_url.as_deref(), Some("https://logo.example/2.png"));
    }

    #[test]
    fn mark_connection_synced_clears_error() {
        let (conn, user_id) = get_test_connection();
        let created = create_pending_connection(user_id, "42", "token", CREATED_AT, &conn).unwrap();
        set_connection_status("42", ConnectionStatus::Error, Some("boom"), &conn).unwrap();
        let synced_at = datetime!(2025-03-02 10:00:00 UTC);

        mark_connection_synced(created.id, synced_at, &conn).unwrap();

        let got = get_connection_by_external_id("42", &conn).unwrap();
        assert_eq!(got.status, ConnectionStatus::Active);
        assert_eq!(got.error_message, None);
        assert_eq!(got.last_sync_at, Some(synced_at));
    }

    #[test]
    fn mark_missing_connection_synced_fails() {
        let (conn, _) = get_test_connection();

        assert_eq!(
            mark_connection_synced(1234, CREATED_AT, &conn),
            Err(Error::NotFound)
        );
    }
}
