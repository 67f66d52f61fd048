//! The append-only audit log of sync attempts.

use std::fmt::Display;

use rusqlite::{
    Connection, Row, ToSql, params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{Error, UserID, connection::ConnectionId, database_id::DatabaseId};

/// How a sync attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Error,
}

impl SyncStatus {
    fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
        }
    }
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for SyncStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for SyncStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "success" => Ok(SyncStatus::Success),
            "error" => Ok(SyncStatus::Error),
            other => Err(FromSqlError::Other(
                format!("invalid sync status \"{other}\"").into(),
            )),
        }
    }
}

/// A recorded sync attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLog {
    pub id: DatabaseId,
    pub user_id: UserID,
    pub connection_id: ConnectionId,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
    pub status: SyncStatus,
    pub accounts_synced: u32,
    /// Remote accounts that were skipped because they could not be saved.
    pub accounts_failed: u32,
    pub transactions_synced: u32,
    pub error_message: Option<String>,
}

/// The counters of a sync attempt that is still running.
///
/// Nothing is written to the database until the attempt ends and
/// [PendingSyncLog::succeed] or [PendingSyncLog::fail] is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSyncLog {
    pub user_id: UserID,
    pub connection_id: ConnectionId,
    pub started_at: OffsetDateTime,
    pub accounts_synced: u32,
    pub accounts_failed: u32,
    pub transactions_synced: u32,
}

/// A finished sync attempt, ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSyncLog {
    pending: PendingSyncLog,
    completed_at: OffsetDateTime,
    status: SyncStatus,
    error_message: Option<String>,
}

impl PendingSyncLog {
    pub fn start(user_id: UserID, connection_id: ConnectionId, started_at: OffsetDateTime) -> Self {
        Self {
            user_id,
            connection_id,
            started_at,
            accounts_synced: 0,
            accounts_failed: 0,
            transactions_synced: 0,
        }
    }

    pub fn succeed(&self, completed_at: OffsetDateTime) -> CompletedSyncLog {
        CompletedSyncLog {
            pending: self.clone(),
            completed_at,
            status: SyncStatus::Success,
            error_message: None,
        }
    }

    pub fn fail(&self, error_message: &str, completed_at: OffsetDateTime) -> CompletedSyncLog {
        CompletedSyncLog {
            pending: self.clone(),
            completed_at,
            status: SyncStatus::Error,
            error_message: Some(error_message.to_owned()),
        }
    }
}

pub fn create_sync_log_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_log (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            connection_id INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('success', 'error')),
            accounts_synced INTEGER NOT NULL,
            accounts_failed INTEGER NOT NULL DEFAULT 0,
            transactions_synced INTEGER NOT NULL,
            error_message TEXT,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(connection_id) REFERENCES bank_connection(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_sync_log_connection ON sync_log(connection_id, started_at);

        CREATE TRIGGER IF NOT EXISTS sync_log_no_update BEFORE UPDATE ON sync_log
        BEGIN
            SELECT RAISE(ABORT, 'sync_log is append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS sync_log_no_delete BEFORE DELETE ON sync_log
        BEGIN
            SELECT RAISE(ABORT, 'sync_log is append-only');
        END;",
    )
}

const SYNC_LOG_COLUMNS: &str = "id, user_id, connection_id, started_at, completed_at, status, \
    accounts_synced, accounts_failed, transactions_synced, error_message";

fn map_row_to_sync_log(row: &Row) -> Result<SyncLog, rusqlite::Error> {
    Ok(SyncLog {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        connection_id: row.get(2)?,
        started_at: row.get(3)?,
        completed_at: row.get(4)?,
        status: row.get(5)?,
        accounts_synced: row.get(6)?,
        accounts_failed: row.get(7)?,
        transactions_synced: row.get(8)?,
        error_message: row.get(9)?,
    })
}

/// Append a finished sync attempt to the log.
pub fn record_sync_log(log: &CompletedSyncLog, connection: &Connection) -> Result<SyncLog, Error> {
    connection
        .query_row(
            &format!(
                "INSERT INTO sync_log (user_id, connection_id, started_at, completed_at, status, \
                    accounts_synced, accounts_failed, transactions_synced, error_message)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                RETURNING {SYNC_LOG_COLUMNS}"
            ),
            params![
                log.pending.user_id.as_i64(),
                log.pending.connection_id,
                log.pending.started_at,
                log.completed_at,
                log.status,
                log.pending.accounts_synced,
                log.pending.accounts_failed,
                log.pending.transactions_synced,
                log.error_message,
            ],
            map_row_to_sync_log,
        )
        .map_err(Error::from)
}

/// Get the sync attempts for a connection, newest first.
pub fn get_sync_logs_for_connection(
    connection_id: ConnectionId,
    connection: &Connection,
) -> Result<Vec<SyncLog>, Error> {
    connection
        .prepare(&format!(
            "SELECT {SYNC_LOG_COLUMNS} FROM sync_log WHERE connection_id = ?1
            ORDER BY started_at DESC, id DESC"
        ))?
        .query_map([connection_id], map_row_to_sync_log)?
        .map(|maybe_log| maybe_log.map_err(Error::from))
        .collect()
}
