//! Pulls a connection's accounts, balances and transactions from the aggregator
//! and merges them into the database.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};

use crate::{
    Error,
    account::{AccountId, SyncedAccount, map_account_type, upsert_synced_account},
    aggregator::{
        AggregatorCredentials, AggregatorGateway, RemoteAccount, RemoteTransaction,
        TransactionQuery,
    },
    balance::insert_balance_if_absent,
    connection::{
        BankConnection, ConnectionStatus, get_connection_by_external_id, mark_connection_synced,
        set_bank_details_if_missing, set_connection_status,
    },
    sync::{
        ledger::{PendingSyncLog, record_sync_log},
        single_flight::SingleFlight,
    },
    transaction::{SyncedTransaction, insert_transactions_if_absent},
};

/// How many days of transactions each sync asks for, counting back from today.
pub const TRANSACTION_WINDOW_DAYS: i64 = 90;
/// The page size used when listing an account's transactions during a sync.
pub const TRANSACTION_SYNC_LIMIT: u32 = 500;

/// What a successful sync wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// The number of remote accounts that were saved.
    pub accounts_synced: u32,
    /// The number of transactions fetched for the saved accounts.
    pub transactions_synced: u32,
}

/// Reconciles bank connections with the aggregator.
///
/// Syncs of the same connection run one at a time, syncs of different
/// connections may run concurrently.
pub struct SyncEngine {
    db_connection: Arc<Mutex<Connection>>,
    gateway: Arc<dyn AggregatorGateway>,
    in_flight: SingleFlight,
}

impl SyncEngine {
    pub fn new(db_connection: Arc<Mutex<Connection>>, gateway: Arc<dyn AggregatorGateway>) -> Self {
        Self {
            db_connection,
            gateway,
            in_flight: SingleFlight::default(),
        }
    }

    /// Sync the connection with the aggregator-side id `external_id`.
    ///
    /// A failure to save one account is logged and counted, and the remaining
    /// accounts are still synced. Any other failure marks the connection as
    /// errored, is recorded in the sync log and is returned.
    ///
    /// # Errors
    /// Returns:
    /// - [Error::NotFound] if there is no connection with that id,
    /// - [Error::Upstream] if the accounts could not be listed,
    /// - [Error::SqlError] or [Error::DatabaseLockError] if the outcome could not be saved.
    pub async fn sync_connection(&self, external_id: &str) -> Result<SyncResult, Error> {
        let _in_flight = self.in_flight.acquire(external_id).await;

        let bank_connection = self.with_db(|conn| get_connection_by_external_id(external_id, conn))?;
        let started_at = OffsetDateTime::now_utc();
        let mut log = PendingSyncLog::start(bank_connection.user_id, bank_connection.id, started_at);

        tracing::info!("Starting sync of connection {external_id}");

        match self.reconcile(&bank_connection, started_at, &mut log).await {
            Ok(result) => {
                tracing::info!(
                    "Synced connection {external_id}: {} accounts, {} transactions, {} accounts failed",
                    result.accounts_synced,
                    result.transactions_synced,
                    log.accounts_failed
                );
                Ok(result)
            }
            Err(error) => {
                tracing::error!("Sync of connection {external_id} failed: {error}");
                self.record_failure(&bank_connection, &log, &error);
                Err(error)
            }
        }
    }

    async fn reconcile(
        &self,
        bank_connection: &BankConnection,
        started_at: OffsetDateTime,
        log: &mut PendingSyncLog,
    ) -> Result<SyncResult, Error> {
        let credentials = bank_connection.credentials();

        let remote_accounts = self.gateway.list_accounts(&credentials).await?;

        let first_account = remote_accounts.iter().find_map(|entry| entry.as_ref().ok());
        if let Some(bank) = first_account.and_then(|account| account.bank.as_ref()) {
            let enriched = self.with_db(|conn| {
                set_bank_details_if_missing(
                    bank_connection.id,
                    bank.name.as_deref(),
                    bank.logo_url.as_deref(),
                    conn,
                )
            });

            if let Err(error) = enriched {
                tracing::warn!(
                    "Could not save bank details for connection {}: {error}",
                    bank_connection.external_id
                );
            }
        }

        let today = started_at.date();
        let min_date = today.saturating_sub(Duration::days(TRANSACTION_WINDOW_DAYS));

        for entry in &remote_accounts {
            match entry {
                Ok(remote_account) => {
                    self.sync_account(
                        bank_connection,
                        &credentials,
                        remote_account,
                        today,
                        min_date,
                        log,
                    )
                    .await;
                }
                Err(malformed) => {
                    tracing::error!(
                        "Skipping account of connection {}: {malformed}",
                        bank_connection.external_id
                    );
                    log.accounts_failed += 1;
                }
            }
        }

        let completed_at = OffsetDateTime::now_utc();
        self.with_db(|conn| {
            mark_connection_synced(bank_connection.id, completed_at, conn)?;
            record_sync_log(&log.succeed(completed_at), conn)
        })?;

        Ok(SyncResult {
            accounts_synced: log.accounts_synced,
            transactions_synced: log.transactions_synced,
        })
    }

    async fn sync_account(
        &self,
        bank_connection: &BankConnection,
        credentials: &AggregatorCredentials,
        remote_account: &RemoteAccount,
        today: Date,
        min_date: Date,
        log: &mut PendingSyncLog,
    ) {
        let synced_account = SyncedAccount {
            user_id: bank_connection.user_id,
            connection_id: bank_connection.id,
            external_id: remote_account.id.clone(),
            name: remote_account.name.clone(),
            account_type: map_account_type(remote_account.account_type.as_deref().unwrap_or_default()),
            balance: remote_account.balance,
            currency: remote_account.currency.clone(),
            institution_name: remote_account.bank.as_ref().and_then(|bank| bank.name.clone()),
        };

        let account = match self.with_db(|conn| upsert_synced_account(&synced_account, conn)) {
            Ok(account) => account,
            Err(error) => {
                tracing::error!("Could not save account {}: {error}", remote_account.id);
                log.accounts_failed += 1;
                return;
            }
        };

        log.accounts_synced += 1;

        if let Err(error) = self.with_db(|conn| {
            insert_balance_if_absent(account.id, account.balance, &account.currency, today, conn)
        }) {
            tracing::error!("Could not record balance of account {}: {error}", remote_account.id);
        }

        let query = TransactionQuery {
            min_date: Some(min_date),
            limit: TRANSACTION_SYNC_LIMIT,
            ..TransactionQuery::default()
        };

        let remote_transactions = match self
            .gateway
            .list_transactions(credentials, &remote_account.id, &query)
            .await
        {
            Ok(transactions) => transactions,
            Err(error) => {
                tracing::error!(
                    "Could not fetch transactions of account {}: {error}",
                    remote_account.id
                );
                return;
            }
        };

        let transactions: Vec<SyncedTransaction> = remote_transactions
            .iter()
            .map(|transaction| to_synced_transaction(account.id, transaction))
            .collect();

        match self.with_db(|conn| insert_transactions_if_absent(&transactions, conn)) {
            Ok(inserted) => {
                tracing::debug!(
                    "Fetched {} transactions for account {}, {inserted} new",
                    transactions.len(),
                    remote_account.id
                );
                let fetched = u32::try_from(transactions.len()).unwrap_or(u32::MAX);
                log.transactions_synced = log.transactions_synced.saturating_add(fetched);
            }
            Err(error) => {
                tracing::error!(
                    "Could not save transactions of account {}: {error}",
                    remote_account.id
                );
            }
        }
    }

    fn record_failure(&self, bank_connection: &BankConnection, log: &PendingSyncLog, error: &Error) {
        let message = error.to_string();
        let completed_at = OffsetDateTime::now_utc();

        let recorded = self.with_db(|conn| {
            set_connection_status(
                &bank_connection.external_id,
                ConnectionStatus::Error,
                Some(&message),
                conn,
            )?;
            record_sync_log(&log.fail(&message, completed_at), conn)
        });

        if let Err(secondary) = recorded {
            tracing::error!(
                "Could not record failed sync of connection {}: {secondary}",
                bank_connection.external_id
            );
        }
    }

    /// Run `f` with the database connection locked.
    ///
    /// The lock is released before this returns, so it is never held across an await.
    fn with_db<T>(&self, f: impl FnOnce(&Connection) -> Result<T, Error>) -> Result<T, Error> {
        let connection = self
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        f(&connection)
    }
}

fn to_synced_transaction(
    account_id: AccountId,
    transaction: &RemoteTransaction,
) -> SyncedTransaction {
    SyncedTransaction {
        account_id,
        external_id: transaction.id.clone(),
        date: transaction.date,
        description: transaction.description_or_default(),
        amount: transaction.amount,
        currency: transaction.currency.clone(),
        category: transaction.category.as_ref().map(|category| category.name.clone()),
        is_pending: transaction.is_pending(),
    }
}
