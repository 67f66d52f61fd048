//! An in-memory stand-in for the bank aggregator.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use rust_decimal::Decimal;
use time::Date;

use crate::aggregator::{
    AccountListing, AggregatorCredentials, AggregatorGateway, AggregatorUser, GatewayError,
    MalformedAccount, RemoteAccount, RemoteBank, RemoteConnection, RemoteTransaction,
    TransactionQuery,
};

#[derive(Debug, Default)]
pub(crate) struct StubGateway {
    user: Option<AggregatorUser>,
    accounts: Mutex<AccountListing>,
    fail_accounts: AtomicBool,
    transactions: HashMap<String, Vec<RemoteTransaction>>,
    failing_transactions: Vec<String>,
    delay: Option<Duration>,
    active_calls: AtomicUsize,
    max_active_calls: AtomicUsize,
    transaction_queries: Mutex<Vec<(String, TransactionQuery)>>,
    sync_triggers: AtomicUsize,
}

fn unavailable() -> GatewayError {
    GatewayError::Status {
        status: 503,
        body: "service unavailable".to_owned(),
    }
}

impl StubGateway {
    pub(crate) fn with_user(mut self, auth_token: &str, external_user_id: &str) -> Self {
        self.user = Some(AggregatorUser {
            auth_token: auth_token.to_owned(),
            external_user_id: external_user_id.to_owned(),
        });
        self
    }

    pub(crate) fn with_accounts(self, accounts: Vec<RemoteAccount>) -> Self {
        self.set_accounts(accounts);
        self
    }

    /// List `listing` as is, malformed entries included.
    pub(crate) fn with_listing(self, listing: AccountListing) -> Self {
        *self.accounts.lock().unwrap() = listing;
        self
    }

    pub(crate) fn with_failing_accounts(self) -> Self {
        self.fail_accounts.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_transactions(
        mut self,
        account_id: &str,
        transactions: Vec<RemoteTransaction>,
    ) -> Self {
        self.transactions.insert(account_id.to_owned(), transactions);
        self
    }

    pub(crate) fn with_failing_transactions(mut self, account_id: &str) -> Self {
        self.failing_transactions.push(account_id.to_owned());
        self
    }

    /// Make every account listing take `delay`.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the listed accounts and stop failing account listings.
    pub(crate) fn set_accounts(&self, accounts: Vec<RemoteAccount>) {
        *self.accounts.lock().unwrap() = accounts.into_iter().map(Ok).collect();
        self.fail_accounts.store(false, Ordering::SeqCst);
    }

    /// The account id and query of every transaction listing so far.
    pub(crate) fn transaction_queries(&self) -> Vec<(String, TransactionQuery)> {
        self.transaction_queries.lock().unwrap().clone()
    }

    /// The most account listings that were in progress at the same time.
    pub(crate) fn max_concurrent_calls(&self) -> usize {
        self.max_active_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sync_trigger_count(&self) -> usize {
        self.sync_triggers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AggregatorGateway for StubGateway {
    async fn create_user_and_token(&self) -> Result<AggregatorUser, GatewayError> {
        self.user.clone().ok_or_else(unavailable)
    }

    fn webview_url(&self, auth_token: &str, redirect_url: &str) -> String {
        format!("https://aggregator.test/webview?token={auth_token}&redirect_uri={redirect_url}")
    }

    async fn list_accounts(
        &self,
        _credentials: &AggregatorCredentials,
    ) -> Result<AccountListing, GatewayError> {
        let active = self.active_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_calls.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.active_calls.fetch_sub(1, Ordering::SeqCst);

        if self.fail_accounts.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        let accounts = self.accounts.lock().unwrap().clone();
        Ok(accounts)
    }

    async fn list_transactions(
        &self,
        _credentials: &AggregatorCredentials,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<RemoteTransaction>, GatewayError> {
        self.transaction_queries
            .lock()
            .unwrap()
            .push((account_id.to_owned(), query.clone()));

        if self.failing_transactions.iter().any(|id| id == account_id) {
            return Err(unavailable());
        }

        Ok(self.transactions.get(account_id).cloned().unwrap_or_default())
    }

    async fn trigger_sync(&self, _credentials: &AggregatorCredentials) -> Result<(), GatewayError> {
        self.sync_triggers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_connections(
        &self,
        _credentials: &AggregatorCredentials,
    ) -> Result<Vec<RemoteConnection>, GatewayError> {
        Ok(Vec::new())
    }

    async fn delete_user(&self, _credentials: &AggregatorCredentials) -> Result<(), GatewayError> {
        Ok(())
    }
}

pub(crate) fn remote_account(
    id: &str,
    name: &str,
    account_type: &str,
    balance: Decimal,
) -> RemoteAccount {
    RemoteAccount {
        id: id.to_owned(),
        name: name.to_owned(),
        balance,
        currency: "EUR".to_owned(),
        account_type: Some(account_type.to_owned()),
        bank: Some(RemoteBank {
            name: Some("Test Bank".to_owned()),
            logo_url: Some("https://bank.test/logo.png".to_owned()),
        }),
    }
}

pub(crate) fn malformed_account(id: &str) -> MalformedAccount {
    MalformedAccount {
        id: Some(id.to_owned()),
        reason: "invalid type: null, expected a Decimal".to_owned(),
    }
}

pub(crate) fn remote_transaction(id: &str, date: Date, amount: Decimal) -> RemoteTransaction {
    RemoteTransaction {
        id: id.to_owned(),
        date,
        description: Some(format!("Payment {id}")),
        original_description: None,
        amount,
        currency: "EUR".to_owned(),
        state: None,
        category: None,
    }
}
