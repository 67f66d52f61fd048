//! The capability the sync engine and route handlers use to talk to the aggregator.

use async_trait::async_trait;

use crate::{
    Error,
    aggregator::{
        AccountListing, AggregatorCredentials, AggregatorUser, RemoteConnection, RemoteTransaction,
        TransactionQuery,
    },
};

/// Why an aggregator call failed.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request could not be sent or the response could not be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The aggregator answered with a non-success status.
    #[error("aggregator responded with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The aggregator answered with data that is missing fields or cannot be parsed.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<GatewayError> for Error {
    fn from(error: GatewayError) -> Self {
        Error::Upstream(error.to_string())
    }
}

/// A typed view of the bank aggregator's HTTP API.
///
/// Implementations must be safe to share between concurrent syncs. No call is retried.
#[async_trait]
pub trait AggregatorGateway: Send + Sync {
    /// Create an aggregator-side user and a permanent token to act as them.
    async fn create_user_and_token(&self) -> Result<AggregatorUser, GatewayError>;

    /// The URL of the aggregator's bank picker. The aggregator redirects to
    /// `redirect_url` once the user is done.
    fn webview_url(&self, auth_token: &str, redirect_url: &str) -> String;

    /// List the user's accounts across all of their linked banks.
    ///
    /// The call fails as a whole only if the listing itself cannot be fetched
    /// or read. An entry that is not a valid account is returned as an error
    /// in its place.
    async fn list_accounts(
        &self,
        credentials: &AggregatorCredentials,
    ) -> Result<AccountListing, GatewayError>;

    /// List one page of transactions for an account.
    async fn list_transactions(
        &self,
        credentials: &AggregatorCredentials,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<RemoteTransaction>, GatewayError>;

    /// Ask the aggregator to refresh the user's data from their banks.
    async fn trigger_sync(&self, credentials: &AggregatorCredentials) -> Result<(), GatewayError>;

    /// List the bank logins the user has made through the webview.
    async fn list_connections(
        &self,
        credentials: &AggregatorCredentials,
    ) -> Result<Vec<RemoteConnection>, GatewayError>;

    /// Delete the aggregator-side user and everything linked to them.
    async fn delete_user(&self, credentials: &AggregatorCredentials) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod gateway_error_tests {
    use crate::Error;

    use super::GatewayError;

    #[test]
    fn converts_to_upstream_error() {
        let error: Error = GatewayError::Status {
            status: 503,
            body: "maintenance".to_owned(),
        }
        .into();

        assert_eq!(
            error,
            Error::Upstream("aggregator responded with status 503: maintenance".to_owned())
        );
    }
}
