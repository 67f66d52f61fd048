//! The reqwest implementation of [AggregatorGateway].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    AggregatorConfig, Error,
    aggregator::{
        AccountListing, AggregatorCredentials, AggregatorGateway, AggregatorUser, GatewayError,
        RemoteAccount, RemoteConnection, RemoteTransaction, TransactionQuery,
    },
    logging::truncate,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// How much of an aggregator response is kept in an error message.
const ERROR_EXCERPT_LENGTH_LIMIT: usize = 200;
const QUERY_DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

/// An HTTP client for the bank aggregator, created once and shared by all requests.
#[derive(Debug)]
pub struct AggregatorClient {
    http: Client,
    api_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl AggregatorClient {
    /// Create a client for the API at `config.api_url`, taking ownership of the client secret.
    ///
    /// # Errors
    /// Returns [Error::Config] if the HTTP client cannot be built.
    pub fn new(config: AggregatorConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| Error::Config(format!("could not build HTTP client: {error}")))?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            client_id: config.client_id,
            client_secret: config.client_secret,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// The webview is served from the API host without the version prefix.
    fn webview_base_url(&self) -> String {
        self.api_url
            .replacen("/2.0", "", 1)
            .trim_end_matches('/')
            .to_owned()
    }

    fn authorized(
        &self,
        request: RequestBuilder,
        credentials: &AggregatorCredentials,
    ) -> RequestBuilder {
        request.bearer_auth(&credentials.auth_token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, GatewayError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!("Aggregator responded with status {status}: {body}");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let body = self.send(request).await?;

        serde_json::from_str(&body)
            .map_err(|error| GatewayError::Malformed(excerpt(&error.to_string())))
    }
}

/// `text` cut down to a length that is safe to store and show to API clients.
fn excerpt(text: &str) -> String {
    match truncate(text, ERROR_EXCERPT_LENGTH_LIMIT) {
        Some(truncated) => format!("{truncated}..."),
        None => text.to_owned(),
    }
}

fn format_query_date(date: Date) -> Result<String, GatewayError> {
    date.format(QUERY_DATE_FORMAT)
        .map_err(|error| GatewayError::Malformed(format!("could not format date {date}: {error}")))
}

#[async_trait]
impl AggregatorGateway for AggregatorClient {
    async fn create_user_and_token(&self) -> Result<AggregatorUser, GatewayError> {
        #[derive(Serialize)]
        struct Request<'a> {
            client_id: &'a str,
            client_secret: &'a str,
        }

        #[derive(Deserialize)]
        struct Response {
            auth_token: Option<String>,
            id_user: Option<serde_json::Value>,
        }

        let request = self.http.post(self.url("/auth/init")).json(&Request {
            client_id: &self.client_id,
            client_secret: self.client_secret.expose_secret(),
        });
        let response: Response = self.send_json(request).await?;

        let auth_token = response
            .auth_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| GatewayError::Malformed("missing auth_token".to_owned()))?;
        let external_user_id = match response.id_user {
            Some(serde_json::Value::Number(id)) => id.to_string(),
            Some(serde_json::Value::String(id)) if !id.is_empty() => id,
            _ => return Err(GatewayError::Malformed("missing id_user".to_owned())),
        };

        Ok(AggregatorUser {
            auth_token,
            external_user_id,
        })
    }

    fn webview_url(&self, auth_token: &str, redirect_url: &str) -> String {
        format!(
            "{}/auth/webview/{}?token={}&redirect_uri={}",
            self.webview_base_url(),
            self.client_id,
            auth_token,
            urlencoding::encode(redirect_url)
        )
    }

    async fn list_accounts(
        &self,
        credentials: &AggregatorCredentials,
    ) -> Result<AccountListing, GatewayError> {
        #[derive(Deserialize)]
        struct Response {
            accounts: Option<Vec<serde_json::Value>>,
        }

        let request = self.authorized(
            self.http.get(self.url(&format!(
                "/users/{}/accounts",
                credentials.external_user_id
            ))),
            credentials,
        );
        let response: Response = self.send_json(request).await?;

        Ok(response
            .accounts
            .unwrap_or_default()
            .into_iter()
            .map(RemoteAccount::from_listing_entry)
            .collect())
    }

    async fn list_transactions(
        &self,
        credentials: &AggregatorCredentials,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<RemoteTransaction>, GatewayError> {
        #[derive(Deserialize)]
        struct Response {
            transactions: Option<Vec<RemoteTransaction>>,
        }

        let mut params = vec![
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(min_date) = query.min_date {
            params.push(("min_date", format_query_date(min_date)?));
        }
        if let Some(max_date) = query.max_date {
            params.push(("max_date", format_query_date(max_date)?));
        }

        let request = self.authorized(
            self.http
                .get(self.url(&format!(
                    "/users/{}/accounts/{}/transactions",
                    credentials.external_user_id, account_id
                )))
                .query(&params),
            credentials,
        );
        let response: Response = self.send_json(request).await?;

        Ok(response.transactions.unwrap_or_default())
    }

    async fn trigger_sync(&self, credentials: &AggregatorCredentials) -> Result<(), GatewayError> {
        let request = self.authorized(
            self.http
                .post(self.url(&format!(
                    "/users/{}/connections",
                    credentials.external_user_id
                )))
                .json(&serde_json::json!({})),
            credentials,
        );
        self.send(request).await?;

        Ok(())
    }

    async fn list_connections(
        &self,
        credentials: &AggregatorCredentials,
    ) -> Result<Vec<RemoteConnection>, GatewayError> {
        #[derive(Deserialize)]
        struct Response {
            connections: Option<Vec<RemoteConnection>>,
        }

        let request = self.authorized(
            self.http.get(self.url(&format!(
                "/users/{}/connections",
                credentials.external_user_id
            ))),
            credentials,
        );
        let response: Response = self.send_json(request).await?;

        Ok(response.connections.unwrap_or_default())
    }

    async fn delete_user(&self, credentials: &AggregatorCredentials) -> Result<(), GatewayError> {
        let request = self.authorized(
            self.http
                .delete(self.url(&format!("/users/{}", credentials.external_user_id))),
            credentials,
        );
        self.send(request).await?;

        Ok(())
    }
}
