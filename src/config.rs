//! Settings for reaching the bank aggregator.

use secrecy::SecretString;

use crate::Error;

/// The environment variable holding the aggregator client ID.
pub const CLIENT_ID_VAR: &str = "AGGREGATOR_CLIENT_ID";
/// The environment variable holding the aggregator client secret.
pub const CLIENT_SECRET_VAR: &str = "AGGREGATOR_CLIENT_SECRET";

/// How to reach and authenticate with the bank aggregator's API.
#[derive(Debug)]
pub struct AggregatorConfig {
    /// The base URL of the API including its version prefix, e.g. "https://example.biapi.pro/2.0".
    pub api_url: String,
    /// The client ID issued by the aggregator.
    pub client_id: String,
    /// The client secret issued by the aggregator.
    pub client_secret: SecretString,
}

impl AggregatorConfig {
    /// Build the config for `api_url`, reading the client credentials with `lookup`.
    ///
    /// Pass `|key| std::env::var(key).ok()` to read the credentials from the environment.
    ///
    /// # Errors
    /// Returns [Error::Config] if the API URL is empty or a credential is missing or empty.
    pub fn from_lookup(
        api_url: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Error> {
        if api_url.trim().is_empty() {
            return Err(Error::Config("the aggregator API URL must be set".to_owned()));
        }

        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("the environment variable '{key}' must be set")))
        };

        Ok(Self {
            api_url: api_url.trim().to_owned(),
            client_id: required(CLIENT_ID_VAR)?,
            client_secret: SecretString::from(required(CLIENT_SECRET_VAR)?),
        })
    }
}
