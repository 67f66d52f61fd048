//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use rusqlite::Connection;
use sha2::{Digest, Sha512};
use time::Duration;

use crate::{
    Error,
    aggregator::AggregatorGateway,
    auth::{DEFAULT_COOKIE_DURATION, PasswordHash},
    db::initialize,
    sync::{DEFAULT_QUEUE_CAPACITY, SyncDispatcher, SyncEngine},
};

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,

    /// The duration for which cookies used for authentication are valid.
    pub cookie_duration: Duration,

    /// The bcrypt cost used to hash the passwords of new users.
    pub password_cost: u32,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// The client for the bank aggregator.
    pub gateway: Arc<dyn AggregatorGateway>,

    /// Runs syncs that a request waits for.
    pub sync_engine: Arc<SyncEngine>,

    /// Queues syncs that run in the background.
    pub dispatcher: SyncDispatcher,

    /// The public base URL of this app, e.g. "https://money.example.com".
    ///
    /// The aggregator sends users back to this URL once they have linked a bank.
    pub app_url: String,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection and start the
    /// background sync worker.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    /// It must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        cookie_secret: &str,
        gateway: Arc<dyn AggregatorGateway>,
        app_url: &str,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        let connection = Arc::new(Mutex::new(db_connection));
        let sync_engine = Arc::new(SyncEngine::new(connection.clone(), gateway.clone()));
        let dispatcher = SyncDispatcher::spawn(sync_engine.clone(), DEFAULT_QUEUE_CAPACITY);

        Ok(Self {
            cookie_key: create_cookie_key(cookie_secret),
            cookie_duration: DEFAULT_COOKIE_DURATION,
            password_cost: PasswordHash::DEFAULT_COST,
            db_connection: connection,
            gateway,
            sync_engine,
            dispatcher,
            app_url: app_url.trim_end_matches('/').to_owned(),
        })
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Create a signing key for cookies from a `secret`s string.
pub fn create_cookie_key(secret: &str) -> Key {
    let hash = Sha512::digest(secret);

    Key::from(&hash)
}
