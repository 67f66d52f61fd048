//! Runs syncs in the background on behalf of request handlers that must not wait for them.

use std::sync::Arc;

use tokio::{
    sync::mpsc::{self, Receiver, Sender, error::TrySendError},
    task::{JoinError, JoinSet},
};

use crate::{
    Error,
    sync::{SyncEngine, SyncResult},
};

/// The number of syncs that may wait in the queue before dispatch is refused.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A handle for queueing background syncs.
///
/// Cloning the dispatcher gives another handle to the same queue.
#[derive(Debug, Clone)]
pub struct SyncDispatcher {
    sender: Sender<String>,
}

impl SyncDispatcher {
    /// Start the background task that runs queued syncs with `engine`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(engine: Arc<SyncEngine>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        tokio::spawn(supervise(engine, receiver));

        Self { sender }
    }

    #[cfg(test)]
    pub(crate) fn from_sender(sender: Sender<String>) -> Self {
        Self { sender }
    }

    /// Queue a sync of the connection with the aggregator-side id `external_id`.
    ///
    /// This returns as soon as the sync is queued. The outcome of the sync is
    /// only logged.
    ///
    /// # Errors
    /// Returns [Error::Dispatch] if the queue is full or the background task has stopped.
    pub fn dispatch(&self, external_id: &str) -> Result<(), Error> {
        self.sender
            .try_send(external_id.to_owned())
            .map_err(|error| match error {
                TrySendError::Full(_) => Error::Dispatch("the sync queue is full".to_owned()),
                TrySendError::Closed(_) => {
                    Error::Dispatch("the sync worker has stopped".to_owned())
                }
            })
    }
}

type SyncOutcome = (String, Result<SyncResult, Error>);

async fn supervise(engine: Arc<SyncEngine>, mut receiver: Receiver<String>) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            maybe_external_id = receiver.recv() => match maybe_external_id {
                Some(external_id) => {
                    let engine = engine.clone();
                    tasks.spawn(async move {
                        let result = engine.sync_connection(&external_id).await;
                        (external_id, result)
                    });
                }
                None => break,
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_outcome(joined),
        }
    }

    while let Some(joined) = tasks.join_next().await {
        log_outcome(joined);
    }

    tracing::debug!("Sync queue closed, background sync worker stopped");
}

fn log_outcome(joined: Result<SyncOutcome, JoinError>) {
    match joined {
        Ok((external_id, Ok(result))) => tracing::info!(
            "Background sync of connection {external_id} finished: {} accounts, {} transactions",
            result.accounts_synced,
            result.transactions_synced
        ),
        Ok((external_id, Err(error))) => {
            tracing::error!("Background sync of connection {external_id} failed: {error}")
        }
        Err(error) => tracing::error!("Background sync task panicked: {error}"),
    }
}

#[cfg(test)]
mod sync_dispatcher_tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use rusqlite::Connection;
    use rust_decimal::Decimal;
    use tokio::sync::mpsc;

    use crate::{
        Error,
        aggregator::AggregatorGateway,
        connection::{ConnectionStatus, get_connection_by_external_id},
        db::initialize,
        sync::SyncEngine,
        test_utils::{StubGateway, insert_test_connection, insert_test_user, remote_account},
    };

    use super::SyncDispatcher;

    #[tokio::test]
    async fn dispatched_sync_runs_in_background() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let user = insert_test_user(&conn, "foo@bar.baz");
        insert_test_connection(&conn, user.id, "conn-1");
        let db_connection = Arc::new(Mutex::new(conn));
        let gateway: Arc<dyn AggregatorGateway> = Arc::new(StubGateway::default().with_accounts(
            vec![remote_account("acc-1", "Everyday", "checking", Decimal::ONE)],
        ));
        let engine = Arc::new(SyncEngine::new(db_connection.clone(), gateway));
        let dispatcher = SyncDispatcher::spawn(engine, 4);

        dispatcher.dispatch("conn-1").unwrap();

        let mut status = ConnectionStatus::Pending;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let conn = db_connection.lock().unwrap();
            status = get_connection_by_external_id("conn-1", &conn).unwrap().status;
            if status == ConnectionStatus::Active {
                break;
            }
        }
        assert_eq!(status, ConnectionStatus::Active);
    }

    #[tokio::test]
    async fn full_queue_is_a_dispatch_error() {
        let (sender, _receiver) = mpsc::channel(1);
        let dispatcher = SyncDispatcher::from_sender(sender);

        dispatcher.dispatch("conn-1").unwrap();
        let result = dispatcher.dispatch("conn-2");

        assert!(matches!(result, Err(Error::Dispatch(_))));
    }

    #[tokio::test]
    async fn closed_queue_is_a_dispatch_error() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let dispatcher = SyncDispatcher::from_sender(sender);

        let result = dispatcher.dispatch("conn-1");

        assert!(matches!(result, Err(Error::Dispatch(_))));
    }
}
