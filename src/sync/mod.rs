//! Keeps local copies of bank data in step with the aggregator.

mod dispatcher;
mod engine;
mod ledger;
mod single_flight;

pub use dispatcher::{DEFAULT_QUEUE_CAPACITY, SyncDispatcher};
pub use engine::{SyncEngine, SyncResult};
pub use ledger::{SyncLog, SyncStatus, create_sync_log_table, get_sync_logs_for_connection};
