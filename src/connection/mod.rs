//! Bank connections: linking a user's banks through the aggregator and
//! reacting to the aggregator's callbacks.

mod callback_endpoint;
mod connect_endpoint;
mod core;
mod sync_endpoint;

pub use callback_endpoint::bank_callback_endpoint;
pub use connect_endpoint::connect_bank_endpoint;
pub use core::{
    BankConnection, ConnectionId, ConnectionStatus, create_bank_connection_table,
    create_pending_connection, get_connection_by_external_id, get_connection_for_user,
    get_connections_for_user, mark_connection_synced, set_bank_details_if_missing,
    set_connection_status,
};
pub use sync_endpoint::{get_sync_logs_endpoint, sync_connection_endpoint};
