mod core;

pub use core::{
    DEFAULT_DESCRIPTION, SyncedTransaction, count_transactions_since, create_transaction_table,
    insert_transactions_if_absent,
};

#[cfg(test)]
pub use core::get_transactions_for_account;
