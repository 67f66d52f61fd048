mod core;

pub use core::{create_balance_history_table, insert_balance_if_absent};

#[cfg(test)]
pub use core::get_balance_history;
