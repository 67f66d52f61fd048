mod account_type;
mod core;

pub use account_type::{AccountType, map_account_type};
pub use core::{
    Account, AccountId, SyncedAccount, create_account_table, get_accounts_for_user, net_worth,
    upsert_synced_account,
};

#[cfg(test)]
pub use core::get_account_by_external_id;
