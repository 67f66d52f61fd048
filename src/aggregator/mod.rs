//! Access to the third-party bank aggregator.

mod client;
mod gateway;
mod models;

pub use client::AggregatorClient;
pub use gateway::{AggregatorGateway, GatewayError};
pub use models::{
    AccountListing, AggregatorCredentials, AggregatorUser, MalformedAccount, RemoteAccount,
    RemoteBank, RemoteConnection, RemoteTransaction, TransactionQuery,
};
