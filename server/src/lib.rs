pub extern crate actix_web;

pub mod clock;
pub mod config;
pub mod connection;
mod connection_tx_storage;
pub mod registry;
pub mod server;
pub mod session;
pub mod store;

pub use connection_tx_storage::ConnectionTx;
