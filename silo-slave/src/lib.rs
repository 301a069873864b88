//! Silo Storage Slave Library
//!
//! This library exposes the slave's internal modules for integration testing.

pub mod args;
pub mod config;
pub mod connection;
pub mod constants;
pub mod files;
pub mod handlers;
pub mod outbox;
pub mod port_range;
pub mod remerge;
pub mod roots;
pub mod slave;
pub mod tls;
pub mod transfers;
