//! Backend connection pool (spec.md §4.2).

mod client_pool;

pub use client_pool::{BackendConnection, ConnectionPool, PoolStats};
