//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for durable storage of the LedgerStore port
//! - An in-process store for tests and embedding

pub mod duckdb;
pub mod memory;
