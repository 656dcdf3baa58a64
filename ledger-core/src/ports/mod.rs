//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod repository;
mod store;

pub use repository::AccountRepository;
pub use store::{LedgerStore, StoreTransaction};
