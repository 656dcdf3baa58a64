//! Core domain entities
//!
//! Pure data structures with validation logic - no I/O or external dependencies.

mod account;
pub mod money;
pub mod result;
mod transaction;

pub use account::{Account, AccountId};
pub use transaction::{Transaction, TransactionFilter, TransactionId, Transfer};

/// Cooperative cancellation for in-flight transfers
pub use tokio_util::sync::CancellationToken;
