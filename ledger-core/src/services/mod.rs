//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod account;
pub mod migration;
mod repository;
pub mod transfer;

pub use account::{AccountService, AccountView};
pub use migration::{MigrationResult, MigrationService};
pub use repository::LedgerRepository;
pub use transfer::{TransferEngine, TransferPolicy};
