//! Ledger Core - accounts, balances and atomic transfers
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Account, Transaction, money rules)
//! - **ports**: Trait definitions for external dependencies (LedgerStore, AccountRepository)
//! - **services**: Business logic orchestration (transfer engine, account service)
//! - **adapters**: Concrete implementations (DuckDB, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbStore;
use config::Config;
use services::{AccountService, LedgerRepository, MigrationResult};

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{Account, AccountId, CancellationToken, Transaction, TransactionFilter, TransactionId};
pub use services::{AccountView, TransferPolicy};

/// Account service wired to the DuckDB store
pub type LedgerAccountService = AccountService<LedgerRepository<DuckDbStore>>;

/// Main context for ledger operations
///
/// This is the primary entry point for all business logic. It holds
/// the store, configuration, and services.
pub struct LedgerContext {
    pub config: Config,
    pub store: Arc<DuckDbStore>,
    pub account_service: LedgerAccountService,
}

impl LedgerContext {
    /// Open an existing ledger
    ///
    /// Fails if the schema has pending migrations; run [`LedgerContext::init`] first.
    pub fn open(ledger_dir: &Path) -> Result<Self> {
        let config = Config::load(ledger_dir)?;
        let store = Self::open_store(ledger_dir, &config)?;
        store.ensure_schema_current()?;
        Ok(Self::with_store(config, store))
    }

    /// Create the ledger directory if needed and apply pending migrations
    ///
    /// A ledger without `ledger.json` gets one holding the defaults. An
    /// existing settings file is left untouched.
    pub fn init(ledger_dir: &Path) -> Result<(Self, MigrationResult)> {
        std::fs::create_dir_all(ledger_dir)
            .with_context(|| format!("Failed to create {}", ledger_dir.display()))?;
        if !ledger_dir.join(config::SETTINGS_FILE).exists() {
            Config::default().save(ledger_dir)?;
        }
        let config = Config::load(ledger_dir)?;
        let store = Self::open_store(ledger_dir, &config)?;
        let migrations = store.run_migrations().context("Failed to migrate database")?;
        Ok((Self::with_store(config, store), migrations))
    }

    /// Build a context around an already opened store
    pub fn with_store(config: Config, store: Arc<DuckDbStore>) -> Self {
        let repository = Arc::new(LedgerRepository::new(
            Arc::clone(&store),
            config.transfer_policy(),
        ));
        let account_service = AccountService::new(repository);
        Self {
            config,
            store,
            account_service,
        }
    }

    fn open_store(ledger_dir: &Path, config: &Config) -> Result<Arc<DuckDbStore>> {
        let db_path = config.db_path(ledger_dir);
        let store = DuckDbStore::open(&db_path, config.pool_size)
            .with_context(|| format!("Failed to open {}", db_path.display()))?;
        Ok(Arc::new(store))
    }
}
