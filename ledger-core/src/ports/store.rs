//! Ledger store port - durable storage with transactional units of work

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{Account, AccountId, Transaction, TransactionFilter, Transfer};

/// Operations available inside one unit of work
///
/// Everything done through a `StoreTransaction` commits together or not at all.
/// Reads observe the unit of work's own writes.
pub trait StoreTransaction {
    /// Read an account as of this unit of work
    fn get_account(&mut self, id: AccountId) -> Result<Option<Account>>;

    /// Insert a new account; `DuplicateKey` if the id is taken
    fn insert_account(&mut self, account: &Account) -> Result<()>;

    /// Compare-and-swap a balance
    ///
    /// Fails with `Conflict` unless the stored balance still equals `expected`.
    fn update_balance(&mut self, id: AccountId, expected: Decimal, balance: Decimal) -> Result<()>;

    /// Append the ledger entry for `transfer`, assigning its id
    ///
    /// Ids are unique and increase in allocation order, which can differ from
    /// commit order when units of work overlap. A rolled back unit of work
    /// leaves a gap. Listings are always sorted by id.
    fn append_transaction(
        &mut self,
        transfer: &Transfer,
        created_at: DateTime<Utc>,
    ) -> Result<Transaction>;
}

/// Durable keyed storage for accounts and ledger entries
///
/// Implementations must isolate concurrent units of work well enough that two
/// of them cannot both commit a write derived from the same stale balance: the
/// loser reports `Conflict`.
pub trait LedgerStore: Send + Sync {
    /// Committed state of one account
    fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// All accounts ordered by id
    fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Ledger entries ordered by id
    fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;

    /// Execute `work` as one unit of work
    ///
    /// Commits when `work` returns `Ok`, rolls back when it returns `Err`.
    /// A commit rejected by concurrency control surfaces as `Conflict`.
    fn run_in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T>;
}
