//! In-memory ledger store with optimistic concurrency control
//!
//! Every account carries a version that is bumped on each committed write.
//! A unit of work records the version of everything it read, buffers its
//! writes, and at commit re-validates its read set under the write lock. Any
//! account changed underneath it fails the commit with `Conflict`, which
//! gives serializable behaviour for the rows a transfer touches.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountId, Transaction, TransactionFilter, TransactionId, Transfer};
use crate::ports::{LedgerStore, StoreTransaction};

struct Versioned {
    account: Account,
    version: u64,
}

#[derive(Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Versioned>,
    transactions: Vec<Transaction>,
}

/// Process-local ledger store
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    next_transaction_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            next_transaction_id: AtomicU64::new(1),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| Error::StoreUnavailable(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| Error::StoreUnavailable(format!("Lock poisoned: {}", e)))
    }
}

impl LedgerStore for MemoryStore {
    fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.read()?.accounts.get(&id).map(|v| v.account.clone()))
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self
            .read()?
            .accounts
            .values()
            .map(|v| v.account.clone())
            .collect())
    }

    fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let state = self.read()?;
        let matching = state.transactions.iter().filter(|tx| filter.matches(tx));
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    fn run_in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T>,
    {
        let mut uow = MemoryUnitOfWork::new(self);
        let value = work(&mut uow)?;
        uow.commit()?;
        Ok(value)
    }
}

/// Buffered unit of work; dropped without commit means rolled back
struct MemoryUnitOfWork<'a> {
    store: &'a MemoryStore,
    /// Version observed per account, `None` when it did not exist
    read_set: HashMap<AccountId, Option<u64>>,
    /// Local view of every account read or written
    view: HashMap<AccountId, Account>,
    dirty: HashSet<AccountId>,
    inserted: HashSet<AccountId>,
    appended: Vec<Transaction>,
}

impl<'a> MemoryUnitOfWork<'a> {
    fn new(store: &'a MemoryStore) -> Self {
        Self {
            store,
            read_set: HashMap::new(),
            view: HashMap::new(),
            dirty: HashSet::new(),
            inserted: HashSet::new(),
            appended: Vec::new(),
        }
    }

    fn load(&mut self, id: AccountId) -> Result<Option<Account>> {
        if let Some(account) = self.view.get(&id) {
            return Ok(Some(account.clone()));
        }
        if self.read_set.contains_key(&id) {
            // Read before and absent
            return Ok(None);
        }
        let state = self.store.read()?;
        match state.accounts.get(&id) {
            Some(entry) => {
                self.read_set.insert(id, Some(entry.version));
                self.view.insert(id, entry.account.clone());
                Ok(Some(entry.account.clone()))
            }
            None => {
                self.read_set.insert(id, None);
                Ok(None)
            }
        }
    }

    fn commit(self) -> Result<()> {
        let mut state = self.store.write()?;

        for id in &self.inserted {
            if state.accounts.contains_key(id) {
                return Err(Error::duplicate_key(format!("account {} already exists", id)));
            }
        }
        for (id, seen) in &self.read_set {
            let current = state.accounts.get(id).map(|v| v.version);
            if current != *seen {
                return Err(Error::conflict(format!(
                    "account {} was modified by a concurrent transaction",
                    id
                )));
            }
        }

        for id in &self.dirty {
            let Some(account) = self.view.get(id) else {
                continue;
            };
            let version = state.accounts.get(id).map_or(0, |v| v.version) + 1;
            state.accounts.insert(
                *id,
                Versioned {
                    account: account.clone(),
                    version,
                },
            );
        }

        // An earlier id may commit after a later one; insert in id order
        for tx in self.appended {
            let position = state.transactions.partition_point(|t| t.id < tx.id);
            state.transactions.insert(position, tx);
        }
        Ok(())
    }
}

impl StoreTransaction for MemoryUnitOfWork<'_> {
    fn get_account(&mut self, id: AccountId) -> Result<Option<Account>> {
        self.load(id)
    }

    fn insert_account(&mut self, account: &Account) -> Result<()> {
        if self.load(account.id)?.is_some() {
            return Err(Error::duplicate_key(format!(
                "account {} already exists",
                account.id
            )));
        }
        self.view.insert(account.id, account.clone());
        self.dirty.insert(account.id);
        self.inserted.insert(account.id);
        Ok(())
    }

    fn update_balance(&mut self, id: AccountId, expected: Decimal, balance: Decimal) -> Result<()> {
        self.load(id)?;
        let account = self
            .view
            .get_mut(&id)
            .ok_or(Error::AccountNotFound(id))?;
        if account.balance != expected {
            return Err(Error::conflict(format!(
                "balance of account {} changed: expected {}, found {}",
                id, expected, account.balance
            )));
        }
        account.balance = balance;
        account.updated_at = Utc::now();
        self.dirty.insert(id);
        Ok(())
    }

    fn append_transaction(
        &mut self,
        transfer: &Transfer,
        created_at: DateTime<Utc>,
    ) -> Result<Transaction> {
        let id = self.store.next_transaction_id.fetch_add(1, Ordering::SeqCst);
        let tx = Transaction {
            id: TransactionId(id),
            source_account: transfer.source(),
            destination_account: transfer.destination(),
            amount: transfer.amount(),
            created_at,
        };
        self.appended.push(tx.clone());
        Ok(tx)
    }
}
