//! Transfer engine - atomic fund movement between two accounts
//!
//! One transfer is one unit of work against the store:
//!
//! 1. validate the request (no store access on failure)
//! 2. re-read source and destination inside the unit of work
//! 3. check funds against the balance read in step 2
//! 4. compare-and-swap both balances and append the ledger entry
//! 5. commit
//!
//! The engine keeps no balances between calls. A `Conflict` from the store
//! re-runs the whole unit of work from step 2, up to `max_attempts` times.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::money;
use crate::domain::result::{Error, Result};
use crate::domain::{AccountId, CancellationToken, Transaction, Transfer};
use crate::ports::{LedgerStore, StoreTransaction};

/// Default number of attempts for a transfer that keeps hitting conflicts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default bound on a single transfer, retries included
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry and timeout settings for transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    /// Abort before commit once this much time has passed; `None` disables
    pub timeout: Option<Duration>,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

/// Executes transfers as atomic units of work
pub struct TransferEngine<S> {
    store: Arc<S>,
    policy: TransferPolicy,
}

impl<S: LedgerStore> TransferEngine<S> {
    pub fn new(store: Arc<S>, policy: TransferPolicy) -> Self {
        Self { store, policy }
    }

    /// Move `amount` from `source` to `destination`
    ///
    /// Returns the committed ledger entry. Nothing is written unless both
    /// balances and the entry commit together.
    pub fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        let transfer = Transfer::new(source, destination, amount)?;
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.checkpoint(started, cancel)?;

            match self.store.run_in_transaction(|tx| self.apply(tx, &transfer, started, cancel)) {
                Ok(record) => {
                    tracing::info!(
                        transaction_id = record.id.0,
                        source = source.0,
                        destination = destination.0,
                        amount = %record.amount,
                        attempt,
                        "transfer committed"
                    );
                    return Ok(record);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        source = source.0,
                        destination = destination.0,
                        attempt,
                        max_attempts,
                        error = %e,
                        "transfer conflicted, retrying"
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        source = source.0,
                        destination = destination.0,
                        attempt,
                        kind = e.kind(),
                        "transfer rejected"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Body of one unit of work
    fn apply(
        &self,
        tx: &mut dyn StoreTransaction,
        transfer: &Transfer,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        let amount = transfer.amount();
        let source = tx
            .get_account(transfer.source())?
            .ok_or(Error::AccountNotFound(transfer.source()))?;
        let destination = tx
            .get_account(transfer.destination())?
            .ok_or(Error::AccountNotFound(transfer.destination()))?;

        if source.balance < amount {
            return Err(Error::InsufficientFunds {
                account: source.id,
                balance: source.balance,
                requested: amount,
            });
        }

        let source_balance = money::checked_debit(source.balance, amount)?;
        let destination_balance = money::checked_credit(destination.balance, amount)?;

        // Lower account id first, for stores that lock rows on write
        let mut writes = [
            (source.id, source.balance, source_balance),
            (destination.id, destination.balance, destination_balance),
        ];
        writes.sort_by_key(|(id, _, _)| *id);
        for (id, expected, balance) in writes {
            tx.update_balance(id, expected, balance)?;
        }

        let record = tx.append_transaction(transfer, Utc::now())?;

        // Last chance to back out; after commit cancellation no longer applies
        self.checkpoint(started, cancel)?;
        Ok(record)
    }

    fn checkpoint(&self, started: Instant, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(timeout) = self.policy.timeout {
            if started.elapsed() >= timeout {
                return Err(Error::Timeout(timeout.as_millis()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use rust_decimal_macros::dec;

    use crate::adapters::memory::MemoryStore;
    use crate::domain::{Account, TransactionFilter};

    fn seeded_store(balances: &[(u64, Decimal)]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .run_in_transaction(|tx| {
                for (id, balance) in balances {
                    tx.insert_account(&Account::new(AccountId(*id), *balance))?;
                }
                Ok(())
            })
            .unwrap();
        store
    }

    fn balance<S: LedgerStore>(store: &S, id: u64) -> Decimal {
        store.get_account(AccountId(id)).unwrap().unwrap().balance
    }

    /// Store whose first `failures` units of work lose a write-write race
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicU32,
        attempts: AtomicU32,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore, failures: u32) -> Self {
            Self {
                inner,
                failures: AtomicU32::new(failures),
                attempts: AtomicU32::new(0),
            }
        }
    }

    impl LedgerStore for FlakyStore {
        fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
            self.inner.get_account(id)
        }

        fn list_accounts(&self) -> Result<Vec<Account>> {
            self.inner.list_accounts()
        }

        fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
            self.inner.list_transactions(filter)
        }

        fn run_in_transaction<T, F>(&self, work: F) -> Result<T>
        where
            F: FnOnce(&mut dyn StoreTransaction) -> Result<T>,
        {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::conflict("simulated write-write conflict"));
            }
            self.inner.run_in_transaction(work)
        }
    }

    /// Store that flips a cancellation token while the unit of work is open
    struct CancellingStore {
        inner: MemoryStore,
        token: CancellationToken,
    }

    impl LedgerStore for CancellingStore {
        fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
            self.inner.get_account(id)
        }

        fn list_accounts(&self) -> Result<Vec<Account>> {
            self.inner.list_accounts()
        }

        fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
            self.inner.list_transactions(filter)
        }

        fn run_in_transaction<T, F>(&self, work: F) -> Result<T>
        where
            F: FnOnce(&mut dyn StoreTransaction) -> Result<T>,
        {
            self.token.cancel();
            self.inner.run_in_transaction(work)
        }
    }

    /// Store that stalls before opening each unit of work
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl LedgerStore for SlowStore {
        fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
            self.inner.get_account(id)
        }

        fn list_accounts(&self) -> Result<Vec<Account>> {
            self.inner.list_accounts()
        }

        fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
            self.inner.list_transactions(filter)
        }

        fn run_in_transaction<T, F>(&self, work: F) -> Result<T>
        where
            F: FnOnce(&mut dyn StoreTransaction) -> Result<T>,
        {
            std::thread::sleep(self.delay);
            self.inner.run_in_transaction(work)
        }
    }

    #[test]
    fn test_transfer_moves_funds_and_records_entry() {
        let store = seeded_store(&[(1, dec!(100.0)), (2, dec!(0.0))]);
        let engine = TransferEngine::new(Arc::clone(&store), TransferPolicy::default());

        let record = engine
            .transfer(AccountId(1), AccountId(2), dec!(100.0), &CancellationToken::new())
            .unwrap();

        assert_eq!(balance(&*store, 1), dec!(0));
        assert_eq!(balance(&*store, 2), dec!(100));
        assert_eq!(record.source_account, AccountId(1));
        assert_eq!(record.destination_account, AccountId(2));
        assert_eq!(record.amount, dec!(100));

        let entries = store.list_transactions(&TransactionFilter::all()).unwrap();
        assert_eq!(entries, vec![record]);
    }

    #[test]
    fn test_insufficient_funds_changes_nothing() {
        let store = seeded_store(&[(1, dec!(10)), (2, dec!(5))]);
        let engine = TransferEngine::new(Arc::clone(&store), TransferPolicy::default());

        let err = engine
            .transfer(AccountId(1), AccountId(2), dec!(10.01), &CancellationToken::new())
            .unwrap_err();

        assert!(matches!(err, Error::InsufficientFunds { account: AccountId(1), .. }));
        assert_eq!(balance(&*store, 1), dec!(10));
        assert_eq!(balance(&*store, 2), dec!(5));
        assert!(store.list_transactions(&TransactionFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_destination_is_account_not_found() {
        let store = seeded_store(&[(1, dec!(10))]);
        let engine = TransferEngine::new(Arc::clone(&store), TransferPolicy::default());

        let err = engine
            .transfer(AccountId(1), AccountId(2), dec!(1), &CancellationToken::new())
            .unwrap_err();

        assert!(matches!(err, Error::AccountNotFound(AccountId(2))));
        assert_eq!(balance(&*store, 1), dec!(10));
    }

    #[test]
    fn test_invalid_request_never_touches_store() {
        let store = Arc::new(FlakyStore::new(MemoryStore::new(), 0));
        let engine = TransferEngine::new(Arc::clone(&store), TransferPolicy::default());
        let token = CancellationToken::new();

        assert!(matches!(
            engine.transfer(AccountId(1), AccountId(1), dec!(5), &token),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.transfer(AccountId(1), AccountId(2), dec!(0), &token),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_conflict_is_retried_until_success() {
        let inner = MemoryStore::new();
        inner
            .run_in_transaction(|tx| {
                tx.insert_account(&Account::new(AccountId(1), dec!(10)))?;
                tx.insert_account(&Account::new(AccountId(2), dec!(0)))
            })
            .unwrap();
        let store = Arc::new(FlakyStore::new(inner, 2));
        let engine = TransferEngine::new(Arc::clone(&store), TransferPolicy::default());

        engine
            .transfer(AccountId(1), AccountId(2), dec!(4), &CancellationToken::new())
            .unwrap();

        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(balance(&*store, 1), dec!(6));
        assert_eq!(balance(&*store, 2), dec!(4));
    }

    #[test]
    fn test_retries_are_bounded() {
        let store = Arc::new(FlakyStore::new(MemoryStore::new(), u32::MAX));
        let policy = TransferPolicy {
            max_attempts: 3,
            timeout: None,
        };
        let engine = TransferEngine::new(Arc::clone(&store), policy);

        let err = engine
            .transfer(AccountId(1), AccountId(2), dec!(1), &CancellationToken::new())
            .unwrap_err();

        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancellation_before_commit_rolls_back() {
        let inner = MemoryStore::new();
        inner
            .run_in_transaction(|tx| {
                tx.insert_account(&Account::new(AccountId(1), dec!(10)))?;
                tx.insert_account(&Account::new(AccountId(2), dec!(0)))
            })
            .unwrap();
        let token = CancellationToken::new();
        let store = Arc::new(CancellingStore {
            inner,
            token: token.clone(),
        });
        let engine = TransferEngine::new(Arc::clone(&store), TransferPolicy::default());

        let err = engine
            .transfer(AccountId(1), AccountId(2), dec!(4), &token)
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(balance(&*store, 1), dec!(10));
        assert_eq!(balance(&*store, 2), dec!(0));
        assert!(store.list_transactions(&TransactionFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn test_expired_timeout_aborts() {
        let store = seeded_store(&[(1, dec!(10)), (2, dec!(0))]);
        let policy = TransferPolicy {
            max_attempts: 1,
            timeout: Some(Duration::ZERO),
        };
        let engine = TransferEngine::new(Arc::clone(&store), policy);

        let err = engine
            .transfer(AccountId(1), AccountId(2), dec!(1), &CancellationToken::new())
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(0)));
        assert_eq!(balance(&*store, 1), dec!(10));
    }

    #[test]
    fn test_timeout_during_unit_of_work_rolls_back() {
        let inner = MemoryStore::new();
        inner
            .run_in_transaction(|tx| {
                tx.insert_account(&Account::new(AccountId(1), dec!(10)))?;
                tx.insert_account(&Account::new(AccountId(2), dec!(0)))
            })
            .unwrap();
        let store = Arc::new(SlowStore {
            inner,
            delay: Duration::from_millis(50),
        });
        let policy = TransferPolicy {
            max_attempts: 1,
            timeout: Some(Duration::from_millis(10)),
        };
        let engine = TransferEngine::new(Arc::clone(&store), policy);

        // The check before the attempt passes; the one before commit does not
        let err = engine
            .transfer(AccountId(1), AccountId(2), dec!(4), &CancellationToken::new())
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(10)));
        assert_eq!(balance(&*store, 1), dec!(10));
        assert_eq!(balance(&*store, 2), dec!(0));
        assert!(store.list_transactions(&TransactionFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_parent_stops_child_before_store() {
        let store = Arc::new(FlakyStore::new(MemoryStore::new(), 0));
        let engine = TransferEngine::new(Arc::clone(&store), TransferPolicy::default());
        let parent = CancellationToken::new();
        let child = parent.child_token();

        parent.cancel();
        let err = engine
            .transfer(AccountId(1), AccountId(2), dec!(1), &child)
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_overflowing_credit_is_rejected() {
        let near_max = money::max_magnitude() - dec!(1);
        let store = seeded_store(&[(1, dec!(5)), (2, near_max)]);
        let engine = TransferEngine::new(Arc::clone(&store), TransferPolicy::default());

        let err = engine
            .transfer(AccountId(1), AccountId(2), dec!(5), &CancellationToken::new())
            .unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(balance(&*store, 1), dec!(5));
        assert_eq!(balance(&*store, 2), near_max);
    }
}
