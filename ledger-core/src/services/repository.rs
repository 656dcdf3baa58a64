//! Store-backed account repository

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountId, CancellationToken, Transaction, TransactionFilter};
use crate::ports::{AccountRepository, LedgerStore};
use crate::services::transfer::{TransferEngine, TransferPolicy};

/// `AccountRepository` over any `LedgerStore`
pub struct LedgerRepository<S> {
    store: Arc<S>,
    engine: TransferEngine<S>,
}

impl<S: LedgerStore> LedgerRepository<S> {
    pub fn new(store: Arc<S>, policy: TransferPolicy) -> Self {
        let engine = TransferEngine::new(Arc::clone(&store), policy);
        Self { store, engine }
    }
}

impl<S: LedgerStore> AccountRepository for LedgerRepository<S> {
    fn create(&self, account: &Account) -> Result<()> {
        account.validate()?;
        self.store.run_in_transaction(|tx| tx.insert_account(account))?;
        tracing::debug!(account = account.id.0, balance = %account.balance, "account created");
        Ok(())
    }

    fn get_by_id(&self, id: AccountId) -> Result<Account> {
        self.store
            .get_account(id)?
            .ok_or_else(|| Error::not_found(format!("account {}", id)))
    }

    fn transfer_cancellable(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        self.engine.transfer(source, destination, amount, cancel)
    }

    fn accounts(&self) -> Result<Vec<Account>> {
        self.store.list_accounts()
    }

    fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        self.store.list_transactions(filter)
    }
}
