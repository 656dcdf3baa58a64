//! Account service - create, read and transfer entry points

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountId, CancellationToken, Transaction, TransactionFilter};
use crate::ports::AccountRepository;

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountView {
    pub id: AccountId,
    pub balance: Decimal,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            balance: account.balance,
        }
    }
}

/// Thin facade over an `AccountRepository`
pub struct AccountService<R> {
    repository: Arc<R>,
}

impl<R: AccountRepository> AccountService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Open an account with a non-negative starting balance
    pub fn create_account(&self, id: AccountId, initial_balance: Decimal) -> Result<()> {
        let account = Account::new(AccountId::new(id.0)?, initial_balance);
        self.repository.create(&account)?;
        tracing::info!(account = id.0, balance = %account.balance, "account opened");
        Ok(())
    }

    /// Current balance of an account
    pub fn get_account(&self, id: AccountId) -> Result<AccountView> {
        match self.repository.get_by_id(id) {
            Ok(account) => Ok(account.into()),
            Err(Error::NotFound(_)) => Err(Error::AccountNotFound(id)),
            Err(e) => Err(e),
        }
    }

    pub fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
    ) -> Result<Transaction> {
        self.repository.transfer(source, destination, amount)
    }

    pub fn transfer_cancellable(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        self.repository
            .transfer_cancellable(source, destination, amount, cancel)
    }

    pub fn list_accounts(&self) -> Result<Vec<AccountView>> {
        Ok(self
            .repository
            .accounts()?
            .into_iter()
            .map(AccountView::from)
            .collect())
    }

    pub fn history(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        self.repository.transactions(filter)
    }

    /// Sum of all balances
    pub fn total_balance(&self) -> Result<Decimal> {
        self.repository
            .accounts()?
            .iter()
            .try_fold(Decimal::ZERO, |total, account| {
                total
                    .checked_add(account.balance)
                    .ok_or_else(|| Error::invalid_argument("total balance overflows"))
            })
    }
}
