//! Account repository port - typed access to accounts and ledger entries

use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{Account, AccountId, CancellationToken, Transaction, TransactionFilter};

/// Typed read/write operations over accounts, including transfers
///
/// The service layer depends only on this trait, which keeps it testable
/// with a hand-written fake.
pub trait AccountRepository: Send + Sync {
    /// Insert a new account (`DuplicateKey`, `InvalidArgument`)
    fn create(&self, account: &Account) -> Result<()>;

    /// Fetch an account (`NotFound`)
    fn get_by_id(&self, id: AccountId) -> Result<Account>;

    /// Move `amount` between two accounts atomically
    fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
    ) -> Result<Transaction> {
        self.transfer_cancellable(source, destination, amount, &CancellationToken::new())
    }

    /// Same as `transfer`, abandoned before commit once `cancel` is set
    fn transfer_cancellable(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<Transaction>;

    /// All accounts ordered by id
    fn accounts(&self) -> Result<Vec<Account>>;

    /// Ledger entries matching `filter`, ordered by id
    fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;
}
