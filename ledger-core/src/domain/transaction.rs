//! Transaction (ledger entry) domain model

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money;
use super::result::{Error, Result};
use super::AccountId;

/// Store assigned, monotonically increasing ledger entry id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable record of one committed transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub source_account: AccountId,
    pub destination_account: AccountId,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A validated request to move `amount` from `source` to `destination`
///
/// Construction enforces source != destination and a positive,
/// representable amount, so a `Transfer` never reaches the store otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transfer {
    source: AccountId,
    destination: AccountId,
    amount: Decimal,
}

impl Transfer {
    pub fn new(source: AccountId, destination: AccountId, amount: Decimal) -> Result<Self> {
        if source == destination {
            return Err(Error::invalid_argument(format!(
                "source and destination must differ (both {})",
                source
            )));
        }
        money::validate_amount(amount)?;
        Ok(Self {
            source,
            destination,
            amount: amount.normalize(),
        })
    }

    pub fn source(&self) -> AccountId {
        self.source
    }

    pub fn destination(&self) -> AccountId {
        self.destination
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

/// Selection of ledger entries for history queries
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Only entries where this account is source or destination
    pub account: Option<AccountId>,
    /// Return at most this many entries (oldest first)
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_account(account: AccountId) -> Self {
        Self {
            account: Some(account),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        match self.account {
            Some(id) => tx.source_account == id || tx.destination_account == id,
            None => true,
        }
    }
}
