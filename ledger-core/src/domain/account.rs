//! Account domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money;
use super::result::{Error, Result};

/// Caller assigned account identifier, always positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl AccountId {
    /// Build an id, rejecting zero
    pub fn new(id: u64) -> Result<Self> {
        if id == 0 {
            return Err(Error::invalid_argument("account id must be a positive integer"));
        }
        Ok(Self(id))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = s
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::invalid_argument(format!("invalid account id: {:?}", s)))?;
        Self::new(id)
    }
}

/// An account holding a non-negative balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with its opening balance
    pub fn new(id: AccountId, balance: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id,
            balance: balance.normalize(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate account data before it is persisted
    pub fn validate(&self) -> Result<()> {
        if self.id.0 == 0 {
            return Err(Error::invalid_argument("account id must be a positive integer"));
        }
        money::validate_balance(self.balance)
    }
}
