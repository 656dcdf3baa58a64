//! CLI command implementations

pub mod account;
pub mod history;
pub mod init;
pub mod transfer;

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use ledger_core::LedgerContext;
use rust_decimal::Decimal;

/// Get the ledger directory from environment or default
pub fn get_ledger_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("LEDGER_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory; set LEDGER_DIR")?;
    Ok(home.join(".ledger"))
}

/// Open the ledger context
pub fn get_context() -> Result<LedgerContext> {
    let ledger_dir = get_ledger_dir()?;
    tracing::debug!(path = %ledger_dir.display(), "opening ledger");
    LedgerContext::open(&ledger_dir).context("Failed to open ledger")
}

/// Parse a decimal amount given on the command line
pub fn parse_amount(value: &str) -> Result<Decimal> {
    let trimmed = value.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| anyhow!("Invalid amount: {:?}", value))
}
