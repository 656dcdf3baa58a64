//! DuckDB ledger store implementation
//!
//! The store keeps a small pool of connections cloned from one database
//! instance. Each unit of work runs inside a DuckDB transaction on one pooled
//! connection, so transfers on different connections really do run
//! concurrently; DuckDB's MVCC rejects the second of two conflicting writers,
//! and balance updates are additionally conditioned on the balance that was
//! read (compare-and-swap).

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountId, Transaction, TransactionFilter, TransactionId, Transfer};
use crate::ports::{LedgerStore, StoreTransaction};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of attempts when the database file is locked
const MAX_OPEN_ATTEMPTS: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Default number of pooled connections
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Check if an error message indicates a file locking issue that should be retried
fn is_lock_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("could not set lock on file")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB reports MVCC write-write collisions as "... conflict ..." errors
fn is_conflict_error(err_msg: &str) -> bool {
    err_msg.to_lowercase().contains("conflict")
}

fn is_duplicate_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("duplicate key")
        || lower.contains("violates primary key")
        || lower.contains("violates unique constraint")
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        if let duckdb::Error::QueryReturnedNoRows = err {
            return Error::not_found("query returned no rows");
        }
        let msg = err.to_string();
        // File lock messages mention "conflicting lock", check them first
        if is_lock_error(&msg) {
            Error::StoreUnavailable(msg)
        } else if is_duplicate_error(&msg) {
            Error::DuplicateKey(msg)
        } else if is_conflict_error(&msg) {
            Error::Conflict(msg)
        } else {
            Error::Database(msg)
        }
    }
}

/// DuckDB-backed ledger store
pub struct DuckDbStore {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl DuckDbStore {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff while another process holds the file
    /// lock, then gives up with `StoreUnavailable`.
    pub fn open(db_path: &Path, pool_size: usize) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(Some(db_path)) {
                Ok(conn) => return Self::with_pool(conn, pool_size, Some(db_path)),
                Err(e) => {
                    let err_msg = e.to_string();
                    attempt += 1;
                    if !is_lock_error(&err_msg) {
                        return Err(e.into());
                    }
                    if attempt >= MAX_OPEN_ATTEMPTS {
                        return Err(Error::StoreUnavailable(format!(
                            "failed to open {} after {} attempts: {}",
                            db_path.display(),
                            MAX_OPEN_ATTEMPTS,
                            err_msg
                        )));
                    }
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt - 1));
                    tracing::warn!(
                        attempt,
                        max_attempts = MAX_OPEN_ATTEMPTS,
                        delay_ms = delay.as_millis() as u64,
                        error = %err_msg,
                        "database busy, retrying"
                    );
                    thread::sleep(delay);
                }
            }
        }
    }

    /// Open a private in-memory database
    pub fn open_in_memory(pool_size: usize) -> Result<Self> {
        let conn = Self::try_open_connection(None)?;
        Self::with_pool(conn, pool_size, None)
    }

    fn try_open_connection(db_path: Option<&Path>) -> duckdb::Result<Connection> {
        // Extension autoloading stays off; the ledger needs none
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        match db_path {
            Some(path) => Connection::open_with_flags(path, config),
            None => Connection::open_in_memory_with_flags(config),
        }
    }

    fn with_pool(conn: Connection, pool_size: usize, db_path: Option<&Path>) -> Result<Self> {
        let pool_size = pool_size.max(1);
        let mut connections = Vec::with_capacity(pool_size);
        for _ in 1..pool_size {
            connections.push(Mutex::new(conn.try_clone()?));
        }
        connections.push(Mutex::new(conn));

        tracing::debug!(pool_size, path = ?db_path, "opened ledger store");
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.connections.len()
    }

    /// Borrow a pooled connection, preferring an idle one
    fn checkout(&self) -> Result<MutexGuard<'_, Connection>> {
        let len = self.connections.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0..len {
            match self.connections[(start + offset) % len].try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(e)) => {
                    return Err(Error::StoreUnavailable(format!("Lock poisoned: {}", e)))
                }
            }
        }
        self.connections[start]
            .lock()
            .map_err(|e| Error::StoreUnavailable(format!("Lock poisoned: {}", e)))
    }

    /// Apply pending schema migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.checkout()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Names of migrations not yet applied
    pub fn pending_migrations(&self) -> Result<Vec<String>> {
        let conn = self.checkout()?;
        MigrationService::new(&conn).get_pending()
    }

    /// Fail unless every migration has been applied
    pub fn ensure_schema_current(&self) -> Result<()> {
        let pending = self.pending_migrations()?;
        if pending.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "database schema is out of date ({} pending migrations); run `ledger init`",
                pending.len()
            )))
        }
    }
}

impl LedgerStore for DuckDbStore {
    fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let conn = self.checkout()?;
        select_account(&conn, id)
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT account_id, CAST(balance AS VARCHAR), created_at, updated_at
             FROM ledger_accounts ORDER BY account_id",
        )?;
        let rows = stmt.query_map([], read_account_row)?;

        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row_to_account(row?)?);
        }
        Ok(accounts)
    }

    fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let conn = self.checkout()?;
        let mut sql = String::from(
            "SELECT transaction_id, source_account, destination_account,
                    CAST(amount AS VARCHAR), created_at
             FROM ledger_transactions",
        );
        if filter.account.is_some() {
            sql.push_str(" WHERE source_account = ? OR destination_account = ?");
        }
        sql.push_str(" ORDER BY transaction_id");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = match filter.account {
            Some(id) => stmt.query_map(params![id.0, id.0], read_transaction_row)?,
            None => stmt.query_map([], read_transaction_row)?,
        };

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row_to_transaction(row?)?);
        }
        Ok(transactions)
    }

    fn run_in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T>,
    {
        let mut conn = self.checkout()?;
        let tx = conn.transaction()?;
        let value = {
            let mut uow = DuckDbUnitOfWork { conn: &*tx };
            // Returning early drops `tx`, which rolls back
            work(&mut uow)?
        };
        tx.commit()?;
        Ok(value)
    }
}

/// Unit of work bound to one open DuckDB transaction
struct DuckDbUnitOfWork<'a> {
    conn: &'a Connection,
}

impl StoreTransaction for DuckDbUnitOfWork<'_> {
    fn get_account(&mut self, id: AccountId) -> Result<Option<Account>> {
        select_account(self.conn, id)
    }

    fn insert_account(&mut self, account: &Account) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO ledger_accounts (account_id, balance, created_at, updated_at)
                 VALUES (?, CAST(? AS DECIMAL(38, 10)), ?, ?)",
                params![
                    account.id.0,
                    account.balance.to_string(),
                    account.created_at.to_rfc3339(),
                    account.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| match Error::from(e) {
                Error::DuplicateKey(_) => {
                    Error::duplicate_key(format!("account {} already exists", account.id))
                }
                other => other,
            })?;
        Ok(())
    }

    fn update_balance(&mut self, id: AccountId, expected: Decimal, balance: Decimal) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE ledger_accounts
             SET balance = CAST(? AS DECIMAL(38, 10)), updated_at = ?
             WHERE account_id = ? AND balance = CAST(? AS DECIMAL(38, 10))",
            params![
                balance.to_string(),
                Utc::now().to_rfc3339(),
                id.0,
                expected.to_string(),
            ],
        )?;
        if updated != 1 {
            return Err(Error::conflict(format!(
                "balance of account {} no longer equals {}",
                id, expected
            )));
        }
        Ok(())
    }

    fn append_transaction(
        &mut self,
        transfer: &Transfer,
        created_at: DateTime<Utc>,
    ) -> Result<Transaction> {
        let id: u64 = self.conn.query_row(
            "INSERT INTO ledger_transactions (source_account, destination_account, amount, created_at)
             VALUES (?, ?, CAST(? AS DECIMAL(38, 10)), ?)
             RETURNING transaction_id",
            params![
                transfer.source().0,
                transfer.destination().0,
                transfer.amount().to_string(),
                created_at.to_rfc3339(),
            ],
            |row| row.get(0),
        )?;

        Ok(Transaction {
            id: TransactionId(id),
            source_account: transfer.source(),
            destination_account: transfer.destination(),
            amount: transfer.amount(),
            created_at,
        })
    }
}

type AccountRow = (u64, String, String, String);
type TransactionRow = (u64, u64, u64, String, String);

fn select_account(conn: &Connection, id: AccountId) -> Result<Option<Account>> {
    let row = conn.query_row(
        "SELECT account_id, CAST(balance AS VARCHAR), created_at, updated_at
         FROM ledger_accounts WHERE account_id = ?",
        params![id.0],
        read_account_row,
    );
    match row {
        Ok(row) => Ok(Some(row_to_account(row)?)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_account_row(row: &duckdb::Row) -> duckdb::Result<AccountRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn read_transaction_row(row: &duckdb::Row) -> duckdb::Result<TransactionRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn row_to_account((id, balance, created_at, updated_at): AccountRow) -> Result<Account> {
    Ok(Account {
        id: AccountId(id),
        balance: parse_decimal(&balance)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_transaction(
    (id, source, destination, amount, created_at): TransactionRow,
) -> Result<Transaction> {
    Ok(Transaction {
        id: TransactionId(id),
        source_account: AccountId(source),
        destination_account: AccountId(destination),
        amount: parse_decimal(&amount)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Parse a DECIMAL rendered as VARCHAR, dropping the column's padding zeros
fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s.trim())
        .map(|d| d.normalize())
        .map_err(|e| Error::database(format!("invalid decimal {:?} in store: {}", s, e)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("invalid timestamp {:?} in store: {}", s, e)))
}
