//! Migration service - manages database schema migrations
//!
//! Migrations are SQL files embedded at compile time. Each migration is
//! tracked in the sys_migrations table to ensure idempotent execution.
//! They are applied explicitly at deployment time (`ledger init`), never as a
//! side effect of opening the store.

use duckdb::Connection;
use serde::Serialize;

use crate::domain::result::Result;
use crate::migrations::{BOOTSTRAP, MIGRATIONS};

/// Result of running migrations
#[derive(Debug, Serialize)]
pub struct MigrationResult {
    /// Names of newly applied migrations
    pub applied: Vec<String>,
    /// Count of migrations that were already applied
    pub already_applied: usize,
}

/// Service for managing database migrations
pub struct MigrationService<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationService<'a> {
    /// Create a new migration service with a database connection
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Run all pending migrations
    ///
    /// Bootstraps `sys_migrations` if needed, then applies each pending
    /// migration in order and records it in the same DuckDB transaction.
    pub fn run_pending(&self) -> Result<MigrationResult> {
        let mut newly_applied = Vec::new();

        let bootstrap_ran = if !self.migrations_table_exists()? {
            if let Some((name, sql)) = MIGRATIONS.iter().find(|(n, _)| *n == BOOTSTRAP) {
                self.apply(name, sql)?;
                newly_applied.push(name.to_string());
                true
            } else {
                false
            }
        } else {
            false
        };

        let applied_set = self.get_applied()?;
        let already_applied = if bootstrap_ran {
            applied_set.len().saturating_sub(1)
        } else {
            applied_set.len()
        };

        for (name, sql) in MIGRATIONS.iter() {
            if *name == BOOTSTRAP {
                continue;
            }
            if !applied_set.iter().any(|applied| applied == name) {
                self.apply(name, sql)?;
                newly_applied.push(name.to_string());
            }
        }

        if !newly_applied.is_empty() {
            tracing::info!(applied = ?newly_applied, "applied schema migrations");
        }

        Ok(MigrationResult {
            applied: newly_applied,
            already_applied,
        })
    }

    /// Execute one migration and record it atomically
    fn apply(&self, name: &str, sql: &str) -> Result<()> {
        let batch = format!(
            "BEGIN TRANSACTION;\n{}\nINSERT INTO sys_migrations (migration_name) VALUES ('{}');\nCOMMIT;",
            sql, name
        );
        if let Err(e) = self.conn.execute_batch(&batch) {
            tracing::error!(migration = name, error = %e, "migration failed");
            // Leave the pooled connection usable
            if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(migration = name, error = %rollback, "rollback after failed migration failed");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Check if sys_migrations table exists
    fn migrations_table_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get list of already applied migration names
    pub fn get_applied(&self) -> Result<Vec<String>> {
        if !self.migrations_table_exists()? {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare("SELECT migration_name FROM sys_migrations ORDER BY migration_name")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut result = Vec::new();
        for name in names {
            result.push(name?);
        }
        Ok(result)
    }

    /// Get list of pending migration names
    pub fn get_pending(&self) -> Result<Vec<String>> {
        let applied = self.get_applied()?;
        Ok(MIGRATIONS
            .iter()
            .filter(|(name, _)| !applied.iter().any(|a| a == name))
            .map(|(name, _)| name.to_string())
            .collect())
    }
}
