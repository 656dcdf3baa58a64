//! Init command - create the ledger and bring its schema up to date

use anyhow::Result;

use ledger_core::LedgerContext;

use super::get_ledger_dir;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ledger_dir = get_ledger_dir()?;
    let (ctx, migrations) = LedgerContext::init(&ledger_dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&migrations)?);
        return Ok(());
    }

    let db_path = ctx.config.db_path(&ledger_dir);
    if migrations.applied.is_empty() {
        output::info(&format!("Ledger at {} is up to date", db_path.display()));
    } else {
        output::success(&format!("Initialized ledger at {}", db_path.display()));
        for name in &migrations.applied {
            println!("  applied {}", name);
        }
    }
    Ok(())
}
