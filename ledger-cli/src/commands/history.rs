//! History command - list recorded transfers

use anyhow::Result;
use comfy_table::Cell;

use ledger_core::{AccountId, TransactionFilter};

use super::get_context;
use crate::output;

pub fn run(account: Option<&str>, limit: Option<usize>, json: bool) -> Result<()> {
    let mut filter = match account {
        Some(id) => TransactionFilter::for_account(id.parse::<AccountId>()?),
        None => TransactionFilter::all(),
    };
    if let Some(limit) = limit {
        filter = filter.with_limit(limit);
    }

    let ctx = get_context()?;
    let transactions = ctx.account_service.history(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }

    if transactions.is_empty() {
        output::info("No transfers recorded");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["ID", "From", "To", "Amount", "Time"]);
    for tx in &transactions {
        table.add_row(vec![
            Cell::new(tx.id),
            Cell::new(tx.source_account),
            Cell::new(tx.destination_account),
            output::amount_cell(tx.amount),
            Cell::new(tx.created_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }

    println!("{}", table);
    println!("{} transfer(s)", transactions.len());
    Ok(())
}
