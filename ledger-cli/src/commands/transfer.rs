//! Transfer command - move funds between accounts

use anyhow::Result;

use ledger_core::AccountId;

use super::{get_context, parse_amount};
use crate::output;

pub fn run(from: &str, to: &str, amount: &str, json: bool) -> Result<()> {
    let source: AccountId = from.parse()?;
    let destination: AccountId = to.parse()?;
    let amount = parse_amount(amount)?;

    let ctx = get_context()?;
    let record = ctx.account_service.transfer(source, destination, amount)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let source_view = ctx.account_service.get_account(source)?;
    let destination_view = ctx.account_service.get_account(destination)?;

    output::success(&format!(
        "Transferred {} from {} to {}",
        output::format_amount(record.amount),
        source,
        destination
    ));
    println!("  Transaction: {}", record.id);
    println!("  {}: {}", source, output::format_amount(source_view.balance));
    println!("  {}: {}", destination, output::format_amount(destination_view.balance));
    Ok(())
}
