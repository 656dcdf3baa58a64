//! Account commands - open, show and list accounts

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::Cell;
use serde::Serialize;

use ledger_core::{AccountId, AccountView};
use rust_decimal::Decimal;

use super::{get_context, parse_amount};
use crate::output;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Create {
        /// Account ID (positive integer)
        id: String,
        /// Opening balance
        balance: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show an account's balance
    Show {
        /// Account ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl AccountCommands {
    pub fn json(&self) -> bool {
        match self {
            AccountCommands::Create { json, .. }
            | AccountCommands::Show { json, .. }
            | AccountCommands::List { json } => *json,
        }
    }
}

#[derive(Serialize)]
struct AccountList {
    accounts: Vec<AccountView>,
    total: Decimal,
}

pub fn run(command: AccountCommands) -> Result<()> {
    match command {
        AccountCommands::Create { id, balance, json } => run_create(&id, &balance, json),
        AccountCommands::Show { id, json } => run_show(&id, json),
        AccountCommands::List { json } => run_list(json),
    }
}

fn run_create(id: &str, balance: &str, json: bool) -> Result<()> {
    let id: AccountId = id.parse()?;
    let balance = parse_amount(balance)?;

    let ctx = get_context()?;
    ctx.account_service.create_account(id, balance)?;
    let view = ctx.account_service.get_account(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        output::success(&format!("Account {} created", view.id));
        println!("  Balance: {}", output::format_amount(view.balance));
    }
    Ok(())
}

fn run_show(id: &str, json: bool) -> Result<()> {
    let id: AccountId = id.parse()?;

    let ctx = get_context()?;
    let view = ctx.account_service.get_account(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{} {}", "Account".bold(), view.id);
        println!("  Balance: {}", output::format_amount(view.balance));
    }
    Ok(())
}

fn run_list(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let accounts = ctx.account_service.list_accounts()?;
    let total = ctx.account_service.total_balance()?;

    if json {
        let list = AccountList { accounts, total };
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    if accounts.is_empty() {
        output::info("No accounts yet. Create one with `ledger account create <ID> <BALANCE>`");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Account", "Balance"]);
    for view in &accounts {
        table.add_row(vec![Cell::new(view.id), output::amount_cell(view.balance)]);
    }
    table.add_row(vec![Cell::new("Total".bold()), output::amount_cell(total)]);

    println!("{}", table);
    Ok(())
}
