//! Ledger CLI - accounts and transfers in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ledger_core::config::Config;
use ledger_core::{Error, OperationResult};

mod commands;
mod logging;
mod output;

use commands::{account, history, init, transfer};

/// Ledger - account balances with atomic transfers
#[derive(Parser)]
#[command(name = "ledger", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger directory and apply database migrations
    Init {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage accounts
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Move funds between two accounts
    Transfer {
        /// Source account ID
        from: String,
        /// Destination account ID
        to: String,
        /// Amount to move
        amount: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recorded transfers
    History {
        /// Only transfers touching this account
        #[arg(long)]
        account: Option<String>,
        /// Maximum number of entries
        #[arg(long, short)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Commands::Init { json } => *json,
            Commands::Account { command } => command.json(),
            Commands::Transfer { json, .. } => *json,
            Commands::History { json, .. } => *json,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = commands::get_ledger_dir()
        .ok()
        .and_then(|dir| Config::load(&dir).ok())
        .unwrap_or_default();
    logging::init(&config);

    let json = cli.command.json();
    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                report_json(e);
            } else {
                output::error(&format!("{:#}", e));
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { json } => init::run(json),
        Commands::Account { command } => account::run(command),
        Commands::Transfer { from, to, amount, json } => transfer::run(&from, &to, &amount, json),
        Commands::History { account, limit, json } => history::run(account.as_deref(), limit, json),
    }
}

/// Print a failed operation as JSON on stdout
fn report_json(e: anyhow::Error) {
    let result: OperationResult<()> = match e.downcast::<Error>() {
        Ok(core) => OperationResult::from(Err::<(), Error>(core)),
        Err(other) => OperationResult::fail(format!("{:#}", other)),
    };
    match serde_json::to_string_pretty(&result) {
        Ok(body) => println!("{}", body),
        Err(e) => output::error(&e.to_string()),
    }
}
