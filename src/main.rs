use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use keyledger::core::log::init_logging;
use std::time::Duration;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display the USD value held by a key, a trust or the ledger
    Balance {
        /// `key:<id>`, `trust:<id>`, `ledger` or the name of a saved context
        context: String,
        /// Stop waiting for prices after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Display the value of every saved context
    Contexts {
        /// Stop waiting for prices after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Print the ARN of an asset
    Arn {
        /// Contract address, the zero address for ether
        contract: String,
        /// ether, erc20, erc721 or erc1155
        standard: String,
        /// Token id
        #[arg(default_value_t = 0)]
        id: u128,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config_path = cli.config_path.as_deref();
    let result = match cli.command {
        Some(Commands::Setup) => keyledger::cli::setup::setup(),
        Some(Commands::Arn {
            contract,
            standard,
            id,
        }) => keyledger::cli::arn::run(&contract, &standard, id),
        Some(Commands::Balance { context, timeout }) => {
            let command = keyledger::AppCommand::Balance {
                context,
                timeout: timeout.map(Duration::from_secs),
            };
            keyledger::run_command(command, config_path).await
        }
        Some(Commands::Contexts { timeout }) => {
            let command = keyledger::AppCommand::Contexts {
                timeout: timeout.map(Duration::from_secs),
            };
            keyledger::run_command(command, config_path).await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
