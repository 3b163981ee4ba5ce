//! LedgerLite relay - buffers expenses for the app and drains them when it is back.

mod app;
mod ipc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relay_config_and_utils::{init_logging, init_logging_for_service, Config, Paths};

/// LedgerLite relay command-line interface.
#[derive(Parser)]
#[command(name = "ledgerlite-relay")]
#[command(about = "Relay that holds LedgerLite expenses until the app can take them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (socket, database, logs, config). Defaults to ~/.ledgerlite
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
        /// Keep the buffer in memory only
        #[arg(long)]
        ephemeral: bool,
    },
    /// Stop the relay
    Stop,
    /// Check relay status
    Status,
    /// Trigger an expense the way a voice intent does
    Add {
        /// Decimal amount, e.g. 25.50
        #[arg(short, long)]
        amount: Option<String>,
        /// Category (food, transport, shopping, entertainment, bills, health, other)
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        note: Option<String>,
    },
    /// Trigger an expense from a ledgerlite://add-expense link
    OpenUrl { url: String },
    /// Print the buffered expenses
    Pending,
    /// Drop every buffered expense
    Clear,
    /// Drain the buffer to the app now
    Sync,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());

    // The daemon logs to stderr too; one-shot commands keep stdout for their output.
    if matches!(cli.command, None | Some(Commands::Start { .. })) {
        init_logging(&level, &paths);
    } else {
        init_logging_for_service("relay-cli", &level, &paths, false);
    }

    match cli.command {
        Some(Commands::Start {
            foreground,
            ephemeral,
        }) => {
            app::run_daemon(config, paths, foreground, ephemeral).await?;
        }
        None => {
            // Default to start in foreground if no command given
            app::run_daemon(config, paths, true, false).await?;
        }
        Some(Commands::Stop) => {
            app::stop_daemon(&paths).await?;
        }
        Some(Commands::Status) => {
            app::check_status(&paths).await?;
        }
        Some(Commands::Add {
            amount,
            category,
            note,
        }) => {
            app::add_expense(&paths, amount, category, note).await?;
        }
        Some(Commands::OpenUrl { url }) => {
            app::open_url(&paths, &url).await?;
        }
        Some(Commands::Pending) => {
            app::print_pending(&paths).await?;
        }
        Some(Commands::Clear) => {
            app::clear_pending(&paths).await?;
        }
        Some(Commands::Sync) => {
            app::sync_now(&paths).await?;
        }
    }

    Ok(())
}
