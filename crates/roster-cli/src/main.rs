//! Roster CLI - register, activate and inspect users from the shell.
//!
//! # Usage
//!
//! ```bash
//! # Register a user (prints the new record, including its activation token)
//! roster-cli add -e test@user.com -f Test -l User
//!
//! # Activate it with the token from the activation link
//! roster-cli activate -e test@user.com -t <token>
//!
//! # Show the stored rows of a user
//! roster-cli show -e test@user.com
//! ```
//!
//! The store and table come from `ROSTER_DB_PATH` and `ROSTER_USER_TABLE`
//! (or a `.env` file); `--db` overrides the path.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use roster_store::SqliteStore;
use roster_types::Config;
use roster_users::UserService;

mod commands;

#[derive(Parser)]
#[command(name = "roster-cli")]
#[command(author, version, about = "Roster user tools")]
struct Cli {
    /// SQLite database path (overrides ROSTER_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new user
    Add {
        /// Email (required)
        #[arg(short, long)]
        email: String,

        /// First name
        #[arg(short, long = "first-name")]
        first_name: String,

        /// Last name
        #[arg(short, long = "last-name")]
        last_name: String,
    },
    /// Activate a pending user
    Activate {
        /// Email (required)
        #[arg(short, long)]
        email: String,

        /// Activation token from the activation link
        #[arg(short, long)]
        token: String,
    },
    /// Show every stored row of a user
    Show {
        /// Email (required)
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roster_cli=info,roster_users=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let users = UserService::new(SqliteStore::open(&config.db_path)?);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let table = config.user_table.as_str();
    match cli.command {
        Commands::Add {
            email,
            first_name,
            last_name,
        } => {
            commands::users::add(&users, &cancel, table, email, first_name, last_name).await?;
        }
        Commands::Activate { email, token } => {
            commands::users::activate(&users, &cancel, table, &email, &token).await?;
        }
        Commands::Show { email } => {
            commands::users::show(&users, &cancel, table, &email).await?;
        }
    }
    Ok(())
}
