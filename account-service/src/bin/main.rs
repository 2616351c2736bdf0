use std::sync::Arc;

use account_service::{AccountService, AccountServiceConfig};
use clap::{Parser, Subcommand};
use common::db::InMemoryStore;
use common::decimal::Amount;
use common::model::account::ListFilter;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Account Service CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set the log level
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Database URL (defaults to DATABASE_URL)
    #[arg(short, long, global = true)]
    database_url: Option<String>,

    /// Database pool size
    #[arg(short, long, global = true)]
    pool_size: Option<u32>,

    /// Use a throwaway in-memory store instead of PostgreSQL
    #[arg(long, global = true)]
    in_memory: bool,

    /// Commands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new account
    Open {
        /// Owner (user) ID
        owner: String,
        /// Account type: checking or saving
        account_type: String,
    },
    /// List accounts of an owner
    List {
        /// Owner (user) ID
        owner: String,
        /// Which accounts: open, closed or all
        #[arg(default_value = "all")]
        filter: String,
        /// Caller token; when set, each account is returned with its transactions
        #[arg(long)]
        token: Option<String>,
    },
    /// Show one account
    Get {
        owner: String,
        account_id: String,
    },
    /// Deposit money into an account
    Deposit {
        owner: String,
        account_id: String,
        amount: Amount,
    },
    /// Withdraw money from an account
    Withdraw {
        owner: String,
        account_id: String,
        amount: Amount,
    },
    /// Close an account
    Close {
        owner: String,
        account_id: String,
    },
    /// Delete a closed account
    Delete {
        owner: String,
        account_id: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(service: &AccountService, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Open { owner, account_type } => {
            print_json(&service.create_account(&owner, &account_type).await?)?;
        }
        Commands::List { owner, filter, token } => {
            let filter: ListFilter = filter.parse()?;
            match token {
                Some(token) => {
                    print_json(&service.list_accounts_with_transactions(&owner, filter, &token).await?)?;
                }
                None => print_json(&service.list_accounts(&owner, filter).await?)?,
            }
        }
        Commands::Get { owner, account_id } => {
            print_json(&service.get_account(&owner, &account_id).await?)?;
        }
        Commands::Deposit { owner, account_id, amount } => {
            print_json(&service.deposit(&owner, &account_id, amount).await?)?;
        }
        Commands::Withdraw { owner, account_id, amount } => {
            print_json(&service.withdraw(&owner, &account_id, amount).await?)?;
        }
        Commands::Close { owner, account_id } => {
            print_json(&service.close_account(&owner, &account_id).await?)?;
        }
        Commands::Delete { owner, account_id } => {
            service.delete_account(&owner, &account_id).await?;
            info!("Account {} deleted", account_id);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "account_service={level},common={level}",
            level = cli.log_level
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Create config using provided values or env vars
    let mut config = AccountServiceConfig::from_env();
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if let Some(pool_size) = cli.pool_size {
        config.db_pool_size = pool_size;
    }

    info!(
        "Starting account service with database pool size: {}, store timeout: {:?}",
        config.db_pool_size, config.store_timeout
    );

    let service = if cli.in_memory {
        AccountService::with_store(Arc::new(InMemoryStore::new()), &config)
            .with_configured_transactions(&config)?
    } else {
        AccountService::with_config(&config).await?
    };

    if let Err(err) = run(&service, cli.command).await {
        error!("Command failed: {}", err);
        return Err(err);
    }

    Ok(())
}
