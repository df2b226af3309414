//! `stockctl`: admin CLI over a local stock database.
//!
//! Usage:
//!   stockctl -c <config.toml> [--bot <id>] <command> ...
//!
//! Every command prints its result as JSON on stdout.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use stockroom_core::ServiceError;
use stockroom_sql::{SQLStore, SqliteStore};
use stockroom_stock::StockModule;
use stockroom_stock::bot::{BotDirectory, SqlBotDirectory};

use config::CtlConfig;

/// Stock administration tool.
#[derive(Parser, Debug)]
#[command(name = "stockctl", about = "Stock pool administration")]
struct Cli {
    /// Path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: PathBuf,

    /// Bot (storefront) the command acts on.
    #[arg(short = 'b', long = "bot", global = true, default_value_t = 1)]
    bot: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bot registration.
    Bot {
        #[command(subcommand)]
        action: BotAction,
    },

    /// Product catalog.
    Product {
        #[command(subcommand)]
        action: ProductAction,
    },

    /// Stock units of one product.
    Stock {
        #[command(subcommand)]
        action: StockAction,
    },

    /// Claim units for a transaction (all or nothing).
    Claim {
        product: String,
        quantity: i64,
        /// Transaction reference. A fresh one is generated if omitted.
        #[arg(long = "tx")]
        tx: Option<String>,
    },

    /// Return a transaction's units to the pool.
    Release { tx: String },

    /// Show the units a transaction holds.
    Transaction { tx: String },

    /// Category membership lists.
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Orphaned stock and memberships.
    Repair {
        #[command(subcommand)]
        action: RepairAction,
    },
}

#[derive(Subcommand, Debug)]
enum BotAction {
    /// Register the bot given by `--bot`.
    Add { name: String },
    /// Show the bot given by `--bot`.
    Show,
}

#[derive(Subcommand, Debug)]
enum ProductAction {
    Add {
        id: String,
        name: String,
        price: i64,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        terms: String,
    },
    Show { id: String },
    List,
    /// Change name, price, description or terms.
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        price: Option<i64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        terms: Option<String>,
    },
    /// Rename the product id, carrying stock and category entries along.
    Rename { old: String, new: String },
    /// Delete the product, its stock, and its category entries.
    Delete { id: String },
    /// Add to the sold counter.
    Sold { id: String, quantity: i64 },
}

#[derive(Subcommand, Debug)]
enum StockAction {
    /// Add one unit per entry.
    Add {
        product: String,
        entries: Vec<String>,
        /// JSON file holding an array of payload strings.
        #[arg(short = 'f', long = "file")]
        file: Option<PathBuf>,
    },
    /// Remove available units by id or exact payload.
    Remove {
        product: String,
        entries: Vec<String>,
        #[arg(short = 'f', long = "file")]
        file: Option<PathBuf>,
    },
    /// List available units, oldest first.
    List {
        product: String,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum CategoryAction {
    /// Create or replace a category's product list.
    Set { name: String, products: Vec<String> },
    /// Create a new category.
    Create { name: String, products: Vec<String> },
    /// Append products to an existing category.
    Append { name: String, products: Vec<String> },
    Show { name: String },
    List,
    Delete { name: String },
    /// Remove the first occurrence of a product.
    Remove { name: String, product: String },
}

#[derive(Subcommand, Debug)]
enum RepairAction {
    Scan,
    /// Delete stock of a product id that has no product row.
    Purge { product: String },
    /// Move orphaned stock onto an existing product.
    Reattach { from: String, to: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let ctl_config = CtlConfig::load(&cli.config)?;
    ctl_config.verify()?;
    let service_config = ctl_config.service_config();

    if let Some(dir) = &service_config.data_dir {
        std::fs::create_dir_all(dir)?;
    }
    let sqlite_path = service_config.resolve_sqlite_path();
    info!("Opening stock database {}", sqlite_path.display());

    let sql: Arc<dyn SQLStore> = Arc::new(
        SqliteStore::open(&sqlite_path)
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    let bots = Arc::new(SqlBotDirectory::new(Arc::clone(&sql))?);
    let stock = StockModule::new(
        sql,
        service_config.limits,
        Arc::clone(&bots) as Arc<dyn BotDirectory>,
    )?;

    let ctx = commands::Context {
        bot_id: cli.bot,
        bots: &bots,
        stock: &stock,
    };
    match commands::run(&ctx, cli.command) {
        Ok(output) => println!("{}", serde_json::to_string_pretty(&output)?),
        Err(e) => match e.downcast_ref::<ServiceError>() {
            Some(service_err) => {
                println!("{}", serde_json::to_string_pretty(&service_err.to_json())?);
                std::process::exit(1);
            }
            None => return Err(e),
        },
    }
    Ok(())
}
