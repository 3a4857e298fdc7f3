//! foliopipe CLI - portfolio pipeline management
//!
//! Commands:
//! - `foliopipe init-db` - apply and verify the document-store schema
//! - `foliopipe run` - execute one ingest run
//! - `foliopipe status` - show schema state and stored record counts
//! - `foliopipe portfolio` - show the live portfolio
//! - `foliopipe candles` - fetch recent candles for a symbol

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

pub use commands::{init_db, run_ingest, show_candles, show_portfolio, show_status};
pub use output::OutputMode;

/// Portfolio data pipeline CLI
#[derive(Parser, Debug)]
#[command(name = "foliopipe")]
#[command(author, version, about = "Portfolio data pipeline: brokerage API to document store")]
pub struct Cli {
    /// Configuration directory
    #[arg(long, default_value = "config", global = true)]
    pub config_dir: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply the schema and verify every table and index exists
    InitDb,

    /// Execute one ingest run
    Run {
        /// "market_open" or "market_close"
        run_type: String,
    },

    /// Show schema state and stored record counts
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Show the live portfolio from the brokerage API
    Portfolio {
        #[arg(long)]
        json: bool,
    },

    /// Fetch recent candles for a symbol
    Candles {
        symbol: String,
        #[arg(long, default_value = "10")]
        count: u32,
        #[arg(long)]
        json: bool,
    },
}
