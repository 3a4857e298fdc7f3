use clap::Parser;
use foliopipe::cli::{self, Cli, Commands};
use foliopipe::config::{AppConfig, LoggingConfig};
use foliopipe::error::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir)?;
    init_logging(&config.logging);

    match &cli.command {
        Commands::InitDb => cli::init_db(&config).await?,
        Commands::Run { run_type } => cli::run_ingest(&config, run_type).await?,
        Commands::Status { json } => cli::show_status(&config, *json).await?,
        Commands::Portfolio { json } => cli::show_portfolio(&config, *json).await?,
        Commands::Candles {
            symbol,
            count,
            json,
        } => cli::show_candles(&config, symbol, *count, *json).await?,
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,foliopipe={}", config.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
