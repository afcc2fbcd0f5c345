use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use casari_core::AppConfig;

mod cli;
mod replay;
mod serve;

use cli::{Cli, Command};

const DEFAULT_LOG_FILTER: &str = "casari=info,casari_events=info,casari_scheduler=info,sqlx=warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // --- Configuration ---
    let config = AppConfig::from_env()?;

    // --- Tracing ---
    init_tracing(config.json_logs);
    tracing::info!(
        max_connections = config.database.max_connections,
        "Loaded configuration"
    );

    // --- Database ---
    let pool = casari_db::create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");

    casari_db::health_check(&pool).await?;
    tracing::info!("Database health check passed");

    casari_db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    match cli.command {
        Command::Serve => serve::run(&config, pool).await,
        Command::EventReplay(args) => replay::run(&config, pool, args).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
