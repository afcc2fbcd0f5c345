//! Command line definition.

use casari_core::types::Timestamp;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "casari")]
#[command(about = "Casari event bus and job scheduler", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the event bus, its consumers and the cron scheduler until
    /// SIGINT or SIGTERM
    Serve,
    /// Re-publish stored events so consumers can process them again
    EventReplay(ReplayArgs),
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Only replay events at or after this time (RFC 3339)
    #[arg(long, value_parser = parse_start_from)]
    pub start_from: Option<Timestamp>,

    /// Only replay events published on this topic
    #[arg(long)]
    pub topic_name: Option<String>,
}

fn parse_start_from(value: &str) -> Result<Timestamp, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| "start-from must be a valid ISO 8601 date, e.g., 2025-08-26T15:04:05Z".to_string())
}
