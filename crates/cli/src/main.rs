//! Smart Building Monitor CLI
//!
//! A command-line tool for querying the building monitor daemon: status,
//! dashboard, alerts, anomalies, readings and exports.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{anomalies, export, monitor, sensors};

/// Smart Building Monitor CLI
#[derive(Parser)]
#[command(name = "sbm")]
#[command(author, version, about = "CLI for the Smart Building Monitor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via SBM_API_URL env var)
    #[arg(long, env = "SBM_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show monitoring status
    Status,

    /// Show the building dashboard
    Dashboard,

    /// List recent alerts
    Alerts {
        /// Look-back window in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },

    /// Summarize detected anomalies
    Anomalies {
        /// Look-back window in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },

    /// Show recent sensor readings
    Readings {
        /// Look-back window in hours
        #[arg(long, default_value_t = 1)]
        hours: i64,
    },

    /// Show statistics for one sensor
    Sensor {
        /// Sensor ID
        id: String,

        /// Look-back window in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },

    /// Export monitoring data as JSON
    Export {
        /// Limit readings and alerts to this many hours (full history if omitted)
        #[arg(long)]
        hours: Option<i64>,

        /// Output file path
        #[arg(long, short)]
        output: Option<String>,
    },

    /// Run one sampling and detection pass immediately
    Step,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let api_url = config::Config::load()?.resolve_api_url(cli.api_url);
    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Status => monitor::show_status(&client, cli.format).await?,
        Commands::Dashboard => monitor::show_dashboard(&client, cli.format).await?,
        Commands::Alerts { hours } => anomalies::list_alerts(&client, hours, cli.format).await?,
        Commands::Anomalies { hours } => {
            anomalies::show_summary(&client, hours, cli.format).await?
        }
        Commands::Readings { hours } => {
            sensors::show_readings(&client, hours, cli.format).await?
        }
        Commands::Sensor { id, hours } => {
            sensors::show_sensor(&client, &id, hours, cli.format).await?
        }
        Commands::Export { hours, output } => {
            export::export_data(&client, hours, output, cli.format).await?
        }
        Commands::Step => monitor::step(&client, cli.format).await?,
    }

    Ok(())
}
