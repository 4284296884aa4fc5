use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use weatherstack_etl_core::{
    Config, Extractor, PgConnector, WeatherstackProvider, pipeline, run_once, schedule,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weatherstack-etl", version, about = "Weatherstack to Postgres ETL")]
pub struct Cli {
    /// Path to the JSON (or .toml) config file.
    /// Falls back to `$WEATHERSTACK_ETL_CONFIG`, then the platform config dir.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract every configured city and load the records, once.
    Run {
        /// Do not retry a failed run.
        #[arg(long)]
        no_retry: bool,
    },

    /// Extract only and print the records as JSON.
    Extract,

    /// Run on the configured cron schedule until interrupted.
    Schedule,

    /// Load and validate the configuration, then exit.
    Validate,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::load(self.config.as_deref()).context("Failed to load configuration")?;

        match self.command {
            Command::Run { no_retry } => {
                let mut policy = config.schedule.clone();
                if no_retry {
                    policy.retries = 0;
                }
                let summary = schedule::run_with_retry(&policy, |_| run(&config)).await?;
                println!("{summary}");
            }
            Command::Extract => {
                let provider = WeatherstackProvider::from_config(&config.weatherstack);
                let records = Extractor::new(&provider, config.weatherstack.on_fetch_error)
                    .extract(&config.weatherstack.cities)
                    .await?;
                println!("{}", pipeline::records_to_json(&records)?);
            }
            Command::Schedule => {
                log::info!(
                    "Scheduling {} cities on '{}' ({} retries, {}s apart)",
                    config.weatherstack.cities.len(),
                    config.schedule.cron,
                    config.schedule.retries,
                    config.schedule.retry_delay_secs
                );
                tokio::select! {
                    res = schedule::run_on_schedule(&config.schedule, |_| run(&config)) => res?,
                    _ = tokio::signal::ctrl_c() => log::info!("Received Ctrl+C, shutting down"),
                }
            }
            Command::Validate => {
                config.schedule.schedule()?;
                println!(
                    "Configuration OK: {} cities, destination {}@{}:{}/{}, schedule '{}'",
                    config.weatherstack.cities.len(),
                    config.postgres.username,
                    config.postgres.host,
                    config.postgres.port,
                    config.postgres.dbname,
                    config.schedule.cron
                );
            }
        }

        Ok(())
    }
}

/// Fresh clients per attempt, so a retry starts from a new connection.
async fn run(config: &Config) -> anyhow::Result<pipeline::RunSummary> {
    let provider = WeatherstackProvider::from_config(&config.weatherstack);
    let connector = PgConnector::from_config(&config.postgres);
    run_once(config, &provider, &connector).await
}
