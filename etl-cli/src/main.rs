//! Binary crate for the `weatherstack-etl` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Logger setup (`RUST_LOG`, default `info`)
//! - Wiring the real Weatherstack and Postgres clients into the core

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let cmd = cli::Cli::parse();
    cmd.run().await
}
