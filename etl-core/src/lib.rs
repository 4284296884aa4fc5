//! Core library for the daily Weatherstack to Postgres job.
//!
//! This crate defines:
//! - Configuration loading & validation
//! - The weather provider abstraction and its Weatherstack client
//! - The normalized record schema shared by extract and load
//! - The extract and load steps, and the run pipeline joining them
//! - The daily schedule and retry policy
//!
//! It is used by `weatherstack-etl`, but the steps can be driven by any
//! other scheduler.

pub mod config;
pub mod extract;
pub mod load;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod schedule;

pub use config::{Config, PostgresConfig, WeatherstackConfig};
pub use extract::{Extractor, FetchErrorPolicy};
pub use load::{LoadOutcome, Loader, PgConnector, StoreConnector};
pub use model::{CityConfig, WeatherRecord};
pub use pipeline::{RunSummary, run_once};
pub use provider::{WeatherProvider, WeatherstackProvider};
pub use schedule::ScheduleConfig;
