use anyhow::Result;
use serde::Serialize;

use crate::{
    config::Config,
    extract::Extractor,
    load::{LoadOutcome, Loader, StoreConnector},
    provider::WeatherProvider,
};

/// What one run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub cities: usize,
    pub extracted: usize,
    pub outcome: LoadOutcome,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} cities extracted, ", self.extracted, self.cities)?;
        match &self.outcome {
            LoadOutcome::NoData => f.write_str("nothing to load"),
            LoadOutcome::Inserted(n) => write!(f, "{n} rows inserted"),
            LoadOutcome::RolledBack { error } => write!(f, "batch rolled back ({error})"),
        }
    }
}

/// One full run: extract every configured city, then load the result.
pub async fn run_once(
    config: &Config,
    provider: &dyn WeatherProvider,
    connector: &dyn StoreConnector,
) -> Result<RunSummary> {
    let cities = &config.weatherstack.cities;

    let records = Extractor::new(provider, config.weatherstack.on_fetch_error)
        .extract(cities)
        .await?;

    let outcome = Loader::new(connector, &config.postgres).load(&records).await?;

    Ok(RunSummary { cities: cities.len(), extracted: records.len(), outcome })
}

/// JSON form of `records`, for dry runs.
pub fn records_to_json<T: Serialize>(records: &[T]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}
