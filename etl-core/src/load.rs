//! Load step: create the destination table if needed, then write every
//! extracted record in one transaction.

use async_trait::async_trait;

use crate::{
    config::PostgresConfig,
    model::{SqlValue, WeatherRecord},
};

pub mod postgres;

pub use postgres::{PgConnector, PgStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("connection already closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to connect to destination database: {0}")]
    Connect(#[source] StoreError),

    #[error("Failed to create destination table: {0}")]
    CreateTable(#[source] StoreError),
}

/// Opens one exclusive connection to the destination store.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn WeatherStore>, StoreError>;
}

/// A single open connection to the destination store.
#[async_trait]
pub trait WeatherStore: Send {
    /// Run a statement without parameters (DDL).
    async fn execute(&mut self, statement: &str) -> Result<(), StoreError>;

    /// Run the parameterized insert once per row inside one transaction.
    /// On any failure the transaction is rolled back and nothing is written.
    async fn insert_batch(
        &mut self,
        statement: &str,
        rows: &[[SqlValue; 19]],
    ) -> Result<(), StoreError>;

    async fn close(&mut self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Nothing was extracted; no connection was opened.
    NoData,
    /// Every row was written and committed.
    Inserted(usize),
    /// The batch failed and was rolled back; nothing was written.
    RolledBack { error: String },
}

pub struct Loader<'a> {
    connector: &'a dyn StoreConnector,
    create_statement: &'a str,
    insert_statement: String,
}

impl<'a> Loader<'a> {
    pub fn new(connector: &'a dyn StoreConnector, config: &'a PostgresConfig) -> Self {
        Self {
            connector,
            create_statement: &config.weather_create_query,
            insert_statement: config.insert_statement(),
        }
    }

    /// Persist `records` atomically.
    ///
    /// A failed insert is rolled back and reported as
    /// [`LoadOutcome::RolledBack`]. Connection and DDL failures are returned
    /// as errors. Once connected, the connection is closed exactly once on
    /// every path.
    pub async fn load(&self, records: &[WeatherRecord]) -> Result<LoadOutcome, LoadError> {
        if records.is_empty() {
            log::info!("No data to insert.");
            return Ok(LoadOutcome::NoData);
        }

        let mut store = self.connector.connect().await.map_err(LoadError::Connect)?;
        let result = self.write(store.as_mut(), records).await;

        if let Err(e) = store.close().await {
            log::warn!("Failed to close database connection: {e}");
        }

        result
    }

    async fn write(
        &self,
        store: &mut dyn WeatherStore,
        records: &[WeatherRecord],
    ) -> Result<LoadOutcome, LoadError> {
        store
            .execute(self.create_statement)
            .await
            .map_err(LoadError::CreateTable)?;

        let rows: Vec<[SqlValue; 19]> = records.iter().map(WeatherRecord::to_row).collect();

        match store.insert_batch(&self.insert_statement, &rows).await {
            Ok(()) => {
                log::info!("Inserted {} rows into destination table", rows.len());
                Ok(LoadOutcome::Inserted(rows.len()))
            }
            Err(error) => {
                log::error!("Bulk insert failed, rolled back: {error}");
                Ok(LoadOutcome::RolledBack { error: error.to_string() })
            }
        }
    }
}
