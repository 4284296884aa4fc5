use async_trait::async_trait;
use sqlx::{
    Connection, PgConnection, Postgres,
    postgres::{PgArguments, PgConnectOptions},
    query::Query,
};

use crate::{config::PostgresConfig, model::SqlValue};

use super::{StoreConnector, StoreError, WeatherStore};

/// Opens a plain `PgConnection` per run. No pool: the loader is the only
/// writer for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
}

impl PgConnector {
    pub fn from_config(config: &PostgresConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.dbname)
            .username(&config.username)
            .password(&config.password)
            .application_name("weatherstack-etl");

        Self { options }
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn WeatherStore>, StoreError> {
        let conn = PgConnection::connect_with(&self.options).await?;
        log::debug!("Connected to Postgres");
        Ok(Box::new(PgStore { conn: Some(conn) }))
    }
}

#[derive(Debug)]
pub struct PgStore {
    conn: Option<PgConnection>,
}

impl PgStore {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.conn.as_mut().ok_or(StoreError::Closed)
    }
}

fn bind_row<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    row: &[SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for value in row {
        query = match value {
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

#[async_trait]
impl WeatherStore for PgStore {
    async fn execute(&mut self, statement: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        sqlx::query(statement).execute(&mut *conn).await?;
        Ok(())
    }

    async fn insert_batch(
        &mut self,
        statement: &str,
        rows: &[[SqlValue; 19]],
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let mut tx = conn.begin().await?;

        for row in rows {
            let inserted = bind_row(sqlx::query(statement), row).execute(&mut *tx).await;
            if let Err(e) = inserted {
                if let Err(rollback) = tx.rollback().await {
                    log::error!("Rollback failed: {rollback}");
                }
                return Err(e.into());
            }
        }

        // A failed COMMIT leaves nothing behind: Postgres aborts the transaction.
        tx.commit().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        match self.conn.take() {
            Some(conn) => {
                conn.close().await?;
                log::debug!("Closed Postgres connection");
                Ok(())
            }
            None => Err(StoreError::Closed),
        }
    }
}
