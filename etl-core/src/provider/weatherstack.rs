use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::config::{DEFAULT_BASE_URL, WeatherstackConfig};

use super::WeatherProvider;

/// Weatherstack `/current` endpoint client.
#[derive(Debug, Clone)]
pub struct WeatherstackProvider {
    access_key: String,
    base_url: String,
    http: Client,
}

impl WeatherstackProvider {
    pub fn new(access_key: String) -> Self {
        Self::with_base_url(access_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(access_key: String, base_url: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { access_key, base_url, http: Client::new() }
    }

    pub fn from_config(config: &WeatherstackConfig) -> Self {
        Self::with_base_url(config.access_key.clone(), config.base_url.clone())
    }

    fn current_url(&self) -> String {
        format!("{}/current", self.base_url)
    }

    /// GET `/current` for `query`, always in metric units.
    fn current_request(&self, query: &str) -> RequestBuilder {
        self.http.get(self.current_url()).query(&[
            ("access_key", self.access_key.as_str()),
            ("query", query),
            ("units", "m"),
        ])
    }
}

#[async_trait]
impl WeatherProvider for WeatherstackProvider {
    async fn current(&self, query: &str) -> Result<Value> {
        let res = self
            .current_request(query)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Weatherstack for '{query}'"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read Weatherstack current response body")?;

        // Weatherstack answers API errors with 200 and `success: false`, so
        // the body decides. Only a non-JSON body is a failure here.
        serde_json::from_str(&body).with_context(|| {
            format!(
                "Failed to parse Weatherstack response (status {}): {}",
                status,
                truncate_body(&body)
            )
        })
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
