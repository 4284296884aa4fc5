//! Extract step: one request per configured city, normalized into
//! [`WeatherRecord`]s.
//!
//! A city whose response is an API error, is missing a required section, or
//! carries an unusable local time is logged and skipped. The rest of the run
//! continues.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    model::{CityConfig, WeatherRecord, local_epoch, parse_local_time},
    provider::{
        Coordinate, CurrentResponse, WeatherProvider, api_error, weatherstack::truncate_body,
    },
};

/// What to do when a city's request fails below the API level
/// (connection refused, DNS failure, unreadable body).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchErrorPolicy {
    /// Log and continue with the next city.
    #[default]
    Skip,
    /// Stop extracting and fail the run.
    Abort,
}

/// Why a single city produced no record.
#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("API error: {}", .info.as_deref().unwrap_or("no detail"))]
    Api { info: Option<String> },

    #[error("invalid response ({reason}): {payload}")]
    Malformed { reason: String, payload: String },

    #[error("unusable local time {value:?}")]
    LocalTime { value: Option<String> },

    #[error("unusable coordinate {value:?}")]
    Coordinates { value: String },

    #[error("request failed: {0:#}")]
    Fetch(anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("extraction aborted at city '{city}': {error:#}")]
    Fetch { city: String, error: anyhow::Error },
}

#[derive(Debug)]
pub struct Extractor<'a> {
    provider: &'a dyn WeatherProvider,
    policy: FetchErrorPolicy,
}

impl<'a> Extractor<'a> {
    pub fn new(provider: &'a dyn WeatherProvider, policy: FetchErrorPolicy) -> Self {
        Self { provider, policy }
    }

    /// Fetch every city in order. The result holds one record per city that
    /// produced a usable response, in configuration order.
    pub async fn extract(&self, cities: &[CityConfig]) -> Result<Vec<WeatherRecord>, ExtractError> {
        let mut records = Vec::with_capacity(cities.len());

        for city in cities {
            match self.extract_city(city).await {
                Ok(record) => records.push(record),
                Err(SkipReason::Fetch(error)) if self.policy == FetchErrorPolicy::Abort => {
                    return Err(ExtractError::Fetch { city: city.name.clone(), error });
                }
                Err(reason) => log::warn!("Skipping {}: {reason}", city.name),
            }
        }

        log::info!("Extracted {} of {} cities", records.len(), cities.len());
        Ok(records)
    }

    pub async fn extract_city(&self, city: &CityConfig) -> Result<WeatherRecord, SkipReason> {
        let query = city.query();
        log::debug!("Fetching current weather for {} (query '{query}')", city.name);

        let payload = self.provider.current(query).await.map_err(SkipReason::Fetch)?;
        normalize(&payload)
    }
}

/// Map a raw payload onto a record.
pub fn normalize(payload: &Value) -> Result<WeatherRecord, SkipReason> {
    if let Some(info) = api_error(payload) {
        return Err(SkipReason::Api { info });
    }

    let response = CurrentResponse::deserialize(payload)
        .map_err(|e| malformed(e.to_string(), payload))?;

    let (location, current) = match (response.location, response.current) {
        (Some(location), Some(current)) => (location, current),
        (None, _) => return Err(malformed("missing location".into(), payload)),
        (_, None) => return Err(malformed("missing current".into(), payload)),
    };

    let local_time = location
        .localtime
        .as_deref()
        .and_then(parse_local_time)
        .ok_or_else(|| SkipReason::LocalTime { value: location.localtime.clone() })?;
    let last_updated_epoch = local_epoch(local_time)
        .ok_or_else(|| SkipReason::LocalTime { value: location.localtime.clone() })?;

    Ok(WeatherRecord {
        lat: coordinate(location.lat)?,
        long: coordinate(location.lon)?,
        name: location.name,
        region: location.region,
        country: location.country,
        timezone: location.timezone_id,
        local_time,
        temp_c: current.temperature,
        feelslike_c: current.feelslike,
        condition: current.weather_descriptions.into_iter().next(),
        condition_icon: current.weather_icons.into_iter().next(),
        wind_kph: current.wind_speed,
        pressure_mb: current.pressure,
        precipitation_mm: current.precip,
        humidity: current.humidity,
        cloud: current.cloudcover,
        uv_index: current.uv_index,
        visibility_km: current.visibility,
        last_updated_epoch,
    })
}

fn coordinate(value: Option<Coordinate>) -> Result<Option<f64>, SkipReason> {
    match value {
        None => Ok(None),
        Some(c) => c
            .to_f64()
            .map(Some)
            .ok_or_else(|| SkipReason::Coordinates { value: c.to_string() }),
    }
}

fn malformed(reason: String, payload: &Value) -> SkipReason {
    SkipReason::Malformed { reason, payload: truncate_body(&payload.to_string()) }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::epoch_to_local;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::{collections::HashMap, sync::Mutex};

    /// Canned responses keyed by query. Unknown queries fail like a dropped
    /// connection. Every query is recorded.
    #[derive(Debug, Default)]
    pub(crate) struct FakeProvider {
        responses: HashMap<String, Value>,
        pub(crate) queries: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        pub(crate) fn with(mut self, query: &str, payload: Value) -> Self {
            self.responses.insert(query.to_string(), payload);
            self
        }

        pub(crate) fn queries(&self) -> Vec<String> {
            self.queries.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        async fn current(&self, query: &str) -> anyhow::Result<Value> {
            self.queries.lock().expect("lock").push(query.to_string());
            self.responses
                .get(query)
                .cloned()
                .ok_or_else(|| anyhow!("connection refused"))
        }
    }

    pub(crate) fn valid_payload(name: &str) -> Value {
        json!({
            "location": {
                "name": name,
                "country": "South Korea",
                "region": "",
                "lat": "37.566",
                "lon": "127.000",
                "timezone_id": "Asia/Seoul",
                "localtime": "2025-05-04 12:00"
            },
            "current": {
                "temperature": 18,
                "weather_icons": ["https://cdn.example/sunny.png"],
                "weather_descriptions": ["Sunny", "Clear"],
                "wind_speed": 7,
                "pressure": 1015,
                "precip": 0.1,
                "humidity": 40,
                "cloudcover": 25,
                "feelslike": 17,
                "uv_index": 5,
                "visibility": 10
            }
        })
    }

    pub(crate) fn api_error_payload() -> Value {
        json!({
            "success": false,
            "error": { "code": 101, "type": "invalid_access_key", "info": "invalid access key" }
        })
    }

    #[tokio::test]
    async fn maps_all_fields() {
        let provider = FakeProvider::default().with("Seoul", valid_payload("Seoul"));
        let extractor = Extractor::new(&provider, FetchErrorPolicy::Skip);

        let record = extractor
            .extract_city(&CityConfig::new("Seoul"))
            .await
            .expect("valid payload");

        assert_eq!(record.name.as_deref(), Some("Seoul"));
        assert_eq!(record.region.as_deref(), Some(""));
        assert_eq!(record.lat, Some(37.566));
        assert_eq!(record.long, Some(127.0));
        assert_eq!(record.timezone.as_deref(), Some("Asia/Seoul"));
        assert_eq!(record.temp_c, Some(18.0));
        assert_eq!(record.feelslike_c, Some(17.0));
        assert_eq!(record.condition.as_deref(), Some("Sunny"));
        assert_eq!(record.condition_icon.as_deref(), Some("https://cdn.example/sunny.png"));
        assert_eq!(record.precipitation_mm, Some(0.1));
        assert_eq!(record.cloud, Some(25));
        assert_eq!(record.visibility_km, Some(10.0));
        assert_eq!(epoch_to_local(record.last_updated_epoch), Some(record.local_time));
    }

    #[tokio::test]
    async fn absent_fields_become_none() {
        let mut payload = valid_payload("Seoul");
        payload["current"] = json!({ "weather_descriptions": [] });
        payload["location"]
            .as_object_mut()
            .expect("object")
            .remove("lat");
        let provider = FakeProvider::default().with("Seoul", payload);
        let extractor = Extractor::new(&provider, FetchErrorPolicy::Skip);

        let record = extractor
            .extract_city(&CityConfig::new("Seoul"))
            .await
            .expect("partial payload still maps");

        assert_eq!(record.lat, None);
        assert_eq!(record.temp_c, None);
        assert_eq!(record.condition, None);
        assert_eq!(record.condition_icon, None);
        assert_eq!(record.humidity, None);
    }

    #[tokio::test]
    async fn lat_long_is_sent_instead_of_name() {
        let provider =
            FakeProvider::default().with("40.7831,-73.9712", valid_payload("New York"));
        let extractor = Extractor::new(&provider, FetchErrorPolicy::Skip);
        let cities = [CityConfig::new("New York").with_lat_long("40.7831,-73.9712")];

        let records = extractor.extract(&cities).await.expect("extract");

        assert_eq!(records.len(), 1);
        assert_eq!(provider.queries(), vec!["40.7831,-73.9712".to_string()]);
    }

    #[tokio::test]
    async fn skips_api_errors_and_malformed_payloads() {
        let mut no_current = valid_payload("Tokyo");
        no_current.as_object_mut().expect("object").remove("current");

        let provider = FakeProvider::default()
            .with("Seoul", valid_payload("Seoul"))
            .with("Busan", api_error_payload())
            .with("Tokyo", no_current)
            .with("Osaka", valid_payload("Osaka"));
        let extractor = Extractor::new(&provider, FetchErrorPolicy::Skip);
        let cities = ["Seoul", "Busan", "Tokyo", "Osaka"].map(CityConfig::new);

        let records = extractor.extract(&cities).await.expect("extract");

        let names: Vec<_> = records.iter().filter_map(|r| r.name.as_deref()).collect();
        assert_eq!(names, vec!["Seoul", "Osaka"]);
        assert_eq!(provider.queries().len(), 4);
    }

    #[tokio::test]
    async fn skip_reasons() {
        let mut bad_time = valid_payload("Seoul");
        bad_time["location"]["localtime"] = json!("noon-ish");
        let mut bad_lat = valid_payload("Seoul");
        bad_lat["location"]["lat"] = json!("north");

        let provider = FakeProvider::default()
            .with("api", api_error_payload())
            .with("empty", json!({}))
            .with("time", bad_time)
            .with("lat", bad_lat);
        let extractor = Extractor::new(&provider, FetchErrorPolicy::Skip);

        let reason = |name: &str| {
            let city = CityConfig::new(name);
            let extractor = &extractor;
            async move { extractor.extract_city(&city).await.unwrap_err() }
        };

        match reason("api").await {
            SkipReason::Api { info } => assert_eq!(info.as_deref(), Some("invalid access key")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(reason("empty").await, SkipReason::Malformed { .. }));
        assert!(matches!(
            reason("time").await,
            SkipReason::LocalTime { value: Some(v) } if v == "noon-ish"
        ));
        assert!(matches!(reason("lat").await, SkipReason::Coordinates { .. }));
        assert!(matches!(reason("offline").await, SkipReason::Fetch(_)));
    }

    #[tokio::test]
    async fn fetch_failure_is_isolated_by_default() {
        let provider = FakeProvider::default()
            .with("Seoul", valid_payload("Seoul"))
            .with("Osaka", valid_payload("Osaka"));
        let extractor = Extractor::new(&provider, FetchErrorPolicy::Skip);
        let cities = ["Seoul", "Unreachable", "Osaka"].map(CityConfig::new);

        let records = extractor.extract(&cities).await.expect("extract");

        assert_eq!(records.len(), 2);
        assert_eq!(provider.queries().len(), 3);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_when_configured() {
        let provider = FakeProvider::default()
            .with("Seoul", valid_payload("Seoul"))
            .with("Osaka", valid_payload("Osaka"));
        let extractor = Extractor::new(&provider, FetchErrorPolicy::Abort);
        let cities = ["Seoul", "Unreachable", "Osaka"].map(CityConfig::new);

        let err = extractor.extract(&cities).await.unwrap_err();

        assert!(err.to_string().contains("Unreachable"));
        assert_eq!(provider.queries(), vec!["Seoul".to_string(), "Unreachable".to_string()]);
    }

    #[tokio::test]
    async fn api_errors_never_abort() {
        let provider = FakeProvider::default()
            .with("Busan", api_error_payload())
            .with("Seoul", valid_payload("Seoul"));
        let extractor = Extractor::new(&provider, FetchErrorPolicy::Abort);
        let cities = ["Busan", "Seoul"].map(CityConfig::new);

        let records = extractor.extract(&cities).await.expect("extract");
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn unexpected_field_types_never_abort() {
        let mut float_humidity = valid_payload("Tokyo");
        float_humidity["current"]["humidity"] = json!(40.5);
        let mut text_weather_code = valid_payload("Osaka");
        text_weather_code["current"]["weather_code"] = json!("113");
        text_weather_code["current"]["is_day"] = json!(true);

        let provider = FakeProvider::default()
            .with("Tokyo", float_humidity)
            .with("Osaka", text_weather_code)
            .with("Seoul", valid_payload("Seoul"));
        let extractor = Extractor::new(&provider, FetchErrorPolicy::Abort);

        match extractor.extract_city(&CityConfig::new("Tokyo")).await.unwrap_err() {
            SkipReason::Malformed { reason, payload } => {
                assert!(reason.contains("40.5"), "{reason}");
                assert!(payload.contains("Tokyo"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let cities = ["Tokyo", "Osaka", "Seoul"].map(CityConfig::new);
        let records = extractor.extract(&cities).await.expect("extract");

        let names: Vec<_> = records.iter().filter_map(|r| r.name.as_deref()).collect();
        assert_eq!(names, vec!["Osaka", "Seoul"]);
    }

    #[tokio::test]
    async fn missing_section_is_named() {
        let mut no_current = valid_payload("Tokyo");
        no_current.as_object_mut().expect("object").remove("current");
        let provider = FakeProvider::default().with("Tokyo", no_current);
        let extractor = Extractor::new(&provider, FetchErrorPolicy::Skip);

        let err = extractor.extract_city(&CityConfig::new("Tokyo")).await.unwrap_err();
        assert!(err.to_string().starts_with("invalid response (missing current)"));
    }

    #[tokio::test]
    async fn no_cities_no_requests() {
        let provider = FakeProvider::default();
        let extractor = Extractor::new(&provider, FetchErrorPolicy::Skip);

        let records = extractor.extract(&[]).await.expect("extract");

        assert!(records.is_empty());
        assert!(provider.queries().is_empty());
    }
}
