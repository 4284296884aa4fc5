use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

pub mod weatherstack;

pub use weatherstack::WeatherstackProvider;

/// Source of current conditions for a location query.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Fetch current conditions for a city name or a `"lat,lon"` string.
    ///
    /// An `Err` means the request itself failed (transport error, non-JSON
    /// body). Any JSON body comes back as `Ok`, including API errors
    /// (`success: false`) and payloads of unexpected shape.
    async fn current(&self, query: &str) -> anyhow::Result<Value>;
}

/// The parts of a `/current` payload that end up in a record. Unknown fields
/// are ignored; every known field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrentResponse {
    pub location: Option<Location>,
    pub current: Option<Current>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    pub name: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub lat: Option<Coordinate>,
    pub lon: Option<Coordinate>,
    pub timezone_id: Option<String>,
    pub localtime: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Current {
    pub temperature: Option<f64>,
    #[serde(default)]
    pub weather_icons: Vec<String>,
    #[serde(default)]
    pub weather_descriptions: Vec<String>,
    pub wind_speed: Option<f64>,
    pub pressure: Option<f64>,
    pub precip: Option<f64>,
    pub humidity: Option<i64>,
    pub cloudcover: Option<i64>,
    pub feelslike: Option<f64>,
    pub uv_index: Option<f64>,
    pub visibility: Option<f64>,
}

/// `error.info` of a `success: false` payload, or `None` if the payload is
/// not an API error.
pub fn api_error(payload: &Value) -> Option<Option<String>> {
    if payload.get("success").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    Some(
        payload
            .pointer("/error/info")
            .and_then(Value::as_str)
            .map(str::to_string),
    )
}

/// Weatherstack reports coordinates as strings (`"37.566"`); some mirrors
/// send plain numbers. The raw text is kept so a bad value can be reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Coordinate::Number(n) => Some(*n),
            Coordinate::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Coordinate::Number(n) => write!(f, "{n}"),
            Coordinate::Text(s) => f.write_str(s),
        }
    }
}
