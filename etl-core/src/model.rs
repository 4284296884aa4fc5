use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Destination column order. Every row handed to the store follows it.
pub const WEATHER_COLUMNS: [&str; 19] = [
    "name",
    "region",
    "country",
    "lat",
    "long",
    "timezone",
    "local_time",
    "temp_c",
    "feelslike_c",
    "condition",
    "condition_icon",
    "wind_kph",
    "pressure_mb",
    "precipitation_mm",
    "humidity",
    "cloud",
    "uv_index",
    "visibility_km",
    "last_updated_epoch",
];

/// One configured city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityConfig {
    pub name: String,

    /// Coordinate pair such as `"40.7831,-73.9712"`. Preferred over `name`.
    #[serde(default)]
    pub lat_long: Option<String>,
}

impl CityConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), lat_long: None }
    }

    pub fn with_lat_long(mut self, lat_long: impl Into<String>) -> Self {
        self.lat_long = Some(lat_long.into());
        self
    }

    /// Location parameter sent to the weather API.
    pub fn query(&self) -> &str {
        match self.lat_long.as_deref().map(str::trim) {
            Some(coords) if !coords.is_empty() => coords,
            _ => self.name.as_str(),
        }
    }
}

/// One normalized observation for one city at one fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub name: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub timezone: Option<String>,
    pub local_time: NaiveDateTime,
    pub temp_c: Option<f64>,
    pub feelslike_c: Option<f64>,
    pub condition: Option<String>,
    pub condition_icon: Option<String>,
    pub wind_kph: Option<f64>,
    pub pressure_mb: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub humidity: Option<i64>,
    pub cloud: Option<i64>,
    pub uv_index: Option<f64>,
    pub visibility_km: Option<f64>,
    pub last_updated_epoch: i64,
}

/// A single positional parameter of the insert statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Float(Option<f64>),
    Int(Option<i64>),
    Timestamp(NaiveDateTime),
}

impl WeatherRecord {
    /// Values in [`WEATHER_COLUMNS`] order.
    pub fn to_row(&self) -> [SqlValue; 19] {
        use SqlValue::*;

        [
            Text(self.name.clone()),
            Text(self.region.clone()),
            Text(self.country.clone()),
            Float(self.lat),
            Float(self.long),
            Text(self.timezone.clone()),
            Timestamp(self.local_time),
            Float(self.temp_c),
            Float(self.feelslike_c),
            Text(self.condition.clone()),
            Text(self.condition_icon.clone()),
            Float(self.wind_kph),
            Float(self.pressure_mb),
            Float(self.precipitation_mm),
            Int(self.humidity),
            Int(self.cloud),
            Float(self.uv_index),
            Float(self.visibility_km),
            Int(Some(self.last_updated_epoch)),
        ]
    }
}

const LOCAL_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse the API's local time string, e.g. `"2025-05-04 12:00"`.
pub fn parse_local_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    LOCAL_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Epoch seconds of a naive time read as wall-clock time in the host's zone.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times that
/// do not exist locally (DST spring-forward gap) yield `None`.
pub fn local_epoch(local_time: NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(&local_time)
        .earliest()
        .map(|dt| dt.timestamp())
}

/// Inverse of [`local_epoch`].
pub fn epoch_to_local(epoch: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(epoch, 0).map(|dt| dt.with_timezone(&Local).naive_local())
}
