use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    extract::FetchErrorPolicy,
    model::{CityConfig, WEATHER_COLUMNS},
    schedule::ScheduleConfig,
};

/// Environment variable overriding the default config location.
pub const CONFIG_ENV: &str = "WEATHERSTACK_ETL_CONFIG";

pub const DEFAULT_BASE_URL: &str = "http://api.weatherstack.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Could not determine platform config directory")]
    NoConfigDir,

    #[error("Config value `{0}` must not be empty")]
    Empty(&'static str),

    #[error(
        "postgres.weather_insert_query has {found} placeholders, expected {expected} \
         (one per column: {columns})",
        expected = WEATHER_COLUMNS.len(),
        columns = WEATHER_COLUMNS.join(", ")
    )]
    PlaceholderCount { found: usize },
}

/// Weather API section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherstackConfig {
    pub access_key: String,

    /// Ordered list of cities fetched on every run.
    pub cities: Vec<CityConfig>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub on_fetch_error: FetchErrorPolicy,
}

/// Destination database section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub dbname: String,
    pub username: String,
    pub password: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Idempotent DDL, e.g. `CREATE TABLE IF NOT EXISTS weather (...)`.
    pub weather_create_query: String,

    /// Parameterized insert with one placeholder per column.
    pub weather_insert_query: String,
}

impl PostgresConfig {
    /// Insert statement with `%s` placeholders rewritten to `$n`.
    pub fn insert_statement(&self) -> String {
        rewrite_percent_placeholders(&self.weather_insert_query)
    }
}

/// Top-level configuration, loaded once per run and passed down explicitly.
///
/// Example JSON:
/// {
///   "weatherstack": { "access_key": "...", "cities": [{ "name": "Seoul" }] },
///   "postgres": { "host": "...", "dbname": "...", ... }
/// }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub weatherstack: WeatherstackConfig,
    pub postgres: PostgresConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Resolve the config path (explicit, then `$WEATHERSTACK_ETL_CONFIG`, then
    /// the platform default), parse it and validate it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(p) => PathBuf::from(p),
                None => Self::default_path()?,
            },
        };

        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let contents = fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;

        let cfg = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&contents)?,
            _ => Self::from_json_str(&contents)?,
        };

        log::debug!(
            "Loaded config from {} ({} cities)",
            path.display(),
            cfg.weatherstack.cities.len()
        );

        Ok(cfg)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_json::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Path to the config file in the platform config directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("dev", "weatherstack-etl", "weatherstack-etl")
            .ok_or(ConfigError::NoConfigDir)?;

        Ok(dirs.config_dir().join("config.json"))
    }

    /// Catch drift between the record schema and the configured statements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weatherstack.access_key.trim().is_empty() {
            return Err(ConfigError::Empty("weatherstack.access_key"));
        }
        if self.postgres.weather_create_query.trim().is_empty() {
            return Err(ConfigError::Empty("postgres.weather_create_query"));
        }

        let found = count_placeholders(&self.postgres.insert_statement());
        if found != WEATHER_COLUMNS.len() {
            return Err(ConfigError::PlaceholderCount { found });
        }

        Ok(())
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_port() -> u16 {
    5432
}

/// Rewrite psycopg-style `%s` placeholders into sequential `$1, $2, ...`.
/// `%%` is an escaped percent sign and is left alone.
pub fn rewrite_percent_placeholders(statement: &str) -> String {
    let mut out = String::with_capacity(statement.len() + 16);
    let mut chars = statement.chars().peekable();
    let mut next = 1;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') => {
                chars.next();
                out.push_str(&format!("${next}"));
                next += 1;
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }

    out
}

/// Number of distinct `$n` placeholders in a statement, provided they form
/// the contiguous range `$1..$n`. A gap (e.g. `$1, $3`) counts as zero so the
/// statement fails validation.
pub fn count_placeholders(statement: &str) -> usize {
    let mut seen = BTreeSet::new();
    let mut chars = statement.char_indices().peekable();
    let mut in_literal = false;

    while let Some((i, c)) = chars.next() {
        match c {
            '\'' => in_literal = !in_literal,
            '$' if !in_literal => {
                let digits: String = statement[i + 1..]
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();
                if let Ok(n) = digits.parse::<usize>() {
                    seen.insert(n);
                    for _ in 0..digits.len() {
                        chars.next();
                    }
                }
            }
            _ => {}
        }
    }

    let contiguous = seen.iter().copied().eq(1..=seen.len());
    if contiguous { seen.len() } else { 0 }
}
