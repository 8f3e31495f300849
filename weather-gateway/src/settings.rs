//! Process configuration.
//!
//! Values come from `WEATHER_*` environment variables (a `.env` file is loaded
//! first by `main`) layered over the defaults below.

use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;
use weather_core::{CacheConfig, WeatherError};

const DEFAULT_CITIES: &[&str] = &[
    "London",
    "Moscow",
    "Krasnodar",
    "Jeddah",
    "Jerusalem",
    "Los Angeles",
    "Marigot",
    "Maseru",
    "Niamey",
    "Nouakchott",
    "Novosibirsk",
    "New York",
    "Oslo",
    "Phnom Penh",
    "Quezon City",
    "Rawalpindi",
    "Rio de Janeiro",
    "Santa Cruz de la Sierra",
    "South Tangerang",
    "Ulan Bator",
    "Yokohama",
    "Xi'an",
    "Sofia",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// OpenWeather API key; also the registry credential.
    pub api_key: String,
    pub http_addr: String,
    pub polling_enabled: bool,
    pub polling_period_minutes: u64,
    pub cities: Vec<String>,
    pub cache_capacity: usize,
    pub cache_ttl_ms: u64,
    pub units: String,
    pub lang: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_env(Environment::with_prefix("WEATHER"))
    }

    fn from_env(env: Environment) -> Result<Self> {
        let default_cities: Vec<String> = DEFAULT_CITIES.iter().map(|c| c.to_string()).collect();

        let settings: Settings = Config::builder()
            .set_default("http_addr", "0.0.0.0:8080")?
            .set_default("polling_enabled", false)?
            .set_default("polling_period_minutes", 10_i64)?
            .set_default("cities", default_cities)?
            .set_default("cache_capacity", CacheConfig::DEFAULT_CAPACITY as i64)?
            .set_default("cache_ttl_ms", CacheConfig::DEFAULT_TTL.as_millis() as i64)?
            .set_default("units", "metric")?
            .set_default("lang", "en")?
            .add_source(
                env.try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cities"),
            )
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration (is WEATHER_API_KEY set?)")?;

        Ok(settings)
    }

    pub fn cache_config(&self) -> Result<CacheConfig, WeatherError> {
        CacheConfig::new(self.cache_capacity, Duration::from_millis(self.cache_ttl_ms))
    }

    /// Configured cities with surrounding whitespace and blanks removed.
    pub fn city_list(&self) -> Vec<String> {
        self.cities
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}
