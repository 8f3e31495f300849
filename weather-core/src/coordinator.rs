//! Cache-first weather lookups.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::WeatherCache;
use crate::error::WeatherError;
use crate::provider::WeatherProvider;
use crate::record::{self, WeatherRecord};

/// Serves weather from the cache when fresh and from the provider otherwise.
///
/// Concurrent misses for the same city each reach the provider; requests are
/// not coalesced.
pub struct FetchCoordinator {
    cache: WeatherCache,
    provider: Arc<dyn WeatherProvider>,
}

impl FetchCoordinator {
    pub fn new(cache: WeatherCache, provider: Arc<dyn WeatherProvider>) -> Self {
        Self { cache, provider }
    }

    pub fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    /// Cached record for `city`, fetching and caching it on a miss.
    pub async fn get_weather(&self, city: &str) -> Result<WeatherRecord, WeatherError> {
        let city = validate_city(city)?;

        if let Some(hit) = self.cache.lookup(city) {
            debug!(city, "cache hit");
            return Ok(hit);
        }

        debug!(city, "cache miss");
        self.fetch_and_store(city).await
    }

    /// Fetch `city` unconditionally and overwrite its cache entry.
    pub async fn refresh(&self, city: &str) -> Result<WeatherRecord, WeatherError> {
        let city = validate_city(city)?;
        self.fetch_and_store(city).await
    }

    async fn fetch_and_store(&self, city: &str) -> Result<WeatherRecord, WeatherError> {
        let raw = match self.provider.fetch_raw(city).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(city, error = %e, "weather fetch failed");
                return Err(WeatherError::Fetch {
                    city: city.to_string(),
                    source: e,
                });
            }
        };

        let record = record::normalize(&raw);
        // The provider's canonical name is the cache key.
        let key = if record.name.trim().is_empty() {
            city.to_string()
        } else {
            record.name.clone()
        };
        self.cache.insert(key, record.clone());

        Ok(record)
    }
}

fn validate_city(city: &str) -> Result<&str, WeatherError> {
    let city = city.trim();
    if city.is_empty() {
        return Err(WeatherError::InvalidInput("city name cannot be blank".into()));
    }
    Ok(city)
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
