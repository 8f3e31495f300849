//! WeatherProvider trait and implementations.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ProviderError;
use crate::record::RawWeather;

// ------------------------------------------------------------------ //
//  Trait                                                              //
// ------------------------------------------------------------------ //

/// Async source of raw weather payloads for a city.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch_raw(&self, city: &str) -> Result<RawWeather, ProviderError>;
}

/// Builds a provider for a credential. Used by the registry when a new
/// credential is first seen.
pub type ProviderFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn WeatherProvider>, ProviderError> + Send + Sync>;

// ------------------------------------------------------------------ //
//  FakeWeatherProvider (for tests)                                    //
// ------------------------------------------------------------------ //

type Scripted = Result<RawWeather, String>;

/// In-memory provider with scripted per-city responses.
///
/// Cities without a script answer with a payload whose `name` is the queried
/// city. Every call is recorded, including failed ones.
#[derive(Debug, Default, Clone)]
pub struct FakeWeatherProvider {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Scripted>>>>,
    failing: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeWeatherProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `city`; queued responses are served first-in first-out.
    pub fn push_response(&self, city: &str, raw: RawWeather) {
        self.scripts
            .lock()
            .unwrap()
            .entry(city.to_string())
            .or_default()
            .push_back(Ok(raw));
    }

    /// Queue a single failure for `city`.
    pub fn push_failure(&self, city: &str, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .entry(city.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }

    /// Make every call for `city` fail until [`Self::recover`] is called.
    pub fn fail_always(&self, city: &str, message: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(city.to_string(), message.to_string());
    }

    pub fn recover(&self, city: &str) {
        self.failing.lock().unwrap().remove(city);
    }

    /// Cities queried so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, city: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == city).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl WeatherProvider for FakeWeatherProvider {
    async fn fetch_raw(&self, city: &str) -> Result<RawWeather, ProviderError> {
        self.calls.lock().unwrap().push(city.to_string());

        if let Some(message) = self.failing.lock().unwrap().get(city) {
            return Err(ProviderError::Unavailable(message.clone()));
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(city)
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(Ok(raw)) => Ok(raw),
            Some(Err(message)) => Err(ProviderError::Unavailable(message)),
            None => Ok(RawWeather {
                name: Some(city.to_string()),
                ..Default::default()
            }),
        }
    }
}

// ------------------------------------------------------------------ //
//  OpenWeatherClient (production)                                     //
// ------------------------------------------------------------------ //

const CURRENT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 500;

/// OpenWeather "current weather" client. Units and language are fixed per
/// instance.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    api_key: String,
    units: String,
    lang: String,
    base_url: String,
}

impl OpenWeatherClient {
    pub fn new(api_key: &str, units: &str, lang: &str) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent("weather-gateway/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            units: units.to_string(),
            lang: lang.to_string(),
            base_url: CURRENT_WEATHER_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (e.g. a local stub).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Factory producing an [`OpenWeatherClient`] for each registered credential.
    pub fn factory(units: &str, lang: &str) -> ProviderFactory {
        let units = units.to_string();
        let lang = lang.to_string();
        Arc::new(
            move |api_key: &str| -> Result<Arc<dyn WeatherProvider>, ProviderError> {
                let client = OpenWeatherClient::new(api_key, &units, &lang)?;
                Ok(Arc::new(client))
            },
        )
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn fetch_raw(&self, city: &str) -> Result<RawWeather, ProviderError> {
        debug!(city, url = %self.base_url, "fetching current weather");

        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
                ("lang", self.lang.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
